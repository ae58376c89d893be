#[macro_use]
extern crate serde_derive;

pub mod client;
pub mod config;
pub mod console;
pub mod datatypes;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod view;

pub use client::{DeviceClient, KasaClient, PowerState};
pub use config::Settings;
pub use scheduler::{Event, Scheduler};
