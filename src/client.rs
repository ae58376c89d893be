//! The device-facing side of the application.
//!
//! [`DeviceClient`] is the seam between the refresh logic and the network:
//! [`KasaClient`] talks to real plugs, tests use an in-memory fake.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    datatypes::DeviceData,
    devices::Plug,
    discovery,
    error::Result,
    protocol::{DefaultProtocol, Protocol},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

impl PowerState {
    pub fn from_relay(is_on: Option<bool>) -> Self {
        match is_on {
            Some(true) => PowerState::On,
            Some(false) => PowerState::Off,
            None => PowerState::Unknown,
        }
    }

    /// Target of a toggle; an unknown state is switched on
    pub fn toggled(self) -> Self {
        match self {
            PowerState::On => PowerState::Off,
            PowerState::Off | PowerState::Unknown => PowerState::On,
        }
    }
}

/// What discovery knows about a device, enough to address it later
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceHandle {
    pub id: String,
    pub addr: SocketAddr,
    pub alias: String,
    pub model: String,
    pub has_emeter: bool,
}

impl DeviceHandle {
    pub fn from_data(addr: SocketAddr, data: &DeviceData) -> Self {
        let sysinfo = &data.system.sysinfo;
        Self {
            id: sysinfo.device_id.clone(),
            addr,
            alias: sysinfo.alias.clone(),
            model: sysinfo.model.clone(),
            has_emeter: data.has_emeter(),
        }
    }
}

/// Result of polling one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub power: PowerState,
    pub watts: Option<f64>,
    pub online: bool,
    /// Alias as currently reported, it may have been renamed since discovery
    pub alias: Option<String>,
}

impl DeviceState {
    pub fn from_data(data: &DeviceData) -> Self {
        let sysinfo = &data.system.sysinfo;
        Self {
            power: PowerState::from_relay(sysinfo.is_on()),
            watts: data.realtime().and_then(|realtime| realtime.watts()),
            online: true,
            alias: Some(sysinfo.alias.clone()),
        }
    }
}

#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// All plugs answering right now
    async fn discover(&self) -> Result<Vec<DeviceHandle>>;

    async fn get_state(&self, handle: &DeviceHandle) -> Result<DeviceState>;

    async fn set_state(&self, handle: &DeviceHandle, power: PowerState) -> Result<()>;
}

/// [`DeviceClient`] speaking the local TPLink protocol
pub struct KasaClient {
    protocol: Arc<dyn Protocol>,
    discovery_timeout: Duration,
}

impl KasaClient {
    pub fn new(discovery_timeout: Duration, request_timeout: Duration) -> Self {
        Self::with_protocol(
            Arc::new(DefaultProtocol::new(request_timeout)),
            discovery_timeout,
        )
    }

    pub fn with_protocol(protocol: Arc<dyn Protocol>, discovery_timeout: Duration) -> Self {
        Self {
            protocol,
            discovery_timeout,
        }
    }

    fn plug(&self, handle: &DeviceHandle) -> Plug {
        Plug::new(handle.addr, self.protocol.clone())
    }
}

#[async_trait]
impl DeviceClient for KasaClient {
    async fn discover(&self) -> Result<Vec<DeviceHandle>> {
        let found = discovery::with_timeout(self.discovery_timeout).await?;
        Ok(found
            .iter()
            .filter(|(addr, data)| {
                let is_plug = data.system.sysinfo.is_plug();
                if !is_plug {
                    debug!(%addr, model = %data.system.sysinfo.model, "skipping non-plug device");
                }
                is_plug
            })
            .map(|(addr, data)| DeviceHandle::from_data(*addr, data))
            .collect())
    }

    async fn get_state(&self, handle: &DeviceHandle) -> Result<DeviceState> {
        let data = self.plug(handle).poll().await?;
        Ok(DeviceState::from_data(&data))
    }

    async fn set_state(&self, handle: &DeviceHandle, power: PowerState) -> Result<()> {
        let plug = self.plug(handle);
        match power {
            PowerState::On => plug.switch_on().await,
            PowerState::Off => plug.switch_off().await,
            PowerState::Unknown => Err(crate::error::Error::Other(String::from(
                "Cannot switch to an unknown state",
            ))),
        }
    }
}
