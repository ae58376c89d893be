//! Refresh cycles, toggles and the timer that drives them.
//!
//! The [`Scheduler`] is the only writer of the [`Registry`]. A refresh cycle
//! discovers devices, polls them all concurrently and then writes the
//! registry once. Triggers arriving while a cycle runs are coalesced into it.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Instant,
};

use chrono::Utc;
use tokio::{
    sync::{mpsc::UnboundedSender, RwLock},
    task::{JoinHandle, JoinSet},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    client::{DeviceClient, DeviceHandle, PowerState},
    config::{excluded, Settings},
    error::{Error, Result},
    registry::{Observation, Registry, RegistryDiff},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Discovery,
    Toggle,
}

/// Message for the user, never fatal
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The registry was written and the view should be synchronised
    RegistryUpdated,
    Notice(Notice),
}

#[derive(Debug, PartialEq)]
pub enum RefreshOutcome {
    Completed(RegistryDiff),
    /// Another cycle was already running
    Coalesced,
    /// Registry left untouched
    DiscoveryFailed,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    client: Arc<dyn DeviceClient>,
    registry: RwLock<Registry>,
    settings: Settings,
    exclude: Mutex<Vec<String>>,
    in_flight: AtomicBool,
    events: UnboundedSender<Event>,
}

impl Scheduler {
    pub fn new(
        client: Arc<dyn DeviceClient>,
        settings: Settings,
        events: UnboundedSender<Event>,
    ) -> Self {
        let exclude = Mutex::new(settings.exclude.clone());
        Self {
            client,
            registry: RwLock::new(Registry::new()),
            settings,
            exclude,
            in_flight: AtomicBool::new(false),
            events,
        }
    }

    pub fn registry(&self) -> &RwLock<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn emit(&self, event: Event) {
        // Nobody listening any more means we are shutting down.
        let _ = self.events.send(event);
    }

    fn notify(&self, kind: NoticeKind, message: String) {
        self.emit(Event::Notice(Notice { kind, message }));
    }

    fn exclude_list(&self) -> Vec<String> {
        self.exclude
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one discovery and poll cycle
    pub async fn refresh(&self) -> RefreshOutcome {
        let _in_flight = match InFlight::acquire(&self.in_flight) {
            Some(guard) => guard,
            None => {
                debug!("refresh already running, coalescing trigger");
                return RefreshOutcome::Coalesced;
            }
        };
        let started = Instant::now();

        let mut handles = match self.client.discover().await {
            Ok(handles) => handles,
            Err(err) => {
                warn!(%err, "discovery failed, keeping previous device list");
                self.notify(NoticeKind::Discovery, format!("Discovery failed: {}", err));
                return RefreshOutcome::DiscoveryFailed;
            }
        };

        let exclude = self.exclude_list();
        handles.retain(|handle| !is_excluded(&exclude, handle));

        if self.settings.auto_reconnect {
            let registry = self.registry.read().await;
            let missing: Vec<_> = registry
                .iter()
                .filter(|snapshot| !handles.iter().any(|handle| handle.id == snapshot.id))
                .map(|snapshot| snapshot.handle())
                .filter(|handle| !is_excluded(&exclude, handle))
                .collect();
            for handle in missing {
                debug!(id = %handle.id, addr = %handle.addr, "not discovered, polling directly");
                handles.push(handle);
            }
        }

        let mut polls = JoinSet::new();
        for handle in handles {
            let client = Arc::clone(&self.client);
            polls.spawn(async move {
                let state = client.get_state(&handle).await;
                Observation { handle, state }
            });
        }

        let mut observations = Vec::new();
        while let Some(joined) = polls.join_next().await {
            match joined {
                Ok(observation) => {
                    match &observation.state {
                        Ok(state) => debug!(
                            id = %observation.handle.id,
                            power = ?state.power,
                            watts = ?state.watts,
                            "polled device"
                        ),
                        Err(err) => warn!(
                            id = %observation.handle.id,
                            addr = %observation.handle.addr,
                            %err,
                            "device did not answer"
                        ),
                    }
                    observations.push(observation);
                }
                Err(err) => warn!(%err, "device poll task failed"),
            }
        }

        // `forget` may have run while the polls were out
        let exclude = self.exclude_list();
        observations.retain(|observation| !is_excluded(&exclude, &observation.handle));
        let diff = {
            let mut registry = self.registry.write().await;
            let removed = registry.retain(|snapshot| {
                !excluded(&exclude, &snapshot.id, &snapshot.addr.ip().to_string())
            });
            if !removed.is_empty() {
                debug!(?removed, "dropped excluded devices");
            }
            registry.apply(observations, Utc::now())
        };
        info!(
            added = diff.added.len(),
            changed = diff.changed.len(),
            offline = diff.went_offline.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh complete"
        );
        self.emit(Event::RegistryUpdated);

        RefreshOutcome::Completed(diff)
    }

    /// Refresh without waiting for the result
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<RefreshOutcome> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.refresh().await })
    }

    /// Flip a plug, showing the new state before the device confirms it.
    ///
    /// The tentative state is rolled back if the device refuses, and the
    /// failure is reported as a notice as well as returned.
    pub async fn toggle(&self, id: &str) -> Result<PowerState> {
        let result = self.try_toggle(id).await;
        if let Err(err) = &result {
            let name = self
                .registry
                .read()
                .await
                .get(id)
                .map(|snapshot| snapshot.name.clone())
                .unwrap_or_else(|| id.to_string());
            warn!(%id, %err, "toggle failed");
            self.notify(
                NoticeKind::Toggle,
                format!("Could not switch {}: {}", name, err),
            );
        }
        result
    }

    async fn try_toggle(&self, id: &str) -> Result<PowerState> {
        let (handle, previous, target) = {
            let mut registry = self.registry.write().await;
            let snapshot = registry
                .get(id)
                .ok_or_else(|| Error::UnknownDevice(id.to_string()))?;
            if !snapshot.online {
                return Err(Error::Offline(snapshot.name.clone()));
            }
            let handle = snapshot.handle();
            let previous = snapshot.power;
            let target = previous.toggled();
            registry.set_tentative(id, target);
            (handle, previous, target)
        };
        self.emit(Event::RegistryUpdated);

        if let Err(err) = self.client.set_state(&handle, target).await {
            if self.registry.write().await.roll_back(id, previous) {
                self.emit(Event::RegistryUpdated);
            } else {
                debug!(%id, "tentative state already replaced by a poll");
            }
            return Err(err);
        }

        match self.client.get_state(&handle).await {
            Ok(state) => {
                let confirmed = state.power;
                self.registry
                    .write()
                    .await
                    .update(&handle, &state, Utc::now());
                self.emit(Event::RegistryUpdated);
                info!(%id, power = ?confirmed, "switched");
                Ok(confirmed)
            }
            Err(err) => {
                debug!(%id, %err, "switched but the confirming poll failed");
                Ok(target)
            }
        }
    }

    /// Remove a device and keep it out of future cycles
    pub async fn forget(&self, id: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        if !registry.contains(id) {
            return Err(Error::UnknownDevice(id.to_string()));
        }
        self.exclude
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.to_string());
        registry.retain(|snapshot| snapshot.id != id);
        drop(registry);
        info!(%id, "device excluded");
        self.emit(Event::RegistryUpdated);
        Ok(())
    }

    /// Start the repeating refresh; the first cycle runs immediately
    pub fn start(self: &Arc<Self>) -> RefreshTimer {
        let scheduler = Arc::clone(self);
        let period = self.settings.refresh_interval();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if scheduler.refresh().await == RefreshOutcome::Coalesced {
                    debug!("scheduled refresh coalesced into a running one");
                }
            }
        });
        debug!(period_secs = period.as_secs(), "refresh timer started");
        RefreshTimer { task }
    }
}

fn is_excluded(exclude: &[String], handle: &DeviceHandle) -> bool {
    excluded(exclude, &handle.id, &handle.addr.ip().to_string())
}

/// Keeps the periodic refresh alive; stopping or dropping it ends the timer
pub struct RefreshTimer {
    task: JoinHandle<()>,
}

impl RefreshTimer {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
