//! Last-known state of every plug seen so far.

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
};

use chrono::{DateTime, Utc};

use crate::{
    client::{DeviceHandle, DeviceState, PowerState},
    error::Error,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: String,
    pub addr: SocketAddr,
    pub name: String,
    pub model: String,
    pub has_emeter: bool,
    pub power: PowerState,
    pub online: bool,
    pub watts: Option<f64>,
    /// Time of the last successful contact
    pub last_updated: DateTime<Utc>,
}

impl DeviceSnapshot {
    fn from_state(handle: &DeviceHandle, state: &DeviceState, now: DateTime<Utc>) -> Self {
        Self {
            id: handle.id.clone(),
            addr: handle.addr,
            name: state.alias.clone().unwrap_or_else(|| handle.alias.clone()),
            model: handle.model.clone(),
            has_emeter: handle.has_emeter,
            power: state.power,
            online: state.online,
            watts: state.watts,
            last_updated: now,
        }
    }

    fn unreachable(handle: &DeviceHandle) -> Self {
        Self {
            id: handle.id.clone(),
            addr: handle.addr,
            name: handle.alias.clone(),
            model: handle.model.clone(),
            has_emeter: handle.has_emeter,
            power: PowerState::Unknown,
            online: false,
            watts: None,
            last_updated: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Address the device the way discovery last saw it
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            id: self.id.clone(),
            addr: self.addr,
            alias: self.name.clone(),
            model: self.model.clone(),
            has_emeter: self.has_emeter,
        }
    }

    /// Keeps the power state so the row still shows what it was last doing
    fn mark_offline(&mut self) {
        self.online = false;
        self.watts = None;
    }
}

/// Outcome of polling one device during a refresh cycle
#[derive(Debug)]
pub struct Observation {
    pub handle: DeviceHandle,
    pub state: Result<DeviceState, Error>,
}

/// What a registry write changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegistryDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub went_offline: Vec<String>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.went_offline.is_empty()
    }
}

/// Insertion ordered map from device id to snapshot
#[derive(Debug, Default)]
pub struct Registry {
    order: Vec<String>,
    snapshots: HashMap<String, DeviceSnapshot>,
    /// Devices showing a power state they have not confirmed
    tentative: HashSet<String>,
    revision: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: &str) -> Option<&DeviceSnapshot> {
        self.snapshots.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshots.contains_key(id)
    }

    /// Snapshots in display order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceSnapshot> {
        self.order.iter().filter_map(move |id| self.snapshots.get(id))
    }

    /// Apply one refresh cycle as a single write.
    ///
    /// Failed observations and known devices missing from `observations` are
    /// marked offline. Devices seen for the first time are appended in
    /// address order.
    pub fn apply(&mut self, mut observations: Vec<Observation>, now: DateTime<Utc>) -> RegistryDiff {
        observations.sort_by_key(|observation| observation.handle.addr);

        let mut diff = RegistryDiff::default();
        let mut seen = Vec::with_capacity(observations.len());

        for observation in observations {
            let id = observation.handle.id.clone();
            if seen.contains(&id) {
                continue;
            }
            seen.push(id.clone());

            let Observation { handle, state } = observation;
            let existing = match self.snapshots.get_mut(&id) {
                Some(existing) => existing,
                None => {
                    let snapshot = match state {
                        Ok(state) => DeviceSnapshot::from_state(&handle, &state, now),
                        Err(_) => DeviceSnapshot::unreachable(&handle),
                    };
                    self.order.push(id.clone());
                    self.snapshots.insert(id.clone(), snapshot);
                    diff.added.push(id);
                    continue;
                }
            };
            match state {
                Ok(state) => {
                    self.tentative.remove(&id);
                    let replacement = DeviceSnapshot::from_state(&handle, &state, now);
                    if existing.online && !replacement.online {
                        diff.went_offline.push(id);
                    } else if !same_view(existing, &replacement) {
                        diff.changed.push(id);
                    }
                    *existing = replacement;
                }
                Err(_) => {
                    if existing.online {
                        existing.mark_offline();
                        diff.went_offline.push(id);
                    }
                }
            }
        }

        for id in &self.order {
            if seen.contains(id) {
                continue;
            }
            if let Some(snapshot) = self.snapshots.get_mut(id) {
                if snapshot.online {
                    snapshot.mark_offline();
                    diff.went_offline.push(id.clone());
                }
            }
        }

        self.revision += 1;
        diff
    }

    /// Show a power state the device has not confirmed yet, returning the
    /// previous one
    pub fn set_tentative(&mut self, id: &str, power: PowerState) -> Option<PowerState> {
        let snapshot = self.snapshots.get_mut(id)?;
        let previous = snapshot.power;
        snapshot.power = power;
        self.tentative.insert(id.to_string());
        self.revision += 1;
        Some(previous)
    }

    /// Restore `previous` unless a successful poll has replaced the tentative
    /// state in the meantime. Returns whether anything was restored.
    pub fn roll_back(&mut self, id: &str, previous: PowerState) -> bool {
        if !self.tentative.remove(id) {
            return false;
        }
        match self.snapshots.get_mut(id) {
            Some(snapshot) => {
                snapshot.power = previous;
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Replace a single snapshot after a direct poll
    pub fn update(&mut self, handle: &DeviceHandle, state: &DeviceState, now: DateTime<Utc>) {
        if let Some(existing) = self.snapshots.get_mut(&handle.id) {
            *existing = DeviceSnapshot::from_state(handle, state, now);
            self.tentative.remove(&handle.id);
            self.revision += 1;
        }
    }

    /// Drop devices for good, used when configuration excludes them
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&DeviceSnapshot) -> bool,
    {
        let snapshots = &mut self.snapshots;
        let tentative = &mut self.tentative;
        let mut removed = Vec::new();
        self.order.retain(|id| {
            let kept = snapshots.get(id).map_or(false, &mut keep);
            if !kept {
                snapshots.remove(id);
                tentative.remove(id);
                removed.push(id.clone());
            }
            kept
        });
        if !removed.is_empty() {
            self.revision += 1;
        }
        removed
    }
}

fn same_view(a: &DeviceSnapshot, b: &DeviceSnapshot) -> bool {
    a.name == b.name
        && a.addr == b.addr
        && a.power == b.power
        && a.online == b.online
        && a.watts == b.watts
}
