//! On-screen rows, kept in step with the registry.

use std::io::{self, Write};

use crossterm::style::{StyledContent, Stylize};

use crate::{client::PowerState, config::Settings, registry::Registry};

/// Status lamp shown beside each plug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    On,
    Off,
    Offline,
}

impl Indicator {
    /// Offline wins over whatever the plug was last doing
    pub fn of(online: bool, power: PowerState) -> Self {
        match (online, power) {
            (false, _) => Indicator::Offline,
            (true, PowerState::On) => Indicator::On,
            (true, PowerState::Off) | (true, PowerState::Unknown) => Indicator::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Indicator::On => "on",
            Indicator::Off => "off",
            Indicator::Offline => "offline",
        }
    }

    fn lamp(self) -> StyledContent<&'static str> {
        match self {
            Indicator::On => LAMP.green(),
            Indicator::Off => LAMP.yellow(),
            Indicator::Offline => LAMP.red(),
        }
    }
}

const LAMP: &str = "●";

/// One device row. `widget_id` stays fixed for the life of the row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub widget_id: u64,
    pub device_id: String,
    pub name: String,
    pub address: Option<String>,
    pub power: Option<String>,
    pub indicator: Indicator,
    pub button: &'static str,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct View {
    rows: Vec<Row>,
    next_widget_id: u64,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Device behind the 1-based row number the user typed
    pub fn device_at(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.rows.get(index))
            .map(|row| row.device_id.as_str())
    }

    /// Reconcile rows with the registry: update in place, append new
    /// devices, drop rows whose device left the registry.
    pub fn sync(&mut self, registry: &Registry, settings: &Settings) -> SyncReport {
        let mut report = SyncReport::default();

        let before = self.rows.len();
        self.rows.retain(|row| registry.contains(&row.device_id));
        report.removed = before - self.rows.len();

        for snapshot in registry.iter() {
            let indicator = Indicator::of(snapshot.online, snapshot.power);
            let address = if settings.show_address {
                Some(snapshot.addr.ip().to_string())
            } else {
                None
            };
            let power = if settings.show_power && snapshot.has_emeter && snapshot.online {
                snapshot.watts.map(|watts| format!("{:.1} W", watts))
            } else {
                None
            };
            let button = if snapshot.power == PowerState::On {
                "switch off"
            } else {
                "switch on"
            };

            match self.rows.iter().position(|row| row.device_id == snapshot.id) {
                Some(index) => {
                    let row = &mut self.rows[index];
                    let changed = row.name != snapshot.name
                        || row.address != address
                        || row.power != power
                        || row.indicator != indicator
                        || row.button != button;
                    if changed {
                        row.name = snapshot.name.clone();
                        row.address = address;
                        row.power = power;
                        row.indicator = indicator;
                        row.button = button;
                        report.updated += 1;
                    }
                }
                None => {
                    self.next_widget_id += 1;
                    self.rows.push(Row {
                        widget_id: self.next_widget_id,
                        device_id: snapshot.id.clone(),
                        name: snapshot.name.clone(),
                        address,
                        power,
                        indicator,
                        button,
                    });
                    report.added += 1;
                }
            }
        }

        report
    }

    pub fn render<W: Write>(&self, out: &mut W, color: bool) -> io::Result<()> {
        if self.rows.is_empty() {
            return writeln!(out, "No plugs found yet.");
        }
        let name_width = self
            .rows
            .iter()
            .map(|row| row.name.chars().count())
            .max()
            .unwrap_or(0);

        for (index, row) in self.rows.iter().enumerate() {
            let label = pad(row.indicator.label(), 7);
            let lamp = if color {
                format!("{} {}", row.indicator.lamp(), label)
            } else {
                format!("{} {}", LAMP, label)
            };
            let mut line = format!("{:>3}  {}  {}", index + 1, lamp, pad(&row.name, name_width));
            if let Some(address) = &row.address {
                line.push_str("  ");
                line.push_str(&pad(address, 15));
            }
            line.push_str("  ");
            line.push_str(&pad(row.power.as_deref().unwrap_or(""), 10));
            line.push_str(&format!("  [{}]", row.button));
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

fn pad(value: &str, padding: usize) -> String {
    let pad = " ".repeat(padding.saturating_sub(value.chars().count()));
    format!("{}{}", value, pad)
}
