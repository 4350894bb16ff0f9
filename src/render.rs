//! Terminal output: station list, live data and the power trend

use crate::ekz::{ChargingStation, LiveData};
use chrono::{DateTime, Local};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept for the sparkline
pub const HISTORY_SIZE: usize = 30;

const SPARK_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn dash_if_empty(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn online_cell(online: bool) -> Cell {
    let cell = if online {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::Red)
    };
    cell.set_alignment(CellAlignment::Center)
}

/// One row per charge box
pub fn stations_table(stations: &[ChargingStation]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec![
        Cell::new("ID").add_attribute(Attribute::Bold),
        Cell::new("NAME").add_attribute(Attribute::Bold),
        Cell::new("STATUS").add_attribute(Attribute::Bold),
        Cell::new("CONNECTOR").add_attribute(Attribute::Bold),
        Cell::new("ONLINE").add_attribute(Attribute::Bold),
    ]);

    for charge_box in stations.iter().flat_map(|s| &s.charge_boxes) {
        table.add_row(vec![
            Cell::new(&charge_box.charge_box_id),
            Cell::new(&charge_box.charge_box_name),
            Cell::new(dash_if_empty(&charge_box.charging_process_status))
                .set_alignment(CellAlignment::Center),
            Cell::new(dash_if_empty(&charge_box.connector_status))
                .set_alignment(CellAlignment::Center),
            online_cell(charge_box.online),
        ]);
    }
    table
}

/// Connector status with a symbol and a color
pub fn status_cell(status: &str) -> Cell {
    let (label, color) = match status {
        "CHARGING" => ("⚡ Charging", Color::Green),
        "AVAILABLE" => ("✓ Available", Color::DarkGreen),
        "OCCUPIED" => ("⏸ Occupied", Color::Yellow),
        "UNAVAILABLE" => ("✗ Unavailable", Color::Red),
        "PREPARING" => ("↻ Preparing", Color::Yellow),
        "FINISHING" => ("⏳ Finishing", Color::Yellow),
        other => return Cell::new(dash_if_empty(other)),
    };
    Cell::new(label).fg(color).add_attribute(Attribute::Bold)
}

pub fn live_data_table(live: &LiveData, updated: DateTime<Local>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec!["LIVE CHARGING DATA", ""]);

    let label = |text: &str| Cell::new(text).add_attribute(Attribute::Dim);
    table.add_row(vec![label("Status"), status_cell(&live.status)]);
    table.add_row(vec![
        label("Power"),
        Cell::new(format!("{:.2} kW", live.power)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        label("Energy"),
        Cell::new(format!("{:.2} kWh", live.charged_energy)).set_alignment(CellAlignment::Right),
    ]);
    if !live.current_tariff.tariff_status.is_empty() {
        table.add_row(vec![
            label("Tariff"),
            Cell::new(format!(
                "{} ({:.2})",
                live.current_tariff.tariff_status, live.current_tariff.tariff_price
            )),
        ]);
    }
    table.add_row(vec![
        label("Updated"),
        Cell::new(updated.format("%H:%M:%S")),
    ]);
    table
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub power: f64,
    pub energy: f64,
    pub at: DateTime<Local>,
}

/// Rolling window of live-data samples
#[derive(Debug, Clone)]
pub struct PowerHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for PowerHistory {
    fn default() -> Self {
        Self::new(HISTORY_SIZE)
    }
}

impl PowerHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, live: &LiveData, at: DateTime<Local>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            power: live.power,
            energy: live.charged_energy,
            at,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.power).collect()
    }

    /// Time between the oldest and the newest sample
    pub fn span(&self) -> Duration {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => (last.at - first.at).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Sparkline plus min/max/avg, once there are two samples
    pub fn trend(&self) -> Option<String> {
        if self.samples.len() < 2 {
            return None;
        }
        let powers = self.powers();
        let stats = Stats::of(&powers)?;
        Some(format!(
            "Power Trend\n{}\nMin: {:.1} kW  Max: {:.1} kW  Avg: {:.1} kW  ({})",
            sparkline(&powers),
            stats.min,
            stats.max,
            stats.avg,
            format_duration(self.span())
        ))
    }
}

/// Scale values onto eight block characters
pub fn sparkline(values: &[f64]) -> String {
    let Some(stats) = Stats::of(values) else {
        return String::new();
    };
    let range = if stats.max - stats.min == 0.0 {
        1.0
    } else {
        stats.max - stats.min
    };
    let top = (SPARK_CHARS.len() - 1) as f64;

    values
        .iter()
        .map(|v| {
            let index = (((v - stats.min) / range) * top).clamp(0.0, top) as usize;
            SPARK_CHARS[index]
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl Stats {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, max, avg })
    }
}

/// `42s`, `17m`, `2h5m`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs / 60) % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ekz::ChargeBox;

    #[test]
    fn sparkline_scales_to_range() {
        assert_eq!(sparkline(&[]), "");
        assert_eq!(sparkline(&[0.0, 11.0]), "▁█");
        assert_eq!(sparkline(&[3.0, 3.0, 3.0]), "▁▁▁");
        assert_eq!(sparkline(&[0.0, 7.0, 14.0]).chars().nth(1), Some('▄'));
    }

    #[test]
    fn stats_of_values() {
        assert_eq!(Stats::of(&[]), None);
        let stats = Stats::of(&[1.0, 2.0, 6.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.avg, 3.0);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(17 * 60 + 5)), "17m");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 5 * 60)), "2h5m");
    }

    #[test]
    fn history_is_bounded() {
        let mut history = PowerHistory::new(3);
        let start = Local::now();
        for i in 0..5 {
            let live = LiveData {
                power: i as f64,
                ..Default::default()
            };
            history.record(&live, start + chrono::Duration::seconds(i * 10));
        }
        assert_eq!(history.powers(), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.span(), Duration::from_secs(20));
        assert!(history.trend().unwrap().contains("Max: 4.0 kW"));
    }

    #[test]
    fn station_table_uses_dash_for_missing_status() {
        let stations = vec![ChargingStation {
            charge_boxes: vec![ChargeBox {
                charge_box_id: "CH-1".to_string(),
                charge_box_name: "Garage".to_string(),
                online: true,
                ..Default::default()
            }],
            invoiced: false,
        }];
        let rendered = stations_table(&stations).to_string();
        assert!(rendered.contains("CH-1"));
        assert!(rendered.contains("Garage"));
        assert!(rendered.contains('-'));
        assert!(rendered.contains("CONNECTOR"));
    }
}
