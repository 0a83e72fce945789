//! Unit conversions and forecast summaries shown next to the forecast list.

use std::cmp::Ordering;

use serde::Serialize;

use crate::types::{DailyForecast, Unit};

const MPS_TO_MPH: f64 = 2.237;

/// Convert a temperature into `to`. The input is assumed to be in the other unit.
pub fn convert_temperature(temp: f64, to: Unit) -> f64 {
    match to {
        Unit::Imperial => temp * 9.0 / 5.0 + 32.0,
        Unit::Metric => (temp - 32.0) * 5.0 / 9.0,
    }
}

pub fn mps_to_mph(speed: f64) -> f64 {
    speed * MPS_TO_MPH
}

/// Min/max/average over every day, low, and high temperature of a forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureStats {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

impl TemperatureStats {
    /// `None` for an empty forecast
    pub fn from_forecast(forecast: &[DailyForecast]) -> Option<Self> {
        let temps: Vec<f64> = forecast
            .iter()
            .flat_map(|d| [d.min_temp, d.max_temp, d.temperature])
            .collect();
        if temps.is_empty() {
            return None;
        }

        let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
        let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let average = temps.iter().sum::<f64>() / temps.len() as f64;
        Some(Self { min, max, average })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Date,
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sorted copy of a forecast. Snapshots themselves stay chronological.
pub fn sorted_forecast(forecast: &[DailyForecast], key: SortKey, order: SortOrder) -> Vec<DailyForecast> {
    let mut days = forecast.to_vec();
    days.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Date => a.date.cmp(&b.date),
            SortKey::Temperature => a
                .temperature
                .partial_cmp(&b.temperature)
                .unwrap_or(Ordering::Equal),
        };
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
    days
}
