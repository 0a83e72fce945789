//! Weather data sources.
//!
//! The session only sees [`WeatherSource`]. [`MockWeatherSource`] serves a
//! fixed set of cities with simulated latency, which is all the dashboard
//! ships with.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::stats::{convert_temperature, mps_to_mph};
use crate::types::{
    CurrentConditions, DailyForecast, SourceError, Subject, Unit, WeatherCondition,
    WeatherSnapshot,
};

/// Default simulated network delay of the mock source
pub const MOCK_LATENCY: Duration = Duration::from_millis(800);

/// Black-box weather backend.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch a complete snapshot for the subject.
    async fn fetch(&self, subject: &Subject) -> Result<WeatherSnapshot, SourceError>;

    /// Whether the location is in this source's catalogue. `None` means the
    /// source cannot tell before a fetch.
    fn knows_location(&self, _location: &str) -> Option<bool> {
        None
    }
}

struct RawDay {
    temp_day: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u8,
    wind_speed: f64,
    code: u16,
}

struct RawCity {
    key: &'static str,
    name: &'static str,
    temp: f64,
    feels_like: f64,
    humidity: u8,
    wind_speed: f64,
    wind_deg: u16,
    code: u16,
    days: [RawDay; 5],
}

const fn day(temp_day: f64, temp_min: f64, temp_max: f64, humidity: u8, wind_speed: f64, code: u16) -> RawDay {
    RawDay {
        temp_day,
        temp_min,
        temp_max,
        humidity,
        wind_speed,
        code,
    }
}

// Metric base data: °C and m/s.
const CITIES: [RawCity; 5] = [
    RawCity {
        key: "london",
        name: "London",
        temp: 12.0,
        feels_like: 10.0,
        humidity: 75,
        wind_speed: 5.2,
        wind_deg: 240,
        code: 500,
        days: [
            day(13.0, 8.0, 15.0, 70, 4.8, 500),
            day(14.0, 9.0, 16.0, 65, 3.5, 801),
            day(15.0, 10.0, 18.0, 60, 4.2, 800),
            day(14.0, 9.0, 17.0, 68, 5.0, 802),
            day(12.0, 7.0, 14.0, 75, 6.1, 500),
        ],
    },
    RawCity {
        key: "new-york",
        name: "New York",
        temp: 18.0,
        feels_like: 17.0,
        humidity: 62,
        wind_speed: 3.8,
        wind_deg: 180,
        code: 800,
        days: [
            day(20.0, 15.0, 23.0, 58, 4.2, 800),
            day(22.0, 16.0, 25.0, 55, 3.9, 800),
            day(24.0, 18.0, 27.0, 50, 3.5, 801),
            day(23.0, 17.0, 26.0, 52, 4.0, 802),
            day(21.0, 16.0, 24.0, 60, 4.5, 500),
        ],
    },
    RawCity {
        key: "tokyo",
        name: "Tokyo",
        temp: 25.0,
        feels_like: 26.0,
        humidity: 70,
        wind_speed: 2.5,
        wind_deg: 120,
        code: 802,
        days: [
            day(26.0, 21.0, 28.0, 68, 3.0, 802),
            day(27.0, 22.0, 29.0, 65, 2.8, 500),
            day(26.0, 21.0, 28.0, 72, 3.2, 501),
            day(25.0, 20.0, 27.0, 75, 3.5, 500),
            day(24.0, 19.0, 26.0, 70, 3.0, 802),
        ],
    },
    RawCity {
        key: "sydney",
        name: "Sydney",
        temp: 22.0,
        feels_like: 23.0,
        humidity: 55,
        wind_speed: 4.5,
        wind_deg: 200,
        code: 800,
        days: [
            day(23.0, 18.0, 25.0, 50, 5.0, 800),
            day(24.0, 19.0, 26.0, 48, 4.8, 800),
            day(25.0, 20.0, 27.0, 45, 4.5, 801),
            day(24.0, 19.0, 26.0, 50, 5.2, 802),
            day(22.0, 17.0, 24.0, 55, 5.5, 500),
        ],
    },
    RawCity {
        key: "cairo",
        name: "Cairo",
        temp: 32.0,
        feels_like: 30.0,
        humidity: 25,
        wind_speed: 5.8,
        wind_deg: 90,
        code: 800,
        days: [
            day(33.0, 24.0, 35.0, 22, 6.0, 800),
            day(34.0, 25.0, 36.0, 20, 5.5, 800),
            day(35.0, 26.0, 37.0, 18, 5.0, 800),
            day(34.0, 25.0, 36.0, 20, 5.5, 801),
            day(33.0, 24.0, 35.0, 22, 6.0, 801),
        ],
    },
];

/// Catalogue key for a user-facing city name ("New York" -> "new-york")
pub fn location_key(location: &str) -> String {
    location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

fn find_city(location: &str) -> Option<&'static RawCity> {
    let key = location_key(location);
    CITIES.iter().find(|c| c.key == key)
}

/// Display names of every city the mock source serves
pub fn mock_locations() -> Vec<&'static str> {
    CITIES.iter().map(|c| c.name).collect()
}

fn speed(value: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Metric => value,
        Unit::Imperial => mps_to_mph(value),
    }
}

fn temperature(celsius: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Metric => celsius,
        Unit::Imperial => convert_temperature(celsius, Unit::Imperial),
    }
}

fn build_snapshot(city: &RawCity, subject: &Subject, today: NaiveDate) -> Result<WeatherSnapshot, SourceError> {
    let unit = subject.unit();
    let current = CurrentConditions {
        temperature: temperature(city.temp, unit),
        feels_like: temperature(city.feels_like, unit),
        humidity: city.humidity,
        wind_speed: speed(city.wind_speed, unit),
        wind_deg: city.wind_deg,
        condition: WeatherCondition::from_owm_code(city.code),
    };

    let forecast = city
        .days
        .iter()
        .zip(1u64..)
        .map(|(raw, offset)| {
            let date = today.checked_add_days(Days::new(offset)).ok_or_else(|| {
                SourceError::InvalidData(format!("forecast date out of range for {}", city.name))
            })?;
            Ok(DailyForecast {
                date,
                temperature: temperature(raw.temp_day, unit),
                min_temp: temperature(raw.temp_min, unit),
                max_temp: temperature(raw.temp_max, unit),
                humidity: raw.humidity,
                wind_speed: speed(raw.wind_speed, unit),
                condition: WeatherCondition::from_owm_code(raw.code),
            })
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    WeatherSnapshot::new(subject.clone(), current, forecast, Utc::now())
}

/// In-process data source serving the bundled city tables.
pub struct MockWeatherSource {
    latency: Duration,
    location_latency: HashMap<String, Duration>,
    failure: Mutex<Option<SourceError>>,
    fetches: Mutex<Vec<Subject>>,
}

impl Default for MockWeatherSource {
    fn default() -> Self {
        Self::new(MOCK_LATENCY)
    }
}

impl MockWeatherSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            location_latency: HashMap::new(),
            failure: Mutex::new(None),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Override the simulated delay for one location
    pub fn with_location_latency(mut self, location: &str, latency: Duration) -> Self {
        self.location_latency.insert(location_key(location), latency);
        self
    }

    /// Make every following fetch fail with `error`
    pub fn fail_with(&self, error: SourceError) {
        *self.failure.lock() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Number of fetches that reached this source
    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    /// Subjects fetched so far, oldest first
    pub fn fetched(&self) -> Vec<Subject> {
        self.fetches.lock().clone()
    }

    fn latency_for(&self, location: &str) -> Duration {
        self.location_latency
            .get(&location_key(location))
            .copied()
            .unwrap_or(self.latency)
    }
}

#[async_trait]
impl WeatherSource for MockWeatherSource {
    async fn fetch(&self, subject: &Subject) -> Result<WeatherSnapshot, SourceError> {
        self.fetches.lock().push(subject.clone());
        tracing::debug!("Mock source fetching {}", subject);

        tokio::time::sleep(self.latency_for(subject.location())).await;

        let failure = self.failure.lock().clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let city = find_city(subject.location())
            .ok_or_else(|| SourceError::NotFound(subject.location().to_string()))?;

        build_snapshot(city, subject, Utc::now().date_naive())
    }

    fn knows_location(&self, location: &str) -> Option<bool> {
        Some(find_city(location).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_key_normalizes_names() {
        assert_eq!(location_key("New York"), "new-york");
        assert_eq!(location_key("  new   york "), "new-york");
        assert_eq!(location_key("TOKYO"), "tokyo");
    }

    #[test]
    fn test_knows_bundled_cities() {
        let source = MockWeatherSource::default();
        assert_eq!(source.knows_location("Cairo"), Some(true));
        assert_eq!(source.knows_location("new-york"), Some(true));
        assert_eq!(source.knows_location("Atlantis"), Some(false));
        assert_eq!(mock_locations().len(), 5);
    }

    #[test]
    fn test_snapshot_has_five_chronological_days() {
        let subject = Subject::new("London", Unit::Metric);
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let snapshot = build_snapshot(&CITIES[0], &subject, today).unwrap();

        let dates: Vec<_> = snapshot.forecast().iter().map(|d| d.date.to_string()).collect();
        assert_eq!(
            dates,
            vec!["2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05", "2024-01-06"]
        );
        assert_eq!(snapshot.current().condition, WeatherCondition::Rain);
    }

    #[test]
    fn test_imperial_converts_temperature_and_wind() {
        let subject = Subject::new("Cairo", Unit::Imperial);
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let snapshot = build_snapshot(&CITIES[4], &subject, today).unwrap();

        assert!((snapshot.current().temperature - 89.6).abs() < 1e-9);
        assert!((snapshot.current().wind_speed - 5.8 * 2.237).abs() < 1e-9);
        assert!((snapshot.forecast()[0].max_temp - 95.0).abs() < 1e-9);
        assert_eq!(snapshot.current().humidity, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_returns_requested_subject() {
        let source = MockWeatherSource::default();
        let subject = Subject::new("Tokyo", Unit::Metric);

        let snapshot = source.fetch(&subject).await.unwrap();
        assert_eq!(snapshot.subject(), &subject);
        assert_eq!(snapshot.current().temperature, 25.0);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_unknown_city_is_not_found() {
        let source = MockWeatherSource::default();
        let err = source
            .fetch(&Subject::new("Atlantis", Unit::Metric))
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::NotFound("Atlantis".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_failure_is_returned() {
        let source = MockWeatherSource::new(Duration::from_millis(10));
        source.fail_with(SourceError::Unavailable("maintenance".into()));
        let subject = Subject::new("London", Unit::Metric);
        assert!(source.fetch(&subject).await.is_err());

        source.clear_failure();
        assert!(source.fetch(&subject).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_takes_simulated_latency() {
        let source = MockWeatherSource::default().with_location_latency("Sydney", Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        source.fetch(&Subject::new("Sydney", Unit::Metric)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
