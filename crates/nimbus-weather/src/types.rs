use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Measurement system a subject is fetched in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Metric,
    Imperial,
}

impl Unit {
    /// The other unit
    pub fn toggled(self) -> Self {
        match self {
            Self::Metric => Self::Imperial,
            Self::Imperial => Self::Metric,
        }
    }

    pub fn temperature_symbol(self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn speed_symbol(self) -> &'static str {
        match self {
            Self::Metric => "m/s",
            Self::Imperial => "mph",
        }
    }
}

impl From<nimbus_core::TemperatureUnit> for Unit {
    fn from(unit: nimbus_core::TemperatureUnit) -> Self {
        match unit {
            nimbus_core::TemperatureUnit::Metric => Self::Metric,
            nimbus_core::TemperatureUnit::Imperial => Self::Imperial,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => f.write_str("metric"),
            Self::Imperial => f.write_str("imperial"),
        }
    }
}

/// The (location, unit) pair being displayed and fetched.
///
/// Replaced wholesale; there is no way to mutate one in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    location: String,
    unit: Unit,
}

impl Subject {
    pub fn new(location: impl Into<String>, unit: Unit) -> Self {
        Self {
            location: location.into(),
            unit,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Same location in another unit
    pub fn with_unit(&self, unit: Unit) -> Self {
        Self::new(self.location.clone(), unit)
    }

    /// Reject subjects that must never be scheduled
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.location.trim().is_empty() {
            return Err(ValidationError::EmptyLocation);
        }
        Ok(())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.unit)
    }
}

/// Weather condition categories mapped from OpenWeatherMap condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert an OpenWeatherMap condition id to a WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_owm_code(code: u16) -> Self {
        match code {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            511 => Self::Sleet, // Freezing rain
            502..=504 | 522 => Self::HeavyRain,
            500..=599 => Self::Rain,
            611..=616 => Self::Sleet,
            600..=699 => Self::Snow,
            700..=799 => Self::Fog,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }

    /// Icon name the UI maps to an actual glyph
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::PartlyCloudy => "cloud_sun",
            Self::Cloudy => "cloud",
            Self::Fog => "cloud_fog",
            Self::Drizzle | Self::Rain | Self::HeavyRain => "cloud_rain",
            Self::Snow | Self::Sleet => "cloud_snow",
            Self::Thunderstorm => "cloud_lightning",
        }
    }
}

/// Current weather conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: u16,
    pub condition: WeatherCondition,
}

/// Daily forecast entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: WeatherCondition,
}

/// Everything one fetch returns for a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    subject: Subject,
    current: CurrentConditions,
    forecast: Vec<DailyForecast>,
    fetched_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Build a snapshot, rejecting forecasts that are out of order or repeat a date.
    pub fn new(
        subject: Subject,
        current: CurrentConditions,
        forecast: Vec<DailyForecast>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, SourceError> {
        if let Some(pair) = forecast.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(SourceError::InvalidData(format!(
                "forecast for {} is not chronological at {}",
                subject, pair[1].date
            )));
        }

        Ok(Self {
            subject,
            current,
            forecast,
            fetched_at,
        })
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn current(&self) -> &CurrentConditions {
        &self.current
    }

    pub fn forecast(&self) -> &[DailyForecast] {
        &self.forecast
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Subject rejected before any fetch is scheduled
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No city selected")]
    EmptyLocation,
    #[error("Unknown city: {0}")]
    UnknownLocation(String),
}

/// Data source failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Weather data not available for {0}")]
    NotFound(String),
    #[error("Weather source unavailable: {0}")]
    Unavailable(String),
    #[error("Weather request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed weather data: {0}")]
    InvalidData(String),
}

/// Error classification kept in the lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    Timeout,
    InvalidData,
}

/// Renderable description of a failed fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SourceError> for ErrorInfo {
    fn from(err: &SourceError) -> Self {
        let kind = match err {
            SourceError::NotFound(_) => ErrorKind::NotFound,
            SourceError::Unavailable(_) => ErrorKind::Unavailable,
            SourceError::Timeout(_) => ErrorKind::Timeout,
            SourceError::InvalidData(_) => ErrorKind::InvalidData,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<SourceError> for nimbus_core::WeatherError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(location) => Self::LocationNotFound(location),
            SourceError::Timeout(_) => Self::Timeout,
            other => Self::SourceError(other.to_string()),
        }
    }
}

impl ErrorInfo {
    /// App-level error for a failure recorded against `location`
    pub fn to_weather_error(&self, location: &str) -> nimbus_core::WeatherError {
        use nimbus_core::WeatherError;

        match self.kind {
            ErrorKind::NotFound => WeatherError::LocationNotFound(location.to_string()),
            ErrorKind::Timeout => WeatherError::Timeout,
            ErrorKind::Unavailable | ErrorKind::InvalidData => {
                WeatherError::SourceError(self.message.clone())
            }
        }
    }
}

impl From<ValidationError> for nimbus_core::WeatherError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::EmptyLocation => Self::InvalidLocation(String::new()),
            ValidationError::UnknownLocation(location) => Self::InvalidLocation(location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(date: &str) -> DailyForecast {
        DailyForecast {
            date: date.parse().unwrap(),
            temperature: 10.0,
            min_temp: 5.0,
            max_temp: 15.0,
            humidity: 50,
            wind_speed: 3.0,
            condition: WeatherCondition::Clear,
        }
    }

    fn current() -> CurrentConditions {
        CurrentConditions {
            temperature: 12.0,
            feels_like: 10.0,
            humidity: 75,
            wind_speed: 5.2,
            wind_deg: 240,
            condition: WeatherCondition::Rain,
        }
    }

    #[test]
    fn test_unit_toggle() {
        assert_eq!(Unit::Metric.toggled(), Unit::Imperial);
        assert_eq!(Unit::Imperial.toggled(), Unit::Metric);
    }

    #[test]
    fn test_subject_value_equality() {
        let a = Subject::new("Tokyo", Unit::Metric);
        assert_eq!(a, Subject::new("Tokyo".to_string(), Unit::Metric));
        assert_ne!(a, a.with_unit(Unit::Imperial));
    }

    #[test]
    fn test_empty_location_rejected() {
        assert_eq!(
            Subject::new("", Unit::Metric).validate(),
            Err(ValidationError::EmptyLocation)
        );
        assert_eq!(
            Subject::new("  \t", Unit::Metric).validate(),
            Err(ValidationError::EmptyLocation)
        );
        assert!(Subject::new("Cairo", Unit::Metric).validate().is_ok());
    }

    #[test]
    fn test_owm_code_mapping() {
        assert_eq!(WeatherCondition::from_owm_code(211), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_owm_code(301), WeatherCondition::Drizzle);
        assert_eq!(WeatherCondition::from_owm_code(500), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_owm_code(502), WeatherCondition::HeavyRain);
        assert_eq!(WeatherCondition::from_owm_code(511), WeatherCondition::Sleet);
        assert_eq!(WeatherCondition::from_owm_code(601), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_owm_code(741), WeatherCondition::Fog);
        assert_eq!(WeatherCondition::from_owm_code(800), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_owm_code(802), WeatherCondition::PartlyCloudy);
        assert_eq!(WeatherCondition::from_owm_code(804), WeatherCondition::Cloudy);
    }

    #[test]
    fn test_source_errors_map_to_app_errors() {
        use nimbus_core::WeatherError;

        let timeout = ErrorInfo::from(&SourceError::Timeout(Duration::from_secs(5)));
        assert_eq!(timeout.kind, ErrorKind::Timeout);
        assert!(matches!(timeout.to_weather_error("Tokyo"), WeatherError::Timeout));

        let missing = ErrorInfo::from(&SourceError::NotFound("atlantis".into()));
        assert!(matches!(
            missing.to_weather_error("Atlantis"),
            WeatherError::LocationNotFound(ref l) if l == "Atlantis"
        ));

        let down = ErrorInfo::from(&SourceError::Unavailable("maintenance".into()));
        let err = down.to_weather_error("London");
        assert!(err.to_string().contains("maintenance"));
        assert_eq!(err.user_message(), "Weather service error. Please try again.");

        let invalid = WeatherError::from(ValidationError::EmptyLocation);
        assert_eq!(invalid.user_message(), "Please choose a city.");
    }

    #[test]
    fn test_unknown_code_defaults_to_clear() {
        assert_eq!(WeatherCondition::from_owm_code(999), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_owm_code(0), WeatherCondition::Clear);
    }

    #[test]
    fn test_condition_icon_name() {
        assert_eq!(WeatherCondition::Clear.icon_name(), "sun");
        assert_eq!(WeatherCondition::Rain.icon_name(), "cloud_rain");
        assert_eq!(WeatherCondition::Thunderstorm.description(), "Thunderstorm");
    }

    #[test]
    fn test_snapshot_rejects_duplicate_dates() {
        let subject = Subject::new("London", Unit::Metric);
        let result = WeatherSnapshot::new(
            subject,
            current(),
            vec![day("2024-01-01"), day("2024-01-01")],
            Utc::now(),
        );
        assert!(matches!(result, Err(SourceError::InvalidData(_))));
    }

    #[test]
    fn test_snapshot_rejects_out_of_order_dates() {
        let subject = Subject::new("London", Unit::Metric);
        let result = WeatherSnapshot::new(
            subject,
            current(),
            vec![day("2024-01-02"), day("2024-01-01")],
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_accepts_chronological_forecast() {
        let subject = Subject::new("London", Unit::Metric);
        let snapshot = WeatherSnapshot::new(
            subject.clone(),
            current(),
            vec![day("2024-01-01"), day("2024-01-02"), day("2024-01-03")],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(snapshot.subject(), &subject);
        assert_eq!(snapshot.forecast().len(), 3);
    }

    #[test]
    fn test_error_info_from_source_error() {
        let info = ErrorInfo::from(&SourceError::NotFound("Atlantis".into()));
        assert_eq!(info.kind, ErrorKind::NotFound);
        assert!(info.message.contains("Atlantis"));
    }

    #[test]
    fn test_core_error_conversion() {
        let err: nimbus_core::WeatherError = SourceError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, nimbus_core::WeatherError::Timeout));
    }
}
