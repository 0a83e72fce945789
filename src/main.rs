use std::sync::Arc;

use anyhow::Result;
use nimbus_core::{AppError, Config, WeatherError};
use nimbus_weather::stats::{sorted_forecast, SortKey, SortOrder};
use nimbus_weather::{
    MockWeatherSource, Phase, SessionOptions, Subject, TemperatureStats, WeatherSession,
};

/// Log the full error and show the user-facing message
fn report(err: &AppError) {
    tracing::warn!("{}", err);
    eprintln!("{}", err.user_message());
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    nimbus_core::init()?;

    let config = match Config::load_validated() {
        Ok((config, _warnings)) => config,
        Err(e) => {
            report(&AppError::from_anyhow(e));
            tracing::info!("Falling back to default configuration");
            Config::default()
        }
    };

    let location = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.weather.default_location.clone());

    let options = SessionOptions::from(&config.weather);
    let subject = Subject::new(location, options.unit);
    let session = WeatherSession::new(Arc::new(MockWeatherSource::default()), options);
    let mut updates = session.subscribe();

    tracing::info!("Nimbus started");
    println!("Nimbus - weather dashboard");
    println!("  Config directory: {}", config.config_dir.display());
    println!("  Theme: {}", if config.ui.dark_mode { "dark" } else { "light" });
    println!("  Locations: {}", nimbus_weather::provider::mock_locations().join(", "));

    let location = subject.location().to_string();
    if let Err(e) = session.set_subject(subject) {
        report(&AppError::Weather(WeatherError::from(e)));
        session.teardown();
        return Ok(());
    }

    // Wait for the first fetch to settle
    loop {
        updates.changed().await?;
        let state = updates.borrow_and_update().clone();
        match state.phase() {
            Phase::Idle | Phase::Loading => {
                println!("Loading...");
            }
            Phase::Success => {
                if let Some(snapshot) = state.data() {
                    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);

                    let symbol = snapshot.subject().unit().temperature_symbol();
                    if let Some(stats) = TemperatureStats::from_forecast(snapshot.forecast()) {
                        println!(
                            "Forecast range {:.1}{} to {:.1}{}, average {:.1}{}",
                            stats.min, symbol, stats.max, symbol, stats.average, symbol
                        );
                    }
                    let by_temperature =
                        sorted_forecast(snapshot.forecast(), SortKey::Temperature, SortOrder::Descending);
                    if let Some(warmest) = by_temperature.first() {
                        println!(
                            "Warmest day {} at {:.1}{} ({})",
                            warmest.date,
                            warmest.temperature,
                            symbol,
                            warmest.condition.description()
                        );
                    }
                }
                break;
            }
            Phase::Error => {
                if let Some(error) = state.error() {
                    report(&AppError::Weather(error.to_weather_error(&location)));
                }
                break;
            }
        }
    }

    // Graceful shutdown
    session.teardown();

    Ok(())
}
