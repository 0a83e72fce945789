//! One dashboard session: the current subject, its fetch lifecycle, the
//! throttled fetch path, and the auto-refresh timer.
//!
//! Every fetch, whether from a subject change, a manual refresh, or a timer
//! tick, goes through the same throttle gate. Completions are checked against
//! the subject that is current when they arrive, so a slow response for an
//! old subject never overwrites newer state.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use nimbus_core::WeatherConfig;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::lifecycle::{FetchLifecycleState, LifecycleStore, Transition, WatchedLifecycle};
use crate::limiter::{Debounce, RateLimiter, Throttle};
use crate::provider::WeatherSource;
use crate::scheduler::{RefreshInterval, RefreshScheduler, TickFn};
use crate::types::{SourceError, Subject, Unit, ValidationError, WeatherSnapshot};

/// Gate key of the data-source fetch path
pub const FETCH_GATE: &str = "fetch";
/// Gate key of the typed city input
pub const LOCATION_INPUT_GATE: &str = "location-input";

/// Minimum spacing between two fetches
pub const DEFAULT_FETCH_FLOOR: Duration = Duration::from_millis(5000);
pub const DEFAULT_INPUT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub fetch_floor: Duration,
    pub input_debounce: Duration,
    pub refresh_interval: Duration,
    /// `None` waits on the data source indefinitely
    pub fetch_timeout: Option<Duration>,
    pub unit: Unit,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fetch_floor: DEFAULT_FETCH_FLOOR,
            input_debounce: DEFAULT_INPUT_DEBOUNCE,
            refresh_interval: RefreshInterval::default().as_duration(),
            fetch_timeout: None,
            unit: Unit::default(),
        }
    }
}

impl From<&WeatherConfig> for SessionOptions {
    fn from(config: &WeatherConfig) -> Self {
        Self {
            fetch_floor: Duration::from_millis(config.throttle_ms),
            input_debounce: Duration::from_millis(config.debounce_ms),
            refresh_interval: Duration::from_secs(u64::from(config.refresh_minutes) * 60),
            fetch_timeout: (config.fetch_timeout_secs > 0)
                .then(|| Duration::from_secs(config.fetch_timeout_secs)),
            unit: config.temperature_unit.into(),
        }
    }
}

/// Recurring refresh setting. Zero means no auto-refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleConfig {
    pub interval: Duration,
}

struct SessionState {
    subject: Option<Subject>,
    unit: Unit,
    schedule: ScheduleConfig,
    lifecycle: WatchedLifecycle,
    scheduler: RefreshScheduler,
    in_flight: HashSet<Subject>,
    torn_down: bool,
}

struct SessionInner {
    source: Arc<dyn WeatherSource>,
    fetch_timeout: Option<Duration>,
    state: Mutex<SessionState>,
    limiter: RateLimiter,
    dispatcher: Throttle<Subject>,
    location_input: Debounce<String>,
}

impl SessionInner {
    fn validate(&self, subject: &Subject) -> Result<(), ValidationError> {
        subject.validate()?;
        if self.source.knows_location(subject.location()) == Some(false) {
            return Err(ValidationError::UnknownLocation(subject.location().to_string()));
        }
        Ok(())
    }

    fn set_subject(self: &Arc<Self>, subject: Subject) -> Result<(), ValidationError> {
        self.validate(&subject)?;
        {
            let mut state = self.state.lock();
            if state.torn_down {
                tracing::debug!("Ignoring subject {} on a torn-down session", subject);
                return Ok(());
            }
            if state.subject.as_ref() == Some(&subject) {
                return Ok(());
            }
            state.lifecycle.request_fetch(subject.clone())?;
            state.unit = subject.unit();
            state.subject = Some(subject.clone());
            self.rearm(&mut state);
        }

        tracing::info!("Weather subject changed to {}", subject);
        self.dispatcher.call(subject);
        Ok(())
    }

    /// Re-fetch whatever subject is current right now.
    fn refresh_current(&self, reason: &str) {
        let subject = {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }
            let Some(subject) = state.subject.clone() else {
                tracing::debug!("Skipping {}: no city selected", reason);
                return;
            };
            if let Err(e) = state.lifecycle.request_fetch(subject.clone()) {
                tracing::warn!("Skipping {} for {}: {}", reason, subject, e);
                return;
            }
            subject
        };

        tracing::debug!("{} for {}", reason, subject);
        self.dispatcher.call(subject);
    }

    fn apply_location_input(self: &Arc<Self>, text: String) {
        let unit = self.state.lock().unit;
        let subject = Subject::new(text.trim(), unit);
        if let Err(e) = self.set_subject(subject) {
            tracing::warn!("Ignoring location input {:?}: {}", text, e);
        }
    }

    /// (Re)start the refresh timer for the current schedule. Caller holds the state lock.
    fn rearm(self: &Arc<Self>, state: &mut SessionState) {
        let weak = Arc::downgrade(self);
        let tick: TickFn = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.refresh_current("Auto-refresh");
            }
        });
        state.scheduler.arm(state.schedule.interval, tick);
    }

    /// Throttle action: actually call the data source.
    fn dispatch(self: &Arc<Self>, subject: Subject) {
        {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }
            if state.subject.as_ref() != Some(&subject) {
                tracing::debug!("Not dispatching stale fetch for {}", subject);
                return;
            }
            if state.in_flight.contains(&subject) {
                tracing::debug!("Fetch for {} already in flight", subject);
                return;
            }
            // An earlier fetch may have settled the lifecycle while this call
            // waited in the throttle. Re-enter Loading so the response applies.
            if !state.lifecycle.current().is_loading_for(&subject) {
                if let Err(e) = state.lifecycle.request_fetch(subject.clone()) {
                    tracing::warn!("Not dispatching fetch for {}: {}", subject, e);
                    return;
                }
            }
            state.in_flight.insert(subject.clone());
        }

        let weak: Weak<SessionInner> = Arc::downgrade(self);
        let source = Arc::clone(&self.source);
        let timeout = self.fetch_timeout;
        tokio::spawn(async move {
            let result = fetch_with_timeout(source.as_ref(), &subject, timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.complete(subject, result);
            }
        });
    }

    fn complete(&self, subject: Subject, result: Result<WeatherSnapshot, SourceError>) {
        let mut state = self.state.lock();
        state.in_flight.remove(&subject);

        if state.torn_down {
            tracing::debug!("Dropping response for {}: session torn down", subject);
            return;
        }
        if state.subject.as_ref() != Some(&subject) {
            tracing::debug!("Dropping superseded response for {}", subject);
            return;
        }

        match result {
            Ok(snapshot) => {
                if state.lifecycle.resolve(&subject, snapshot) == Transition::Applied {
                    tracing::info!("Weather updated for {}", subject);
                }
            }
            Err(err) => {
                tracing::warn!("Weather fetch failed for {}: {}", subject, err);
                state.lifecycle.reject(&subject, &err);
            }
        }
    }
}

async fn fetch_with_timeout(
    source: &dyn WeatherSource,
    subject: &Subject,
    timeout: Option<Duration>,
) -> Result<WeatherSnapshot, SourceError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, source.fetch(subject))
            .await
            .map_err(|_| SourceError::Timeout(limit))?,
        None => source.fetch(subject).await,
    }
}

/// The orchestrator bound to one UI session.
///
/// Must be created and used inside a Tokio runtime. Call [`teardown`](Self::teardown)
/// (or drop the session) before discarding it so no timer keeps firing.
pub struct WeatherSession {
    inner: Arc<SessionInner>,
}

impl WeatherSession {
    pub fn new(source: Arc<dyn WeatherSource>, options: SessionOptions) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let limiter = RateLimiter::new();

            let on_fetch = weak.clone();
            let dispatcher = limiter.throttle(FETCH_GATE, options.fetch_floor, move |subject: Subject| {
                if let Some(inner) = on_fetch.upgrade() {
                    inner.dispatch(subject);
                }
            });

            let on_input = weak.clone();
            let location_input =
                limiter.debounce(LOCATION_INPUT_GATE, options.input_debounce, move |text: String| {
                    if let Some(inner) = on_input.upgrade() {
                        inner.apply_location_input(text);
                    }
                });

            SessionInner {
                source,
                fetch_timeout: options.fetch_timeout,
                state: Mutex::new(SessionState {
                    subject: None,
                    unit: options.unit,
                    schedule: ScheduleConfig::default(),
                    lifecycle: WatchedLifecycle::new(),
                    scheduler: RefreshScheduler::new(),
                    in_flight: HashSet::new(),
                    torn_down: false,
                }),
                limiter,
                dispatcher,
                location_input,
            }
        });

        let session = Self { inner };
        session.set_refresh_interval(options.refresh_interval);
        session
    }

    /// Show `subject`. Invalid subjects are rejected before anything changes.
    pub fn set_subject(&self, subject: Subject) -> Result<(), ValidationError> {
        self.inner.set_subject(subject)
    }

    /// Same location, other unit. Without a city only the preference flips.
    pub fn toggle_unit(&self) -> Result<(), ValidationError> {
        let next = {
            let mut state = self.inner.state.lock();
            state.unit = state.unit.toggled();
            state.subject.as_ref().map(|s| s.with_unit(state.unit))
        };
        match next {
            Some(subject) => self.set_subject(subject),
            None => Ok(()),
        }
    }

    /// Manual refresh of the current subject through the fetch gate
    pub fn refresh(&self) {
        self.inner.refresh_current("Manual refresh");
    }

    /// Typed city search; applied once typing pauses.
    pub fn set_location_input(&self, text: impl Into<String>) {
        if self.is_torn_down() {
            return;
        }
        self.inner.location_input.call(text.into());
    }

    pub fn set_refresh_interval(&self, interval: Duration) {
        let mut state = self.inner.state.lock();
        if state.torn_down {
            return;
        }
        state.schedule.interval = interval;
        self.inner.rearm(&mut state);
        if interval.is_zero() {
            tracing::info!("Weather auto-refresh off");
        } else {
            tracing::info!("Weather auto-refresh every {:?}", interval);
        }
    }

    /// Stop the timer and every pending deferred call. In-flight fetches are
    /// left to finish and their results dropped.
    pub fn teardown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.scheduler.disarm();
        }
        if self.inner.limiter.has_pending() {
            tracing::debug!("Cancelling deferred weather calls");
        }
        self.inner.limiter.dispose();
        tracing::info!("Weather session torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.state.lock().torn_down
    }

    pub fn state(&self) -> FetchLifecycleState {
        self.inner.state.lock().lifecycle.state()
    }

    /// Receiver that sees every lifecycle change
    pub fn subscribe(&self) -> watch::Receiver<FetchLifecycleState> {
        self.inner.state.lock().lifecycle.subscribe()
    }

    pub fn subject(&self) -> Option<Subject> {
        self.inner.state.lock().subject.clone()
    }

    pub fn unit(&self) -> Unit {
        self.inner.state.lock().unit
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.state.lock().schedule.interval
    }

    /// True while the auto-refresh timer is live
    pub fn is_auto_refreshing(&self) -> bool {
        self.inner.state.lock().scheduler.is_armed()
    }
}

impl Drop for WeatherSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::TemperatureUnit;

    #[test]
    fn test_options_from_config() {
        let config = WeatherConfig {
            temperature_unit: TemperatureUnit::Imperial,
            refresh_minutes: 10,
            throttle_ms: 2000,
            debounce_ms: 150,
            fetch_timeout_secs: 30,
            ..WeatherConfig::default()
        };
        let options = SessionOptions::from(&config);
        assert_eq!(options.fetch_floor, Duration::from_secs(2));
        assert_eq!(options.input_debounce, Duration::from_millis(150));
        assert_eq!(options.refresh_interval, Duration::from_secs(600));
        assert_eq!(options.fetch_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.unit, Unit::Imperial);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let options = SessionOptions::from(&WeatherConfig::default());
        assert_eq!(options.fetch_timeout, None);
        assert_eq!(options.fetch_floor, DEFAULT_FETCH_FLOOR);
    }
}
