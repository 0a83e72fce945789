//! Recurring auto-refresh timer.
//!
//! At most one timer is live per scheduler. Re-arming cancels the previous
//! timer before the new one starts.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Tick callback. Expected to do its own rate limiting.
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// Auto-refresh intervals offered by the settings panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshInterval {
    Off,
    OneMinute,
    #[default]
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
    OneHour,
}

impl RefreshInterval {
    pub const ALL: [RefreshInterval; 6] = [
        Self::Off,
        Self::OneMinute,
        Self::FiveMinutes,
        Self::TenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::TenMinutes => 10,
            Self::ThirtyMinutes => 30,
            Self::OneHour => 60,
        }
    }

    /// Only the offered values map back; anything else is `None`.
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.minutes() == minutes)
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::OneMinute => "1 minute",
            Self::FiveMinutes => "5 minutes",
            Self::TenMinutes => "10 minutes",
            Self::ThirtyMinutes => "30 minutes",
            Self::OneHour => "1 hour",
        }
    }
}

impl From<RefreshInterval> for Duration {
    fn from(interval: RefreshInterval) -> Self {
        interval.as_duration()
    }
}

struct ArmedTimer {
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Owns zero or one recurring timer.
#[derive(Default)]
pub struct RefreshScheduler {
    timer: Option<ArmedTimer>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `interval`, replacing any live timer.
    /// A zero interval only disarms. The first tick lands one interval from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm(&mut self, interval: Duration, on_tick: TickFn) {
        self.disarm();
        if interval.is_zero() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let start = Instant::now() + interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        on_tick();
                    }
                }
            }
        });

        tracing::debug!("Refresh timer armed every {:?}", interval);
        self.timer = Some(ArmedTimer {
            interval,
            cancel,
            handle,
        });
    }

    /// Stop the live timer, if any. Safe to call at any time.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            tracing::debug!("Refresh timer every {:?} disarmed", timer.interval);
            timer.stop();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Interval of the live timer
    pub fn interval(&self) -> Option<Duration> {
        self.timer.as_ref().map(|t| t.interval)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
