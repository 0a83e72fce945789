//! Weather data-refresh core for Nimbus
//!
//! Fetch lifecycle state machine, throttle/debounce gates, the auto-refresh
//! timer, and the session that composes them over a pluggable data source.

pub mod lifecycle;
pub mod limiter;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod types;

pub use lifecycle::{FetchLifecycle, FetchLifecycleState, LifecycleStore, Phase, Transition, WatchedLifecycle};
pub use limiter::{Debounce, Gate, RateLimiter, Throttle};
pub use provider::{MockWeatherSource, WeatherSource};
pub use scheduler::{RefreshInterval, RefreshScheduler};
pub use session::{ScheduleConfig, SessionOptions, WeatherSession};
pub use stats::TemperatureStats;
pub use types::*;
