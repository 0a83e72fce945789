//! Time-based call coalescing.
//!
//! [`Throttle`] lets at most one call through per window and defers the rest,
//! keeping only the latest arguments. [`Debounce`] waits for a quiet period
//! and then runs once with the latest arguments. Both own their deferred call
//! and cancel it when cancelled or dropped.
//!
//! [`RateLimiter`] is the per-session registry of gates, keyed by gate key, so
//! a session can dispose of every pending call in one place on teardown.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Action<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Cancellation surface shared by every gate kind.
pub trait Gate: Send + Sync {
    /// Gate key this gate was registered under
    fn key(&self) -> &str;

    /// Drop the deferred call, if any. Returns true if one was pending.
    fn cancel(&self) -> bool;

    fn has_pending(&self) -> bool;
}

/// Outcome of offering a call to a throttle window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run now
    Immediate,
    /// Defer until the window reopens
    DeferUntil(Instant),
}

/// The deferred call slot. The generation lets a wake-up that raced a cancel
/// find out it is stale.
#[derive(Debug, Default)]
struct PendingSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl PendingSlot {
    fn next_generation(&mut self) -> u64 {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    fn arm(&mut self, handle: JoinHandle<()>) {
        self.handle = Some(handle);
    }

    /// Claim the slot for a firing task; false if the task was superseded.
    fn claim(&mut self, generation: u64) -> bool {
        if self.generation != generation || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        true
    }

    fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn is_pending(&self) -> bool {
        self.handle.is_some()
    }
}

/// Per-key throttle state
#[derive(Debug, Default)]
struct ThrottleWindow {
    last_invoked_at: Option<Instant>,
    pending: PendingSlot,
}

impl ThrottleWindow {
    /// A call exactly `delay` after the last execution runs immediately.
    fn admit(&self, now: Instant, delay: Duration) -> Admission {
        match self.last_invoked_at {
            Some(last) if now.saturating_duration_since(last) < delay => {
                Admission::DeferUntil(last + delay)
            }
            _ => Admission::Immediate,
        }
    }
}

struct ThrottleInner<A> {
    key: String,
    delay: Duration,
    action: Action<A>,
    window: Mutex<ThrottleWindow>,
}

impl<A: Send + 'static> ThrottleInner<A> {
    fn fire_pending(&self, generation: u64, args: A) {
        {
            let mut window = self.window.lock();
            if !window.pending.claim(generation) {
                return;
            }
            window.last_invoked_at = Some(Instant::now());
        }
        tracing::debug!("Throttle '{}' running deferred call", self.key);
        (self.action)(args);
    }
}

impl<A: Send + 'static> Gate for ThrottleInner<A> {
    fn key(&self) -> &str {
        &self.key
    }

    fn cancel(&self) -> bool {
        self.window.lock().pending.cancel()
    }

    fn has_pending(&self) -> bool {
        self.window.lock().pending.is_pending()
    }
}

impl<A> Drop for ThrottleInner<A> {
    fn drop(&mut self) {
        self.window.get_mut().pending.cancel();
    }
}

/// Lets at most one call through per `delay`; later calls in the window
/// collapse into one deferred call with the most recent arguments.
///
/// Must be called from within a Tokio runtime.
pub struct Throttle<A> {
    inner: Arc<ThrottleInner<A>>,
}

impl<A> Clone for Throttle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Throttle<A> {
    pub fn new<F>(key: impl Into<String>, delay: Duration, action: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ThrottleInner {
                key: key.into(),
                delay,
                action: Arc::new(action),
                window: Mutex::new(ThrottleWindow::default()),
            }),
        }
    }

    /// Offer a call. Runs the action inline when the window is open.
    pub fn call(&self, args: A) {
        let now = Instant::now();
        let mut window = self.inner.window.lock();

        match window.admit(now, self.inner.delay) {
            Admission::Immediate => {
                window.pending.cancel();
                window.last_invoked_at = Some(now);
                drop(window);
                tracing::debug!("Throttle '{}' running call immediately", self.inner.key);
                (self.inner.action)(args);
            }
            Admission::DeferUntil(at) => {
                let generation = window.pending.next_generation();
                let weak: Weak<ThrottleInner<A>> = Arc::downgrade(&self.inner);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_pending(generation, args);
                    }
                });
                window.pending.arm(handle);
                tracing::debug!(
                    "Throttle '{}' deferring call by {:?}",
                    self.inner.key,
                    at.saturating_duration_since(now)
                );
            }
        }
    }

    /// Disposer: drop the deferred call, if any
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }

    fn as_gate(&self) -> Arc<dyn Gate> {
        self.inner.clone()
    }
}

struct DebounceInner<A> {
    key: String,
    delay: Duration,
    action: Action<A>,
    pending: Mutex<PendingSlot>,
}

impl<A: Send + 'static> DebounceInner<A> {
    fn fire_pending(&self, generation: u64, args: A) {
        if !self.pending.lock().claim(generation) {
            return;
        }
        tracing::debug!("Debounce '{}' quiet period elapsed, running call", self.key);
        (self.action)(args);
    }
}

impl<A: Send + 'static> Gate for DebounceInner<A> {
    fn key(&self) -> &str {
        &self.key
    }

    fn cancel(&self) -> bool {
        self.pending.lock().cancel()
    }

    fn has_pending(&self) -> bool {
        self.pending.lock().is_pending()
    }
}

impl<A> Drop for DebounceInner<A> {
    fn drop(&mut self) {
        self.pending.get_mut().cancel();
    }
}

/// Runs the action once per burst of calls, `delay` after the last one,
/// with that last call's arguments.
///
/// Must be called from within a Tokio runtime.
pub struct Debounce<A> {
    inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debounce<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Debounce<A> {
    pub fn new<F>(key: impl Into<String>, delay: Duration, action: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DebounceInner {
                key: key.into(),
                delay,
                action: Arc::new(action),
                pending: Mutex::new(PendingSlot::default()),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let mut pending = self.inner.pending.lock();
        let generation = pending.next_generation();
        let delay = self.inner.delay;
        let weak: Weak<DebounceInner<A>> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_pending(generation, args);
            }
        });
        pending.arm(handle);
    }

    /// Disposer: drop the deferred call, if any
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }

    fn as_gate(&self) -> Arc<dyn Gate> {
        self.inner.clone()
    }
}

/// Gates owned by one session, keyed by gate key.
#[derive(Default)]
pub struct RateLimiter {
    gates: Mutex<HashMap<String, Arc<dyn Gate>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a throttle. An existing gate with the same key is cancelled and replaced.
    pub fn throttle<A, F>(&self, key: &str, delay: Duration, action: F) -> Throttle<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let throttle = Throttle::new(key, delay, action);
        self.register(throttle.as_gate());
        throttle
    }

    /// Create and register a debounce. An existing gate with the same key is cancelled and replaced.
    pub fn debounce<A, F>(&self, key: &str, delay: Duration, action: F) -> Debounce<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let debounce = Debounce::new(key, delay, action);
        self.register(debounce.as_gate());
        debounce
    }

    fn register(&self, gate: Arc<dyn Gate>) {
        let previous = self.gates.lock().insert(gate.key().to_string(), gate);
        if let Some(previous) = previous {
            tracing::debug!("Replacing rate-limit gate '{}'", previous.key());
            previous.cancel();
        }
    }

    /// True if any gate has a deferred call waiting
    pub fn has_pending(&self) -> bool {
        self.gates.lock().values().any(|gate| gate.has_pending())
    }

    /// Cancel every deferred call and forget all gates.
    pub fn dispose(&self) {
        let gates: Vec<Arc<dyn Gate>> = self.gates.lock().drain().map(|(_, gate)| gate).collect();
        for gate in gates {
            if gate.cancel() {
                tracing::debug!("Cancelled pending call on gate '{}'", gate.key());
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        for gate in self.gates.get_mut().values() {
            gate.cancel();
        }
    }
}
