//! Fetch lifecycle state machine (idle/loading/success/error).
//!
//! The single source of truth the UI renders. Responses are applied only
//! while loading and only for the active subject; anything else is a
//! superseded response and is dropped. The machine never retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::{ErrorInfo, SourceError, Subject, ValidationError, WeatherSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Result of offering a response to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Not loading, or the response is for a subject that is no longer active
    Superseded,
}

/// Snapshot of the lifecycle as seen by the UI.
///
/// In `Success` only `data` is set and in `Error` only `error` is set.
/// `Loading` keeps the previous data so stale values can stay on screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchLifecycleState {
    phase: Phase,
    data: Option<Arc<WeatherSnapshot>>,
    error: Option<ErrorInfo>,
    last_updated_at: Option<DateTime<Utc>>,
    active: Option<Subject>,
}

impl FetchLifecycleState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn data(&self) -> Option<&Arc<WeatherSnapshot>> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated_at
    }

    /// Subject of the latest request
    pub fn active(&self) -> Option<&Subject> {
        self.active.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    /// Loading, and for exactly this subject
    pub fn is_loading_for(&self, subject: &Subject) -> bool {
        self.is_loading() && self.active.as_ref() == Some(subject)
    }
}

/// The capability set shared by every lifecycle binding.
pub trait LifecycleStore: Send {
    fn state(&self) -> FetchLifecycleState;

    /// Enter `Loading` for `subject`. Invalid subjects leave the state untouched.
    fn request_fetch(&mut self, subject: Subject) -> Result<(), ValidationError>;

    fn resolve(&mut self, subject: &Subject, snapshot: WeatherSnapshot) -> Transition;

    fn reject(&mut self, subject: &Subject, error: &SourceError) -> Transition;
}

#[derive(Debug, Default)]
pub struct FetchLifecycle {
    state: FetchLifecycleState,
}

impl FetchLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &FetchLifecycleState {
        &self.state
    }

    fn accepts(&self, subject: &Subject) -> bool {
        self.state.is_loading_for(subject)
    }
}

impl LifecycleStore for FetchLifecycle {
    fn state(&self) -> FetchLifecycleState {
        self.state.clone()
    }

    fn request_fetch(&mut self, subject: Subject) -> Result<(), ValidationError> {
        subject.validate()?;
        self.state.phase = Phase::Loading;
        self.state.error = None;
        self.state.active = Some(subject);
        Ok(())
    }

    fn resolve(&mut self, subject: &Subject, snapshot: WeatherSnapshot) -> Transition {
        if !self.accepts(subject) {
            tracing::debug!("Discarding superseded response for {}", subject);
            return Transition::Superseded;
        }
        self.state.phase = Phase::Success;
        self.state.data = Some(Arc::new(snapshot));
        self.state.error = None;
        self.state.last_updated_at = Some(Utc::now());
        Transition::Applied
    }

    fn reject(&mut self, subject: &Subject, error: &SourceError) -> Transition {
        if !self.accepts(subject) {
            tracing::debug!("Discarding superseded failure for {}: {}", subject, error);
            return Transition::Superseded;
        }
        self.state.phase = Phase::Error;
        self.state.data = None;
        self.state.error = Some(ErrorInfo::from(error));
        Transition::Applied
    }
}

/// Store binding: a lifecycle that publishes every change on a watch channel.
pub struct WatchedLifecycle {
    machine: FetchLifecycle,
    tx: watch::Sender<FetchLifecycleState>,
}

impl WatchedLifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(FetchLifecycleState::default());
        Self {
            machine: FetchLifecycle::new(),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchLifecycleState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> &FetchLifecycleState {
        self.machine.current()
    }

    fn publish(&self) {
        self.tx.send_replace(self.machine.state());
    }
}

impl Default for WatchedLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStore for WatchedLifecycle {
    fn state(&self) -> FetchLifecycleState {
        self.machine.state()
    }

    fn request_fetch(&mut self, subject: Subject) -> Result<(), ValidationError> {
        self.machine.request_fetch(subject)?;
        self.publish();
        Ok(())
    }

    fn resolve(&mut self, subject: &Subject, snapshot: WeatherSnapshot) -> Transition {
        let transition = self.machine.resolve(subject, snapshot);
        if transition == Transition::Applied {
            self.publish();
        }
        transition
    }

    fn reject(&mut self, subject: &Subject, error: &SourceError) -> Transition {
        let transition = self.machine.reject(subject, error);
        if transition == Transition::Applied {
            self.publish();
        }
        transition
    }
}
