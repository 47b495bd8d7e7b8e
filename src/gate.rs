//! Client-side PIN gate.
//!
//! This is a convenience screen, not access control: whoever can run the
//! binary can also edit the store. Gate state lives in an injectable
//! [`GateStore`] and changes only through [`PinGate`] operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;

pub const PIN_LENGTH: usize = 4;
pub const MAX_ATTEMPTS: u32 = 3;
pub const LOCK_DURATION_SECS: i64 = 300;

/// Persisted gate state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateState {
    pub authenticated: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Where gate state is kept between calls.
pub trait GateStore {
    fn load(&self) -> Result<GateState>;
    fn save(&self, state: &GateState) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Session-scoped store; gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryGateStore {
    state: Mutex<GateState>,
}

impl MemoryGateStore {
    fn guard(&self) -> MutexGuard<'_, GateState> {
        // Writes replace the whole value, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GateStore for MemoryGateStore {
    fn load(&self) -> Result<GateState> {
        Ok(self.guard().clone())
    }

    fn save(&self, state: &GateState) -> Result<()> {
        *self.guard() = state.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.save(&GateState::default())
    }
}

/// JSON file store, so a lockout survives separate CLI invocations.
#[derive(Debug, Clone)]
pub struct FileGateStore {
    path: PathBuf,
}

impl FileGateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `seedream-edit-gate.json` under the system temp directory.
    pub fn default_location() -> Self {
        Self::new(std::env::temp_dir().join("seedream-edit-gate.json"))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl GateStore for FileGateStore {
    fn load(&self) -> Result<GateState> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(state) => Ok(state),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable gate state");
                    Ok(GateState::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GateState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &GateState) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_string(state)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Result of one PIN entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Granted,
    /// Wrong PIN; this many tries remain before lockout.
    Rejected { remaining_attempts: u32 },
    /// This entry used up the last attempt.
    LockedOut { remaining: chrono::Duration },
    /// Entry refused because a lockout is already running.
    Locked { remaining: chrono::Duration },
    /// Not a complete PIN (wrong length or non-digits); nothing counted.
    Incomplete,
}

/// Current view of the gate for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub authenticated: bool,
    pub failed_attempts: u32,
    pub lock_remaining: Option<chrono::Duration>,
}

pub struct PinGate<S: GateStore> {
    store: S,
    pin: String,
    max_attempts: u32,
    lock_duration: chrono::Duration,
}

impl<S: GateStore> PinGate<S> {
    pub fn new(store: S, pin: impl Into<String>) -> Self {
        Self {
            store,
            pin: pin.into(),
            max_attempts: MAX_ATTEMPTS,
            lock_duration: chrono::Duration::seconds(LOCK_DURATION_SECS),
        }
    }

    /// Load state, dropping a lockout that has already run out.
    fn current(&self, now: DateTime<Utc>) -> Result<GateState> {
        let mut state = self.store.load()?;
        if matches!(state.locked_until, Some(until) if now >= until) {
            state.locked_until = None;
            state.failed_attempts = 0;
            self.store.save(&state)?;
        }
        Ok(state)
    }

    pub fn status(&self, now: DateTime<Utc>) -> Result<GateStatus> {
        let state = self.current(now)?;
        Ok(GateStatus {
            authenticated: state.authenticated,
            failed_attempts: state.failed_attempts,
            lock_remaining: state.locked_until.map(|until| until - now),
        })
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.store.load()?.authenticated)
    }

    pub fn enter(&self, pin: &str, now: DateTime<Utc>) -> Result<GateOutcome> {
        let mut state = self.current(now)?;

        if let Some(until) = state.locked_until {
            return Ok(GateOutcome::Locked {
                remaining: until - now,
            });
        }

        if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(GateOutcome::Incomplete);
        }

        if pin == self.pin {
            state = GateState {
                authenticated: true,
                ..GateState::default()
            };
            self.store.save(&state)?;
            tracing::info!("Gate unlocked");
            return Ok(GateOutcome::Granted);
        }

        state.failed_attempts += 1;
        let outcome = if state.failed_attempts >= self.max_attempts {
            state.locked_until = Some(now + self.lock_duration);
            tracing::warn!(attempts = state.failed_attempts, "Gate locked after repeated failures");
            GateOutcome::LockedOut {
                remaining: self.lock_duration,
            }
        } else {
            GateOutcome::Rejected {
                remaining_attempts: self.max_attempts - state.failed_attempts,
            }
        };
        self.store.save(&state)?;
        Ok(outcome)
    }

    /// Forget authentication, attempts, and any lockout.
    pub fn logout(&self) -> Result<()> {
        self.store.clear()
    }
}

/// Render a countdown as `m:ss`.
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}
