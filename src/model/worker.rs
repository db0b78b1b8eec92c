//! Workers (developers and the people who report and assign to them) and
//! their per-worker load metrics.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A person known to the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Newtype for worker IDs. Ordering is used as the selection tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub i64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Developer,
    Reporter,
}

impl Role {
    /// The only role whose holders receive work.
    pub const ASSIGNABLE: Role = Role::Developer;
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Developer => "DEVELOPER",
            Role::Reporter => "REPORTER",
        };
        f.pad(s)
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "DEVELOPER" => Ok(Role::Developer),
            "REPORTER" => Ok(Role::Reporter),
            _ => Err(Error::InvalidInput(format!("unknown role: {s}"))),
        }
    }
}

/// Load state for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Assignments whose work item is not yet closed.
    pub open_item_count: u32,
    /// Mean hours to resolve. `0.0` means no history.
    pub avg_resolution_time_hours: f64,
    /// Slowly-updated ground-truth stress in `[0, 1]`. Not the predicted score.
    pub current_stress_score: f64,
}

impl WorkerMetrics {
    pub fn new(open_item_count: u32, avg_resolution_time_hours: f64, current_stress_score: f64) -> Self {
        Self {
            open_item_count,
            avg_resolution_time_hours,
            current_stress_score,
        }
    }

    /// Reject values the store's constraints would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if !self.avg_resolution_time_hours.is_finite() || self.avg_resolution_time_hours < 0.0 {
            return Err(Error::InvalidInput(format!(
                "avg_resolution_time_hours must be a non-negative number, got {}",
                self.avg_resolution_time_hours
            )));
        }
        validate_stress(self.current_stress_score)
    }
}

/// Stress scores, predicted or observed, live in `[0, 1]`.
pub fn validate_stress(score: f64) -> Result<()> {
    if (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "stress score must be within [0, 1], got {score}"
        )))
    }
}

/// Builder for registering a worker.
#[derive(Debug, Clone)]
pub struct NewWorker {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) role: Role,
}

impl NewWorker {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role,
        }
    }
}
