// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Generic process-lifecycle supervision.
//!
//! This module provides a finite-state supervisor for any long-running
//! operation: a pure transition table over [`ProcessState`], an
//! append-only [`ProcessRecord`] history, and optional dependency
//! declarations gating the `Running` state.
//!
//! The transition function is deliberately separate from any business
//! logic it supervises: callers drive their own work and report state
//! changes; the record validates and remembers them. Every attempted
//! transition - valid or not - is appended to the history with a
//! timestamp and reason.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProcessStateError;

// =============================================================================
// ProcessState
// =============================================================================

/// Lifecycle states of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// The record exists but nothing has been initialized.
    #[default]
    Created,
    /// Resources are initialized.
    Initialized,
    /// Ready to run; dependencies may still gate the start.
    Ready,
    /// Actively running.
    Running,
    /// Parked awaiting an external event.
    Waiting,
    /// Paused by the supervisor; resumable.
    Suspended,
    /// Blocked on an unsatisfied dependency.
    Blocked,
    /// Finished normally. Terminal.
    Terminated,
    /// Finished abnormally.
    Failed,
    /// Failed and awaiting reaping by its owner. Terminal.
    Zombie,
}

impl ProcessState {
    /// Returns the valid target states from this state.
    pub fn valid_transitions(&self) -> &'static [ProcessState] {
        use ProcessState::*;
        match self {
            Created => &[Initialized],
            Initialized => &[Ready, Failed],
            Ready => &[Running, Failed],
            Running => &[Waiting, Suspended, Blocked, Terminated, Failed],
            Waiting => &[Running, Blocked, Terminated, Failed],
            Suspended => &[Running, Terminated, Failed],
            Blocked => &[Ready, Terminated, Failed],
            Failed => &[Zombie],
            Terminated | Zombie => &[],
        }
    }

    /// Returns `true` if a transition to `next` is valid.
    pub fn can_transition_to(&self, next: ProcessState) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Returns `true` if this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Zombie)
    }

    /// Returns `true` if the process is live (not terminal or failed).
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Terminated | Self::Failed | Self::Zombie)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Initialized => "Initialized",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Waiting => "Waiting",
            Self::Suspended => "Suspended",
            Self::Blocked => "Blocked",
            Self::Terminated => "Terminated",
            Self::Failed => "Failed",
            Self::Zombie => "Zombie",
        };
        write!(f, "{}", s)
    }
}

/// Validates a transition without touching any record.
///
/// This is the pure transition function; [`ProcessRecord::transition`]
/// layers history and dependency gating on top of it.
pub fn validate_transition(
    from: ProcessState,
    to: ProcessState,
) -> Result<(), ProcessStateError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ProcessStateError::invalid_transition(from, to))
    }
}

// =============================================================================
// Dependencies
// =============================================================================

/// How strongly a process depends on another unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Must be satisfied before the dependent may run.
    Hard,
    /// Failure is logged but does not gate the dependent.
    Soft,
    /// Never gates the dependent.
    Optional,
}

/// Resolution state of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    /// Not yet resolved.
    #[default]
    Pending,
    /// Satisfied.
    Satisfied,
    /// Failed to resolve.
    Failed,
}

/// A declared dependency of a supervised process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDependency {
    /// Dependency name.
    pub name: String,
    /// Dependency strength.
    pub kind: DependencyKind,
    /// Current resolution state.
    pub state: DependencyState,
}

impl ProcessDependency {
    /// Creates a pending dependency.
    pub fn new(name: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: DependencyState::Pending,
        }
    }
}

// =============================================================================
// TransitionEntry
// =============================================================================

/// One attempted transition, recorded whether it was accepted or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEntry {
    /// State before the attempt.
    pub from: ProcessState,
    /// Requested target state.
    pub to: ProcessState,
    /// When the attempt was made.
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied reason.
    pub reason: String,
    /// Whether the transition was accepted.
    pub accepted: bool,
}

// =============================================================================
// ProcessRecord
// =============================================================================

/// The supervised record of one long-running unit.
///
/// The history is append-only; entries are never mutated or removed. The
/// record itself is destroyed when its owner drops it.
///
/// # Example
///
/// ```
/// use tether_core::process::{ProcessRecord, ProcessState};
///
/// let mut record = ProcessRecord::new("tunnel-client");
/// record.transition(ProcessState::Initialized, "resources allocated").unwrap();
/// record.transition(ProcessState::Ready, "backend available").unwrap();
/// record.transition(ProcessState::Running, "client accepted").unwrap();
/// assert_eq!(record.state(), ProcessState::Running);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    id: Uuid,
    name: String,
    state: ProcessState,
    history: Vec<TransitionEntry>,
    dependencies: Vec<ProcessDependency>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl ProcessRecord {
    /// Creates a record in the `Created` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: ProcessState::Created,
            history: Vec::new(),
            dependencies: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Returns the record id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the record name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns the immutable transition history.
    pub fn history(&self) -> &[TransitionEntry] {
        &self.history
    }

    /// Returns when the record was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the record reached a terminal state, if it has.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Declares a dependency.
    pub fn add_dependency(&mut self, dependency: ProcessDependency) {
        self.dependencies.push(dependency);
    }

    /// Returns the declared dependencies.
    pub fn dependencies(&self) -> &[ProcessDependency] {
        &self.dependencies
    }

    /// Marks a dependency's resolution state by name.
    pub fn resolve_dependency(&mut self, name: &str, state: DependencyState) {
        if let Some(dep) = self.dependencies.iter_mut().find(|d| d.name == name) {
            dep.state = state;
        }
    }

    /// Attempts a transition, appending the attempt to the history either way.
    ///
    /// Transitions to `Running` additionally require every `Hard`
    /// dependency to be `Satisfied`; a failed `Soft` dependency is logged
    /// and allowed through.
    pub fn transition(
        &mut self,
        to: ProcessState,
        reason: impl Into<String>,
    ) -> Result<(), ProcessStateError> {
        let reason = reason.into();
        let from = self.state;

        let mut result = validate_transition(from, to);

        if result.is_ok() && to == ProcessState::Running {
            result = self.check_dependencies();
        }

        self.history.push(TransitionEntry {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.clone(),
            accepted: result.is_ok(),
        });

        match &result {
            Ok(()) => {
                self.state = to;
                if to.is_terminal() || to == ProcessState::Failed {
                    self.ended_at = Some(Utc::now());
                }
                tracing::debug!(
                    process = %self.name,
                    id = %self.id,
                    from = %from,
                    to = %to,
                    reason = %reason,
                    "Lifecycle transition"
                );
            }
            Err(error) => {
                tracing::warn!(
                    process = %self.name,
                    id = %self.id,
                    error = %error,
                    reason = %reason,
                    "Rejected lifecycle transition"
                );
            }
        }

        result
    }

    fn check_dependencies(&self) -> Result<(), ProcessStateError> {
        for dep in &self.dependencies {
            match (dep.kind, dep.state) {
                (DependencyKind::Hard, DependencyState::Satisfied) => {}
                (DependencyKind::Hard, state) => {
                    return Err(ProcessStateError::dependency_unsatisfied(
                        &dep.name,
                        format!("{:?}", state),
                    ));
                }
                (DependencyKind::Soft, DependencyState::Failed) => {
                    tracing::warn!(
                        process = %self.name,
                        dependency = %dep.name,
                        "Soft dependency failed, proceeding anyway"
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
