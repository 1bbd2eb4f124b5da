//! Explicit confirmation for destructive actions.
//!
//! A [`Confirmed`] value can only be produced by confirming a
//! [`PendingAction`], so an operation that takes one cannot be invoked
//! without the confirmation step. When the operation fails afterwards it
//! hands back an [`ActionFailed`] holding the re-opened pending action.

use std::fmt::Debug;

use leadpilot_core::error::LeadpilotError;

/// A destructive action awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction<T> {
    action: T,
}

impl<T> PendingAction<T> {
    pub fn new(action: T) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &T {
        &self.action
    }

    pub fn confirm(self) -> Confirmed<T> {
        Confirmed {
            action: self.action,
        }
    }

    /// Abandon the action.
    pub fn cancel(self) -> T {
        self.action
    }
}

/// A confirmed destructive action. No public constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed<T> {
    action: T,
}

impl<T> Confirmed<T> {
    pub fn action(&self) -> &T {
        &self.action
    }

    pub(crate) fn reopen(self) -> PendingAction<T> {
        PendingAction {
            action: self.action,
        }
    }
}

impl<T: Debug> Confirmed<T> {
    pub(crate) fn fail(self, error: LeadpilotError) -> ActionFailed<T> {
        ActionFailed {
            pending: self.reopen(),
            error,
        }
    }
}

/// A confirmed action that failed. `pending` is ready to be shown to the
/// user again.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ActionFailed<T: Debug> {
    pub pending: PendingAction<T>,
    #[source]
    pub error: LeadpilotError,
}

impl<T: Debug> ActionFailed<T> {
    pub fn into_error(self) -> LeadpilotError {
        self.error
    }
}
