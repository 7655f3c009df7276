// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lock event types.
//!
//! A key's event sequence is always a prefix of
//! `start (retry)* (complete | fail)*`. One `complete` terminates it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One state transition of a generation subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventName {
    /// First executor took the lock.
    Start,
    /// A new executor took over after a failure.
    Retry,
    /// Generation finished; terminal.
    Complete,
    /// Generation raised; not terminal.
    Fail,
}

impl LockEventName {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Retry => "retry",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for LockEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockEventName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "retry" => Ok(Self::Retry),
            "complete" => Ok(Self::Complete),
            "fail" => Ok(Self::Fail),
            other => Err(StoreError::InvalidEvent(other.to_string())),
        }
    }
}

/// A stored lock event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEvent {
    /// Total order of events for a key.
    pub id: i64,
    /// `"<generator-name>:<subject-id>"`
    pub key: String,
    /// The transition.
    pub event_name: LockEventName,
    /// Informational only, never used for ordering.
    pub created_at: DateTime<Utc>,
}

/// Composite lock key `"<prefix>:<subject-id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    prefix: String,
    subject_id: String,
}

impl LockKey {
    /// Key for `subject_id` under a generator prefix.
    pub fn new(prefix: impl Into<String>, subject_id: impl fmt::Display) -> Self {
        Self {
            prefix: prefix.into(),
            subject_id: subject_id.to_string(),
        }
    }

    /// Generator prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Subject identifier.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.subject_id)
    }
}

impl FromStr for LockKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((prefix, subject)) if !prefix.is_empty() && !subject.is_empty() => {
                Ok(Self::new(prefix, subject))
            }
            _ => Err(format!("lock key '{s}' is not of the form <prefix>:<subject-id>")),
        }
    }
}

/// Derived state of a key's event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// No events yet.
    Idle,
    /// Last event is `start` or `retry`.
    InProgress,
    /// A `complete` event exists.
    Completed,
    /// Last event is `fail`.
    Failed,
}

impl LockState {
    /// Fold an ordered event log (ascending id).
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a LockEvent>) -> Self {
        events
            .into_iter()
            .fold(Self::Idle, |state, event| match (state, event.event_name) {
                (Self::Completed, _) => Self::Completed,
                (_, LockEventName::Complete) => Self::Completed,
                (_, LockEventName::Fail) => Self::Failed,
                (_, LockEventName::Start | LockEventName::Retry) => Self::InProgress,
            })
    }

    /// State implied by the last event alone.
    pub fn from_last(event: Option<LockEventName>) -> Self {
        match event {
            None => Self::Idle,
            Some(LockEventName::Complete) => Self::Completed,
            Some(LockEventName::Fail) => Self::Failed,
            Some(LockEventName::Start | LockEventName::Retry) => Self::InProgress,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
