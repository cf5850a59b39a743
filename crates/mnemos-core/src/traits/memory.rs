// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contracts for the collaborators memory components call out to: the LLM that
//! tags conversation turns and the parser that turns time expressions into ranges.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::error::MnemosError;

/// Tag recorded for turns the summarizer classifies as small talk or cannot tag.
pub const SMALL_TALK_TAG: &str = "daily chat";

/// Produces a short topic tag for one conversation turn.
///
/// Implementations typically ask an LLM. Returning a tag that contains
/// [`SMALL_TALK_TAG`] marks the turn as small talk.
#[async_trait]
pub trait TurnSummarizer: Send + Sync {
    async fn topic_tag(&self, user_message: &str, reply: &str) -> Result<String, MnemosError>;
}

/// Inclusive range of epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Smallest range covering both.
    pub fn union(self, other: TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Finds time expressions in free text and resolves them against `now`.
///
/// Returns one range per recognized expression, in order of appearance. An empty
/// result means the text names no time.
pub trait TimeExtractor: Send + Sync {
    fn extract(&self, text: &str, now: DateTime<FixedOffset>) -> Vec<TimeRange>;
}
