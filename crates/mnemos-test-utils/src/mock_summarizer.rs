// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock turn summarizer with queued answers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use mnemos_core::{MnemosError, TurnSummarizer};

/// Pops one queued answer per call; `"mock topic"` once the queue is empty.
#[derive(Clone, Default)]
pub struct MockSummarizer {
    answers: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues tags returned in order.
    pub fn with_tags(tags: &[&str]) -> Self {
        let answers = tags.iter().map(|t| Ok(t.to_string())).collect();
        Self {
            answers: Arc::new(Mutex::new(answers)),
            calls: Arc::default(),
        }
    }

    /// Queues a failure for the next call.
    pub async fn push_failure(&self, message: &str) {
        self.answers.lock().await.push_back(Err(message.to_string()));
    }

    pub async fn push_tag(&self, tag: &str) {
        self.answers.lock().await.push_back(Ok(tag.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TurnSummarizer for MockSummarizer {
    async fn topic_tag(&self, _user_message: &str, _reply: &str) -> Result<String, MnemosError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.lock().await.pop_front() {
            Some(Ok(tag)) => Ok(tag),
            Some(Err(message)) => Err(MnemosError::BackendUnavailable {
                message,
                source: None,
            }),
            None => Ok("mock topic".to_string()),
        }
    }
}
