// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory components for a conversational agent.
//!
//! - **LoreBookIndex**: static `title: body` documents, re-embedded only when their
//!   content hash changes
//! - **EpisodicMemory**: timestamped turn digests, recalled by time range and
//!   optionally filtered by topic similarity
//! - **IdentityMemory**: durable facts, recalled by similarity
//! - **CalendarTimeExtractor**: built-in resolver for relative date expressions
//! - **AgentMemory**: all three, opened from one [`mnemos_config::MnemosConfig`]
//!
//! Every component takes its embedder and vector index as injected trait objects.

pub mod agent;
pub mod episodic;
pub mod identity;
pub mod lore_book;
pub mod persona;
pub mod time_hint;

pub use agent::AgentMemory;
pub use episodic::{EpisodicDigest, EpisodicMemory, clean_topic_tag, find_range_indices};
pub use identity::{IdentityFact, IdentityMemory};
pub use lore_book::{LoreBookEntry, LoreBookIndex, ScanReport, ScanState};
pub use persona::Persona;
pub use time_hint::CalendarTimeExtractor;

pub use mnemos_core::{SMALL_TALK_TAG, TimeExtractor, TimeRange, TurnSummarizer};
