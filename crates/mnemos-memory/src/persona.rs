// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{user}}` / `{{char}}` placeholders.
//!
//! Narratives and facts are stored with placeholders so renaming the agent or the
//! user does not rewrite history; names are filled in when text leaves the component.

pub const USER_PLACEHOLDER: &str = "{{user}}";
pub const CHAR_PLACEHOLDER: &str = "{{char}}";

/// Names substituted for the placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub user: String,
    pub char: String,
}

impl Persona {
    pub fn new(user: impl Into<String>, char: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            char: char.into(),
        }
    }

    pub fn from_config(agent: &mnemos_config::model::AgentConfig) -> Self {
        Self::new(&agent.user_name, &agent.char_name)
    }

    pub fn fill(&self, text: &str) -> String {
        text.replace(USER_PLACEHOLDER, &self.user)
            .replace(CHAR_PLACEHOLDER, &self.char)
    }
}
