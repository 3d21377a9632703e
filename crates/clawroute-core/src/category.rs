//! Task categories
//!
//! A category drives endpoint candidates, persona, sampling temperature and
//! the degradation path taken after a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inferred intent class of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// General conversation, the default
    Chat,
    /// Multi-step reasoning
    Reason,
    /// Proof-grade reasoning (proofs, optimisation, complexity)
    ReasonStrict,
    /// Structured output (JSON / schema)
    Tool,
}

impl TaskCategory {
    /// All categories, lowest rank first
    pub const ALL: [TaskCategory; 4] = [Self::Chat, Self::Tool, Self::Reason, Self::ReasonStrict];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Reason => "reason",
            Self::ReasonStrict => "reason_strict",
            Self::Tool => "tool",
        }
    }

    /// Position in the degradation order; every fallback step strictly lowers it
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Chat => 0,
            Self::Tool => 1,
            Self::Reason => 2,
            Self::ReasonStrict => 3,
        }
    }

    /// Category to retry with after a failure, `None` for the terminal one
    #[must_use]
    pub fn degrade(self) -> Option<Self> {
        match self {
            Self::ReasonStrict => Some(Self::Reason),
            Self::Reason | Self::Tool => Some(Self::Chat),
            Self::Chat => None,
        }
    }

    /// Sampling temperature
    #[must_use]
    pub fn temperature(self) -> f32 {
        match self {
            Self::Reason | Self::ReasonStrict => 0.5,
            Self::Tool => 0.1,
            Self::Chat => 0.7,
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "reason" => Ok(Self::Reason),
            "reason_strict" | "reason-strict" => Ok(Self::ReasonStrict),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown task category: {other}")),
        }
    }
}

/// Category requested by a caller; `Auto` is resolved by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestedCategory {
    /// Infer from the prompt
    #[default]
    Auto,
    /// Use this category as-is
    Fixed(TaskCategory),
}

impl From<TaskCategory> for RequestedCategory {
    fn from(category: TaskCategory) -> Self {
        Self::Fixed(category)
    }
}

impl fmt::Display for RequestedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(category) => category.fmt(f),
        }
    }
}

impl FromStr for RequestedCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Fixed)
        }
    }
}
