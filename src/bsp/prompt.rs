//! Questions the orchestrator asks the user, and the answers it accepts.
//!
//! Business logic builds a [`PromptRequest`] and hands it to a
//! [`PromptService`]; the service decides how to show it and returns one of
//! the offered actions, or `None` if the user dismissed it.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// An answer the user can pick.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PromptAction {
    Reconnect,
    NotNow,
    Terminate,
    Keep,
}

impl PromptAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reconnect => "Restart and reconnect",
            Self::NotNow => "Not now",
            Self::Terminate => "Stop it",
            Self::Keep => "Keep it running",
        }
    }
}

/// What the question is about.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PromptTopic {
    VersionChanged { expected: String, running: String },
    OptionsChanged { old: Vec<String>, new: Vec<String> },
    LegacyDaemon { pid: u32, main_class: String },
}

impl fmt::Display for PromptTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionChanged { expected, running } => write!(
                f,
                "The build server is running version {running} but {expected} is configured. \
                 Restart it to use the configured version?"
            ),
            Self::OptionsChanged { .. } => write!(
                f,
                "The build server launch options changed. Restart it to apply them?"
            ),
            Self::LegacyDaemon { pid, main_class } => write!(
                f,
                "An older build server ({main_class}, pid {pid}) is running and may conflict. \
                 Stop it?"
            ),
        }
    }
}

/// A question together with the finite set of accepted answers.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub topic: PromptTopic,
    pub actions: Vec<PromptAction>,
}

impl PromptRequest {
    pub fn reconnect(topic: PromptTopic) -> Self {
        Self { topic, actions: vec![PromptAction::Reconnect, PromptAction::NotNow] }
    }

    pub fn legacy_daemon(pid: u32, main_class: impl Into<String>) -> Self {
        Self {
            topic: PromptTopic::LegacyDaemon { pid, main_class: main_class.into() },
            actions: vec![PromptAction::Terminate, PromptAction::Keep],
        }
    }

    /// Whether `answer` is one of the offered actions.
    pub fn accepts(&self, answer: PromptAction) -> bool {
        self.actions.contains(&answer)
    }
}

/// Shows a request to the user and returns their selection.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn ask(&self, request: PromptRequest) -> Option<PromptAction>;
}

/// Answers every request with the first offered action (`yes`) or nothing.
pub struct FixedAnswer {
    accept: bool,
}

impl FixedAnswer {
    pub const fn accept() -> Self {
        Self { accept: true }
    }

    pub const fn decline() -> Self {
        Self { accept: false }
    }
}

#[async_trait]
impl PromptService for FixedAnswer {
    async fn ask(&self, request: PromptRequest) -> Option<PromptAction> {
        tracing::info!("{}", request.topic);
        if self.accept {
            request.actions.first().copied()
        } else {
            None
        }
    }
}
