//! Deciding when a configuration change warrants restarting the daemon.

use super::config::UserConfiguration;
use super::prompt::{PromptRequest, PromptTopic};

/// Produced when the configured daemon version may differ from the running one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatchEvent {
    pub expected: String,
    pub running: String,
    /// The new configuration pins a version.
    pub user_defined_new: bool,
    /// The previous configuration pinned a version.
    pub user_defined_old: bool,
}

impl VersionMismatchEvent {
    /// A restart is worth offering when the user pinned a different version,
    /// or removed their pin and the default still differs from what runs.
    pub fn needs_reconnect(&self) -> bool {
        let mismatched = self.expected != self.running;
        (self.user_defined_old && !self.user_defined_new && mismatched)
            || (self.user_defined_new && mismatched)
    }

    pub fn prompt(&self) -> PromptRequest {
        PromptRequest::reconnect(PromptTopic::VersionChanged {
            expected: self.expected.clone(),
            running: self.running.clone(),
        })
    }
}

/// Reconnect prompt for changed launch options, or `None` if they are equal.
pub fn properties_change_prompt(old: &[String], new: &[String]) -> Option<PromptRequest> {
    (old != new).then(|| {
        PromptRequest::reconnect(PromptTopic::OptionsChanged { old: old.to_vec(), new: new.to_vec() })
    })
}

/// Version event for a configuration update, given what the daemon reports.
pub fn version_event(
    old: &UserConfiguration,
    new: &UserConfiguration,
    running: &str,
) -> VersionMismatchEvent {
    VersionMismatchEvent {
        expected: new.effective_version().to_string(),
        running: running.to_string(),
        user_defined_new: new.daemon_version.is_some(),
        user_defined_old: old.daemon_version.is_some(),
    }
}
