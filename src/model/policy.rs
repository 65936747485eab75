use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyAction {
    #[default]
    None,
    Warning,
    Failure,
}

/// Handle for a submitted evaluation, valid until its terminal status is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyJob {
    pub status_url: String,
}

/// Terminal status body of a policy evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyResult {
    pub policy_action: PolicyAction,
    pub report_html_url: String,
    pub is_error: bool,
    pub error_message: String,
}

/// Business outcome of a finished evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Pass,
    Warning,
    Violation,
}

impl PolicyResult {
    pub fn verdict(&self) -> PolicyVerdict {
        match self.policy_action {
            PolicyAction::None => PolicyVerdict::Pass,
            PolicyAction::Warning => PolicyVerdict::Warning,
            PolicyAction::Failure => PolicyVerdict::Violation,
        }
    }
}
