//! Platform-specific locations and environment detection.
//!
//! The cache lives under the user cache directory:
//! - Linux: `~/.cache/depaudit/`
//! - macOS: `~/Library/Caches/depaudit/`
//! - Windows: `%LOCALAPPDATA%\depaudit\`

use std::path::PathBuf;

const APP_DIR: &str = "depaudit";

/// Root of all persisted depaudit state.
pub fn app_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory holding cached component reports.
pub fn report_cache_dir() -> PathBuf {
    app_cache_dir().join("component-reports")
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

/// CI providers, checked in order. The generic `CI` flag comes last.
const CI_PROVIDERS: &[(&str, &str)] = &[
    ("GITHUB_ACTIONS", "github-actions"),
    ("GITLAB_CI", "gitlab-ci"),
    ("JENKINS_URL", "jenkins"),
    ("CIRCLECI", "circleci"),
    ("TRAVIS", "travis-ci"),
    ("BITBUCKET_BUILD_NUMBER", "bitbucket"),
    ("TF_BUILD", "azure-pipelines"),
    ("TEAMCITY_VERSION", "teamcity"),
    ("CI", "ci"),
];

/// Returns the CI provider the process is running under, if any.
pub fn ci_provider() -> Option<&'static str> {
    ci_provider_from(|key| std::env::var(key).ok())
}

fn ci_provider_from<F>(lookup: F) -> Option<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    CI_PROVIDERS
        .iter()
        .find(|(var, _)| lookup(var).is_some_and(|v| !v.is_empty() && v != "false"))
        .map(|(_, name)| *name)
}

/// `User-Agent` value for outgoing requests.
///
/// Format: `depaudit-client/<version> (<tool>; <os> <arch>[; <ci>])`.
pub fn user_agent(tool: &str) -> String {
    user_agent_with(tool, ci_provider())
}

fn user_agent_with(tool: &str, ci: Option<&str>) -> String {
    let mut details = format!("{}; {} {}", tool, std::env::consts::OS, std::env::consts::ARCH);
    if let Some(ci) = ci {
        details.push_str("; ");
        details.push_str(ci);
    }
    format!("{}-client/{} ({})", APP_DIR, env!("CARGO_PKG_VERSION"), details)
}
