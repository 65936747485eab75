use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use depaudit::{
    audit::Auditor,
    cache::Cache,
    checker::{AuditClient, HttpReportTransport},
    config::{Config, PolicyConfig},
    error::AuditError,
    manifest::{self, Manifest},
    model::{AuditReport, PolicyVerdict, Severity},
    output::{format_result_to_string, print_policy_result, print_result, OutputFormat},
    policy::{HttpPolicyTransport, PolicyEvaluator},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const POLICY_VIOLATION: u8 = 6;
}

#[derive(Parser)]
#[command(name = "depaudit")]
#[command(
    author,
    version,
    about = "Audit dependencies for known vulnerabilities and policy violations"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a dependency list (`go list -m -u all` output or package URLs)
    Audit {
        /// Dependency list to read, stdin when omitted
        input: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Clear cache before auditing
        #[arg(long)]
        clear_cache: bool,

        /// Exit with error if vulnerabilities at or above this severity are found
        #[arg(long, value_enum, default_value = "low")]
        fail_on: FailLevel,

        /// Vulnerability id or CVE to exclude (repeatable)
        #[arg(short = 'e', long = "exclude-vulnerability")]
        exclude: Vec<String>,

        #[command(flatten)]
        auth: ReportAuth,
    },

    /// Audit a dependency list and submit it for policy evaluation
    Policy {
        /// Dependency list to read, stdin when omitted
        input: Option<PathBuf>,

        /// Public application id
        #[arg(short, long)]
        application: Option<String>,

        #[command(flatten)]
        server: PolicyServerArgs,

        /// Abort the whole evaluation after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        #[command(flatten)]
        auth: ReportAuth,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the cache
    ClearCache,
}

#[derive(clap::Args)]
struct ReportAuth {
    /// Component report service username
    #[arg(short, long)]
    username: Option<String>,

    /// Component report service token
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(clap::Args)]
struct PolicyServerArgs {
    /// Policy server URL
    #[arg(long)]
    server_url: Option<String>,

    /// Evaluation stage
    #[arg(long)]
    stage: Option<String>,

    /// Status checks after the first before giving up
    #[arg(long)]
    max_retries: Option<u32>,

    /// Policy server username
    #[arg(long)]
    policy_username: Option<String>,

    /// Policy server token
    #[arg(long)]
    policy_token: Option<String>,
}

impl PolicyServerArgs {
    fn apply(self, config: &mut PolicyConfig) {
        if let Some(url) = self.server_url {
            config.server_url = url;
        }
        if let Some(stage) = self.stage {
            config.stage = stage;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(username) = self.policy_username {
            config.username = username;
        }
        if let Some(token) = self.policy_token {
            config.token = token;
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<AuditError>().is_some_and(AuditError::is_transient) {
                eprintln!("This failure is usually temporary; try again later.");
            }
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "depaudit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = Config::load()?;

    match cli.command {
        Commands::Audit {
            input,
            format,
            output,
            clear_cache,
            fail_on,
            exclude,
            auth,
        } => {
            apply_auth(&mut config, auth);
            config.ignore.vulnerabilities.extend(exclude);

            let format = format.unwrap_or_else(|| config.default_format.clone());
            let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
            let interactive = format == OutputFormat::Table && output.is_none();

            let auditor = build_auditor(&config)?;
            if clear_cache {
                auditor.client().clear_cache().await?;
            }

            let report = run_audit(&auditor, input.as_deref(), interactive).await?;

            if let Some(path) = output {
                std::fs::write(&path, format_result_to_string(&report, format)?)?;
                println!("Results written to: {}", path.display());
            } else {
                print_result(&report, format)?;
            }

            Ok(determine_exit_code(&report, fail_on))
        }
        Commands::Policy {
            input,
            application,
            server,
            timeout_secs,
            auth,
        } => {
            apply_auth(&mut config, auth);
            server.apply(&mut config.policy);
            let application = application
                .or_else(|| config.policy.application.clone())
                .ok_or_else(|| anyhow::anyhow!("No application id. Pass --application or set policy.application"))?;

            let auditor = build_auditor(&config)?;
            let report = run_audit(&auditor, input.as_deref(), true).await?;
            let reports: Vec<_> = report.audited.values().cloned().collect();

            let cancel = cancel_on_signal_or_timeout(timeout_secs.map(Duration::from_secs));
            let transport = HttpPolicyTransport::new(&config.policy.server_url, config.policy.credentials())?;
            let evaluator = PolicyEvaluator::new(Box::new(transport), &config.policy);

            let spinner = spinner("Waiting for policy evaluation...");
            let outcome = evaluator.evaluate(&application, &reports, &cancel).await;
            spinner.finish_and_clear();

            let result = outcome?;
            print_policy_result(&result, &config.policy.server_url);
            Ok(match result.verdict() {
                PolicyVerdict::Violation => exit_codes::POLICY_VIOLATION,
                PolicyVerdict::Pass | PolicyVerdict::Warning => exit_codes::SUCCESS,
            })
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            Cache::with_ttl_hours(config.cache_ttl_hours).clear()?;
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn apply_auth(config: &mut Config, auth: ReportAuth) {
    if auth.username.is_some() {
        config.component_report.username = auth.username;
    }
    if auth.token.is_some() {
        config.component_report.token = auth.token;
    }
}

fn build_auditor(config: &Config) -> Result<Auditor> {
    let transport = HttpReportTransport::new(
        &config.component_report.base_url,
        config.component_report.credentials(),
    )?;
    debug!("Component reports from {}", transport.url());

    let cache = Cache::with_ttl_hours(config.cache_ttl_hours);
    let client = AuditClient::new(Box::new(transport), cache).with_chunk_size(config.component_report.chunk_size);
    Ok(Auditor::new(client, config))
}

async fn run_audit(auditor: &Auditor, input: Option<&Path>, interactive: bool) -> Result<AuditReport> {
    let manifest = manifest::read(input)?;
    if manifest.is_empty() {
        anyhow::bail!("No dependencies found in input");
    }

    let progress = interactive.then(|| spinner(&format!("Auditing {} dependencies...", manifest.len())));

    let outcome = match &manifest {
        Manifest::Projects(projects) => auditor.audit_projects(projects).await,
        Manifest::Purls(purls) => auditor.audit_purls(purls.iter().map(String::as_str)).await,
    };

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    Ok(outcome?)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

/// Token cancelled on Ctrl-C or when `timeout` elapses.
fn cancel_on_signal_or_timeout(timeout: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();

    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_timeout.cancel();
        });
    }

    token
}

/// Determine the exit code based on the worst vulnerable package and --fail-on
fn determine_exit_code(report: &AuditReport, fail_on: FailLevel) -> u8 {
    if report.vulnerable_count() == 0 {
        return exit_codes::SUCCESS;
    }

    // Vulnerable without a score still counts as at least low
    let worst = report.max_severity().max(Severity::Low);
    if worst < fail_on.threshold() {
        return exit_codes::SUCCESS;
    }

    match worst {
        Severity::Critical => exit_codes::CRITICAL_VULN,
        Severity::High => exit_codes::HIGH_VULN,
        Severity::Medium => exit_codes::MEDIUM_VULN,
        Severity::Low | Severity::None => exit_codes::LOW_VULN,
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depaudit config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_flags_override_config() {
        let cli = Cli::try_parse_from([
            "depaudit",
            "policy",
            "deps.txt",
            "--application",
            "my-app",
            "--stage",
            "build",
            "--policy-username",
            "ci-bot",
            "--policy-token",
            "s3cret",
            "--username",
            "reports-user",
        ])
        .unwrap();

        let Commands::Policy {
            application,
            server,
            auth,
            ..
        } = cli.command
        else {
            panic!("expected policy command");
        };

        let mut config = Config::default();
        server.apply(&mut config.policy);
        apply_auth(&mut config, auth);

        assert_eq!(application.as_deref(), Some("my-app"));
        assert_eq!(config.policy.stage, "build");
        assert_eq!(config.policy.username, "ci-bot");
        assert_eq!(config.policy.token, "s3cret");
        assert_eq!(config.policy.server_url, PolicyConfig::default().server_url);
        assert_eq!(config.component_report.username.as_deref(), Some("reports-user"));
    }

    #[test]
    fn test_exit_code_follows_fail_on() {
        let mut report = AuditReport {
            scan_time: chrono::Utc::now(),
            total_input: 1,
            audited: Default::default(),
            invalid: Vec::new(),
            vulnerable: Default::default(),
        };
        assert_eq!(determine_exit_code(&report, FailLevel::Low), exit_codes::SUCCESS);

        let mut vulnerable = depaudit::CoordinateReport::clean("pkg:golang/a@1.0.0");
        vulnerable.vulnerabilities.push(depaudit::Vulnerability {
            id: "v-1".to_string(),
            title: String::new(),
            description: String::new(),
            cvss_score: 7.5,
            cvss_vector: String::new(),
            cve: None,
            reference: String::new(),
            excluded: false,
        });
        report.vulnerable.insert(
            vulnerable.cache_key(),
            depaudit::model::UpdateRecommendation {
                vulnerable,
                update: None,
            },
        );

        assert_eq!(determine_exit_code(&report, FailLevel::Low), exit_codes::HIGH_VULN);
        assert_eq!(determine_exit_code(&report, FailLevel::Critical), exit_codes::SUCCESS);
    }
}
