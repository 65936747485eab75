//! End-to-end audit of a dependency list.
//!
//! Normalizes the input, audits the usable coordinates, applies the ignore
//! list in memory and looks for clean upgrades of whatever is still
//! vulnerable.

use chrono::Utc;
use tracing::info;

use crate::checker::{AuditClient, UpdateResolver};
use crate::config::{Config, IgnoreConfig};
use crate::error::AuditResult;
use crate::model::{AuditReport, CoordinateReport, DependencyProject};
use crate::normalize::{normalize, normalize_projects, Normalized};

pub struct Auditor {
    client: AuditClient,
    ignore: IgnoreConfig,
    ecosystem: String,
}

impl Auditor {
    pub fn new(client: AuditClient, config: &Config) -> Self {
        Self {
            client,
            ignore: config.ignore.clone(),
            ecosystem: config.ecosystem.clone(),
        }
    }

    pub fn client(&self) -> &AuditClient {
        &self.client
    }

    /// Audits manifest records, skipping packages on the ignore list.
    pub async fn audit_projects(&self, projects: &[DependencyProject]) -> AuditResult<AuditReport> {
        let kept: Vec<DependencyProject> = projects
            .iter()
            .filter(|p| !self.ignore.should_ignore_package(&p.name))
            .cloned()
            .collect();
        if kept.len() < projects.len() {
            info!("Skipping {} ignored packages", projects.len() - kept.len());
        }

        self.run(normalize_projects(&kept, &self.ecosystem)).await
    }

    /// Audits package-URL strings.
    pub async fn audit_purls<'a, I>(&self, purls: I) -> AuditResult<AuditReport>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.run(normalize(purls)).await
    }

    async fn run(&self, normalized: Normalized) -> AuditResult<AuditReport> {
        info!(
            total = normalized.total,
            usable = normalized.usable(),
            invalid = normalized.invalid.len(),
            "Auditing dependencies"
        );

        let mut reports = self.client.audit(&normalized.coordinates).await?;
        let excluded = self.ignore.apply(&mut reports, Utc::now().date_naive());
        if excluded > 0 {
            info!("Excluded {} vulnerabilities by ignore list", excluded);
        }

        let vulnerable: Vec<CoordinateReport> = reports
            .iter()
            .filter(|r| r.is_vulnerable())
            .cloned()
            .collect();

        let recommendations = UpdateResolver::new(&self.client, &self.ignore, &self.ecosystem)
            .resolve(&vulnerable, &normalized)
            .await?;

        Ok(AuditReport {
            scan_time: Utc::now(),
            total_input: normalized.total,
            audited: reports.into_iter().map(|r| (r.cache_key(), r)).collect(),
            invalid: normalized.invalid,
            vulnerable: recommendations,
        })
    }
}
