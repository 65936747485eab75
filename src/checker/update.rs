use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::AuditClient;
use crate::config::IgnoreConfig;
use crate::error::AuditResult;
use crate::model::{Coordinate, CoordinateReport, UpdateRecommendation};
use crate::normalize::{clean_version, Normalized};

/// Finds non-vulnerable upgrade targets for vulnerable coordinates.
///
/// Only the update version the manifest offered is considered. When that
/// version is itself vulnerable no further search is made.
pub struct UpdateResolver<'a> {
    client: &'a AuditClient,
    ignore: &'a IgnoreConfig,
    ecosystem: &'a str,
}

impl<'a> UpdateResolver<'a> {
    /// `ecosystem` is used when a record's coordinate carries no package-URL type.
    pub fn new(client: &'a AuditClient, ignore: &'a IgnoreConfig, ecosystem: &'a str) -> Self {
        Self {
            client,
            ignore,
            ecosystem,
        }
    }

    pub async fn resolve(
        &self,
        vulnerable: &[CoordinateReport],
        origins: &Normalized,
    ) -> AuditResult<BTreeMap<String, UpdateRecommendation>> {
        let mut recommendations: BTreeMap<String, UpdateRecommendation> = vulnerable
            .iter()
            .map(|record| {
                (
                    record.cache_key(),
                    UpdateRecommendation {
                        vulnerable: record.clone(),
                        update: None,
                    },
                )
            })
            .collect();

        let candidates = self.candidates(vulnerable, origins);
        if candidates.is_empty() {
            return Ok(recommendations);
        }

        let mut keys: Vec<Coordinate> = candidates.iter().map(|(_, c)| c.clone()).collect();
        keys.sort();
        keys.dedup();
        debug!("Checking {} update candidates", keys.len());

        let mut reports = self.client.audit(&keys).await?;
        self.ignore.apply(&mut reports, Utc::now().date_naive());

        let by_key: HashMap<String, CoordinateReport> = reports
            .into_iter()
            .map(|report| (report.cache_key(), report))
            .collect();

        for (vulnerable_key, candidate) in candidates {
            let Some(report) = by_key.get(&candidate.cache_key()) else {
                continue;
            };
            if report.is_vulnerable() {
                debug!("Update {} is still vulnerable", candidate);
                continue;
            }
            if let Some(recommendation) = recommendations.get_mut(&vulnerable_key) {
                recommendation.update = Some(report.clone());
            }
        }

        Ok(recommendations)
    }

    /// Pairs each vulnerable record's key with the coordinate of its update.
    fn candidates(&self, vulnerable: &[CoordinateReport], origins: &Normalized) -> Vec<(String, Coordinate)> {
        vulnerable
            .iter()
            .filter_map(|record| {
                let key = record.cache_key();
                let project = origins.origin(&key)?;
                let update = project.update.as_deref()?;
                let Some(version) = clean_version(update) else {
                    debug!("Skipping unusable update version '{}' for {}", update, project.name);
                    return None;
                };

                let ecosystem = purl_type(&record.coordinates).unwrap_or(self.ecosystem);
                Some((key, Coordinate::new(ecosystem, &project.name, &version)))
            })
            .collect()
    }
}

fn purl_type(coordinates: &str) -> Option<&str> {
    coordinates
        .strip_prefix("pkg:")?
        .split_once('/')
        .map(|(ecosystem, _)| ecosystem)
        .filter(|ecosystem| !ecosystem.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::checker::testing::FakeTransport;
    use crate::model::DependencyProject;
    use crate::normalize::normalize_projects;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        transport: FakeTransport,
        client: AuditClient,
        _temp: TempDir,
    }

    fn fixture(vulnerable: &[(&str, f64)]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let transport = FakeTransport::with_vulnerable(vulnerable);
        let cache = Cache::at(temp.path().join("reports"), Duration::from_secs(3600));
        let client = AuditClient::new(Box::new(transport.clone()), cache);
        Fixture {
            transport,
            client,
            _temp: temp,
        }
    }

    async fn vulnerable_reports(client: &AuditClient, origins: &Normalized) -> Vec<CoordinateReport> {
        client
            .audit(&origins.coordinates)
            .await
            .unwrap()
            .into_iter()
            .filter(CoordinateReport::is_vulnerable)
            .collect()
    }

    #[tokio::test]
    async fn test_clean_update_is_recommended() {
        let fx = fixture(&[("pkg:golang/a@1.0.0", 7.5)]);
        let projects = vec![DependencyProject::new("a", "v1.0.0").with_update("v1.1.0")];
        let origins = normalize_projects(&projects, "golang");
        let vulnerable = vulnerable_reports(&fx.client, &origins).await;
        let ignore = IgnoreConfig::default();

        let result = UpdateResolver::new(&fx.client, &ignore, "golang")
            .resolve(&vulnerable, &origins)
            .await
            .unwrap();

        let recommendation = &result["pkg:golang/a@1.0.0"];
        assert_eq!(
            recommendation.update.as_ref().unwrap().coordinates,
            "pkg:golang/a@1.1.0"
        );
        assert_eq!(fx.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_vulnerable_update_is_not_recommended() {
        let fx = fixture(&[("pkg:golang/a@1.0.0", 7.5), ("pkg:golang/a@1.1.0", 5.0)]);
        let projects = vec![DependencyProject::new("a", "1.0.0").with_update("1.1.0")];
        let origins = normalize_projects(&projects, "golang");
        let vulnerable = vulnerable_reports(&fx.client, &origins).await;
        let ignore = IgnoreConfig::default();

        let result = UpdateResolver::new(&fx.client, &ignore, "golang")
            .resolve(&vulnerable, &origins)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert!(result["pkg:golang/a@1.0.0"].update.is_none());
    }

    #[tokio::test]
    async fn test_ignored_advisory_does_not_block_update() {
        let fx = fixture(&[("pkg:golang/a@1.0.0", 7.5), ("pkg:golang/a@1.1.0", 5.0)]);
        let projects = vec![DependencyProject::new("a", "1.0.0").with_update("1.1.0")];
        let origins = normalize_projects(&projects, "golang");
        let vulnerable = vulnerable_reports(&fx.client, &origins).await;
        let ignore = IgnoreConfig {
            packages: vec![],
            vulnerabilities: vec!["CVE-2024-0001".to_string()],
        };

        let result = UpdateResolver::new(&fx.client, &ignore, "golang")
            .resolve(&vulnerable, &origins)
            .await
            .unwrap();

        assert!(result["pkg:golang/a@1.0.0"].update.is_some());
    }

    #[tokio::test]
    async fn test_no_candidates_means_no_request() {
        let fx = fixture(&[("pkg:golang/a@1.0.0", 7.5)]);
        let projects = vec![DependencyProject::new("a", "1.0.0")];
        let origins = normalize_projects(&projects, "golang");
        let vulnerable = vulnerable_reports(&fx.client, &origins).await;
        let ignore = IgnoreConfig::default();

        let result = UpdateResolver::new(&fx.client, &ignore, "golang")
            .resolve(&vulnerable, &origins)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(fx.transport.call_count(), 1);
    }

    #[test]
    fn test_purl_type() {
        assert_eq!(purl_type("pkg:npm/@scope/x@1.0.0"), Some("npm"));
        assert_eq!(purl_type("golang/x@1.0.0"), None);
    }
}
