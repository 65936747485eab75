use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::config::Credentials;
use crate::error::{AuditError, AuditResult};
use crate::model::CoordinateReport;
use crate::platform::user_agent;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// `POST <base>/component-report` over HTTP.
pub struct HttpReportTransport {
    client: reqwest::Client,
    url: String,
    credentials: Option<Credentials>,
}

#[derive(Serialize)]
struct ComponentReportRequest<'a> {
    coordinates: &'a [String],
}

impl HttpReportTransport {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> AuditResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent(env!("CARGO_PKG_NAME")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/component-report", base_url.trim_end_matches('/')),
            credentials,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Maps a response status to the audit failure taxonomy.
fn check_status(status: StatusCode) -> AuditResult<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AuditError::RateLimited);
    }
    if !status.is_success() {
        return Err(AuditError::RemoteAuditFailed {
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl super::ReportTransport for HttpReportTransport {
    fn name(&self) -> &'static str {
        "component-report"
    }

    async fn component_report(&self, coordinates: &[String]) -> AuditResult<Vec<CoordinateReport>> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&ComponentReportRequest { coordinates });

        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.token));
        }

        let response = request.send().await?;
        check_status(response.status())?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AuditError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::ReportTransport;
    use crate::http_stub::StubServer;

    #[test]
    fn test_status_taxonomy() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS),
            Err(AuditError::RateLimited)
        ));
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(AuditError::RemoteAuditFailed { status: 401 })
        ));
    }

    #[test]
    fn test_url_joins_base() {
        let transport = HttpReportTransport::new("https://reports.example.test/api/v3/", None).unwrap();
        assert_eq!(transport.url(), "https://reports.example.test/api/v3/component-report");
        assert_eq!(transport.name(), "component-report");
    }

    #[test]
    fn test_request_body_shape() {
        let coordinates = vec!["pkg:golang/a@1.0.0".to_string()];
        let body = serde_json::to_value(ComponentReportRequest {
            coordinates: &coordinates,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"coordinates": ["pkg:golang/a@1.0.0"]}));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = HttpReportTransport::new("http://127.0.0.1:9", None).unwrap();
        let err = transport
            .component_report(&["pkg:golang/a@1.0.0".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Transport(_)));
    }

    #[tokio::test]
    async fn test_reports_decode_with_basic_auth() {
        let server = StubServer::start(&[(
            200,
            r#"[{"coordinates":"pkg:golang/a@1.0.0","reference":"https://reports.example.test/a","vulnerabilities":[{"id":"v-1","title":"bad","cvssScore":9.8,"cve":"CVE-2024-1"}]},{"coordinates":"pkg:golang/b@0.1.0"}]"#,
        )])
        .await;
        let transport = HttpReportTransport::new(
            &server.base_url,
            Some(Credentials {
                username: "user".to_string(),
                token: "token".to_string(),
            }),
        )
        .unwrap();

        let reports = transport
            .component_report(&["pkg:golang/a@1.0.0".to_string(), "pkg:golang/b@0.1.0".to_string()])
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].is_vulnerable());
        assert_eq!(reports[0].vulnerabilities[0].cve.as_deref(), Some("CVE-2024-1"));
        assert!(!reports[1].is_vulnerable());

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/component-report");
        assert_eq!(requests[0].header("authorization"), Some("Basic dXNlcjp0b2tlbg=="));
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"coordinates": ["pkg:golang/a@1.0.0", "pkg:golang/b@0.1.0"]})
        );
    }

    #[tokio::test]
    async fn test_anonymous_request_has_no_auth_header() {
        let server = StubServer::start(&[(200, "[]")]).await;
        let transport = HttpReportTransport::new(&server.base_url, None).unwrap();

        let reports = transport.component_report(&[]).await.unwrap();

        assert!(reports.is_empty());
        assert_eq!(server.requests()[0].header("authorization"), None);
    }

    #[tokio::test]
    async fn test_wire_statuses_map_to_errors() {
        let server = StubServer::start(&[(429, ""), (503, ""), (200, "not json")]).await;
        let transport = HttpReportTransport::new(&server.base_url, None).unwrap();
        let coordinates = ["pkg:golang/a@1.0.0".to_string()];

        let limited = transport.component_report(&coordinates).await.unwrap_err();
        assert!(matches!(limited, AuditError::RateLimited));

        let unavailable = transport.component_report(&coordinates).await.unwrap_err();
        assert!(matches!(unavailable, AuditError::RemoteAuditFailed { status: 503 }));

        let garbled = transport.component_report(&coordinates).await.unwrap_err();
        assert!(matches!(garbled, AuditError::Decode(_)));
    }
}
