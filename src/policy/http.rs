use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::PolicyTransport;
use crate::config::Credentials;
use crate::error::{AuditError, AuditResult};
use crate::model::{PolicyJob, PolicyResult};
use crate::platform::user_agent;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Source name reported to the policy server with each submission.
const TOOL_NAME: &str = env!("CARGO_PKG_NAME");

/// Policy server client speaking the `/api/v2` REST API.
pub struct HttpPolicyTransport {
    client: reqwest::Client,
    server_url: String,
    credentials: Credentials,
}

#[derive(Deserialize)]
struct ApplicationsResponse {
    #[serde(default)]
    applications: Vec<Application>,
}

#[derive(Deserialize)]
struct Application {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    status_url: String,
}

impl HttpPolicyTransport {
    pub fn new(server_url: &str, credentials: Credentials) -> AuditResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent(TOOL_NAME))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.server_url, path.trim_start_matches('/'))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.token))
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> AuditResult<T> {
    serde_json::from_slice(body).map_err(|e| AuditError::Decode(e.to_string()))
}

#[async_trait]
impl PolicyTransport for HttpPolicyTransport {
    async fn resolve_application(&self, public_id: &str) -> AuditResult<Option<String>> {
        let response = self
            .get(&self.url("api/v2/applications"))
            .query(&[("publicId", public_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::PolicyServerFailed {
                status: status.as_u16(),
            });
        }

        let body: ApplicationsResponse = decode(&response.bytes().await?)?;
        Ok(body.applications.into_iter().next().map(|app| app.id))
    }

    async fn submit(&self, internal_id: &str, stage: &str, bom: String) -> AuditResult<PolicyJob> {
        let url = self.url(&format!(
            "api/v2/scan/applications/{}/sources/{}",
            internal_id, TOOL_NAME
        ));
        let response = self
            .client
            .post(&url)
            .query(&[("stageId", stage)])
            .basic_auth(&self.credentials.username, Some(&self.credentials.token))
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(bom)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(AuditError::SubmissionRejected {
                status: status.as_u16(),
            });
        }

        let body: SubmitResponse = decode(&response.bytes().await?)?;
        Ok(PolicyJob {
            status_url: body.status_url,
        })
    }

    async fn poll(&self, job: &PolicyJob) -> AuditResult<Option<PolicyResult>> {
        let response = self.get(&self.url(&job.status_url)).send().await?;

        // The status resource only exists once the evaluation is done
        if response.status() != StatusCode::OK {
            debug!("Policy evaluation pending ({})", response.status());
            return Ok(None);
        }

        let body = response.bytes().await?;
        match decode::<PolicyResult>(&body) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                debug!("Treating undecodable status body as pending: {}", e);
                Ok(None)
            }
        }
    }
}
