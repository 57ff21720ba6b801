//! Source verification through a remote attestation service.
//!
//! The service rebuilds the program from a repository snapshot and compares
//! the result with what is deployed. Endpoints used:
//!
//! - `POST /verify` submit build parameters, returns a request id
//! - `GET /status/<address>` current verification state of a program
//! - `GET /job/<request id>` progress of one submitted job
//! - `GET /logs/<address>` build logs of the last job for a program
//!
//! Status reads never mutate anything, so polling is safe to repeat.

pub mod git;

pub use git::{commit_or_placeholder, SourceSnapshot};

use crate::config::DeployConfig;
use crate::error::VerificationError;
use crate::models::{VerificationRequest, VerificationResult, VerificationStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    is_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    is_verified: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the attestation service.
pub struct VerificationClient {
    http: reqwest::Client,
    base_url: String,
}

impl VerificationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, VerificationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VerificationError::RequestFailed(format!("HTTP client: {}", e)))?;
        Ok(VerificationClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a verification job.
    pub async fn request_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResult, VerificationError> {
        let url = format!("{}/verify", self.base_url);
        log::info!(
            "[Verify] [SUBMIT] {} @ {} ({}) -> {}",
            request.repository,
            request.commit_hash,
            request.lib_name,
            url
        );

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| VerificationError::RequestFailed(format!("POST {}: {}", url, e)))?;
        let body: SubmitResponse = read_json(response, &url).await?;

        if body.status.as_deref() == Some("error") || body.error.is_some() {
            return Err(VerificationError::RequestFailed(
                body.error
                    .or(body.message)
                    .unwrap_or_else(|| "service reported an error".to_string()),
            ));
        }

        let status = if body.is_verified == Some(true) {
            VerificationStatus::Success
        } else {
            VerificationStatus::Pending
        };
        log::info!(
            "[Verify] [SUBMIT] ✓ Accepted (request id: {})",
            body.request_id.as_deref().unwrap_or("none")
        );
        Ok(VerificationResult {
            request_id: body.request_id,
            status,
            message: body.message,
        })
    }

    /// Verification state of a program.
    pub async fn poll_status(&self, program_address: &str) -> Result<VerificationResult, VerificationError> {
        let url = format!("{}/status/{}", self.base_url, program_address);
        let body: StatusResponse = self.get_json(&url).await?;
        Ok(VerificationResult {
            request_id: None,
            status: if body.is_verified {
                VerificationStatus::Success
            } else {
                VerificationStatus::Pending
            },
            message: body.message,
        })
    }

    /// Progress of a submitted job.
    pub async fn job_status(&self, request_id: &str) -> Result<VerificationResult, VerificationError> {
        let url = format!("{}/job/{}", self.base_url, request_id);
        let body: JobResponse = self.get_json(&url).await?;
        let status = match body.status.as_str() {
            "completed" => VerificationStatus::Success,
            "failed" => VerificationStatus::Failure,
            _ => VerificationStatus::Pending,
        };
        Ok(VerificationResult {
            request_id: Some(request_id.to_string()),
            status,
            message: body.message,
        })
    }

    /// Build logs of the last job for a program, as returned by the service.
    pub async fn fetch_logs(&self, program_address: &str) -> Result<Value, VerificationError> {
        let url = format!("{}/logs/{}", self.base_url, program_address);
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, VerificationError> {
        log::debug!("[Verify] GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| VerificationError::RequestFailed(format!("GET {}: {}", url, e)))?;
        read_json(response, url).await
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, VerificationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(VerificationError::RequestFailed(format!(
            "{} returned HTTP {}: {}",
            url,
            status,
            body.trim()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| VerificationError::RequestFailed(format!("{}: unparsable response: {}", url, e)))
}

/// Assemble the build parameters for `program_address` from config and the local repository.
///
/// The repository URL comes from `repository_url`, falling back to the
/// `origin` remote of the project's git repository.
pub fn build_request(
    config: &DeployConfig,
    program_address: &str,
) -> Result<VerificationRequest, VerificationError> {
    let repository = match config.repository_url {
        Some(ref url) => url.clone(),
        None => SourceSnapshot::discover(&config.project_dir)
            .and_then(|snapshot| snapshot.remote_url("origin"))
            .map_err(|e| {
                VerificationError::RequestFailed(format!(
                    "repository_url is not configured and it could not be derived: {}",
                    e
                ))
            })?,
    };

    Ok(VerificationRequest {
        repository,
        program_id: program_address.to_string(),
        commit_hash: commit_or_placeholder(&config.project_dir),
        lib_name: config.library_name.clone(),
        base_image: config.base_image.clone(),
        mount_path: config.mount_path.clone(),
        cargo_args: config.cargo_args.clone(),
    })
}
