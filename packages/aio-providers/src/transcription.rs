//! Client for an asynchronous speech-to-text job service.
//!
//! Jobs are created by name, polled until they settle and deleted once their output has been
//! collected. The service writes its JSON result to a caller-supplied upload URL.

use color_eyre::{Result, eyre};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
pub struct TranscriptionJobRequest {
	pub job_name: String,
	/// Signed URL the service downloads the media from.
	pub media_uri: String,
	/// Signed URL the service uploads its JSON result to.
	pub output_upload_url: String,
	pub identify_language: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartOutcome {
	Started,
	/// A job with this name exists already; the caller should resume polling it.
	AlreadyExists,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobStatus {
	InProgress,
	Completed,
	Failed { reason: Option<String> },
}
impl JobStatus {
	pub fn is_settled(&self) -> bool {
		!matches!(self, Self::InProgress)
	}
}

pub async fn start_job(
	cfg: &aio_config::ProviderConfig,
	request: &TranscriptionJobRequest,
) -> Result<StartOutcome> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::endpoint(&cfg.api_base, &cfg.path);
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(request)
		.send()
		.await?;

	if res.status() == StatusCode::CONFLICT {
		return Ok(StartOutcome::AlreadyExists);
	}

	res.error_for_status()?;

	Ok(StartOutcome::Started)
}

pub async fn job_status(cfg: &aio_config::ProviderConfig, job_name: &str) -> Result<JobStatus> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = job_url(cfg, job_name);
	let res = client
		.get(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_job_status(&json)
}

/// Deletes a settled job. A job that is already gone counts as deleted.
pub async fn delete_job(cfg: &aio_config::ProviderConfig, job_name: &str) -> Result<()> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = job_url(cfg, job_name);
	let res = client
		.delete(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.send()
		.await?;

	if res.status() == StatusCode::NOT_FOUND {
		return Ok(());
	}

	res.error_for_status()?;

	Ok(())
}

fn job_url(cfg: &aio_config::ProviderConfig, job_name: &str) -> String {
	format!("{}/{job_name}", crate::endpoint(&cfg.api_base, cfg.path.trim_end_matches('/')))
}

fn parse_job_status(json: &Value) -> Result<JobStatus> {
	let status = json
		.get("status")
		.and_then(|v| v.as_str())
		.ok_or_else(|| eyre::eyre!("Transcription job response is missing status."))?;

	match status.to_ascii_uppercase().as_str() {
		"QUEUED" | "IN_PROGRESS" => Ok(JobStatus::InProgress),
		"COMPLETED" => Ok(JobStatus::Completed),
		"FAILED" => Ok(JobStatus::Failed {
			reason: json.get("failure_reason").and_then(|v| v.as_str()).map(str::to_string),
		}),
		other => Err(eyre::eyre!("Unknown transcription job status {other:?}.")),
	}
}
