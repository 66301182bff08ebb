use std::time::Duration;

use crate::{AioService, Error, Result, signing::SignedMethod};
use aio_domain::{
	files, ids,
	keys::{self, UploadKey},
	transcript,
};
use aio_providers::transcription::{JobStatus, StartOutcome, TranscriptionJobRequest};
use aio_storage::models::JobMessage;

const OUTPUT_CONTENT_TYPE: &str = "application/json";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TranscriptionOutcome {
	Completed { transcript_key: String },
	/// The transcription service gave up on the job. Nothing is retried.
	Failed { job_name: String, reason: Option<String> },
}

impl AioService {
	/// Transcribes the media object named by `job` and writes the text next to it as `job.txt`.
	///
	/// The job name is derived from the media key, so a redelivered message resumes the job
	/// the first delivery started.
	pub async fn handle_media_job(&self, job: &JobMessage) -> Result<TranscriptionOutcome> {
		let key = job.key.as_deref().ok_or_else(|| Error::InvalidRequest {
			message: "Media job is missing key.".to_string(),
		})?;
		let upload = UploadKey::parse(key).ok_or_else(|| Error::InvalidRequest {
			message: format!("Media key {key:?} is outside the upload layout."),
		})?;

		if !files::is_media(&upload.file_name) {
			return Err(Error::UnsupportedFileType { file_name: upload.file_name });
		}

		let job_name = ids::transcription_job_name(key);
		let output_key = upload.sibling(&format!("{job_name}.json"));
		let provider_cfg = &self.cfg.providers.transcription;

		self.start_transcription(key, &upload, &job_name, &output_key).await?;

		let status = self.wait_for_job(&job_name).await?;

		if let JobStatus::Failed { reason } = status {
			tracing::error!(
				job_name = %job_name,
				key,
				reason = reason.as_deref().unwrap_or("unknown"),
				"Transcription job failed."
			);

			return Ok(TranscriptionOutcome::Failed { job_name, reason });
		}

		self.providers.transcription.delete_job(provider_cfg, &job_name).await?;

		let raw = self.stores.objects.get(&output_key).await?;
		let doc = transcript::parse(&raw).map_err(|err| Error::Provider {
			message: format!("Transcript {output_key} is not valid JSON: {err}."),
		})?;
		let text = transcript::concat_segments(&doc);
		let transcript_key = upload.sibling(keys::TRANSCRIPT_FILE);

		self.stores.objects.put(&transcript_key, text.into_bytes()).await?;
		self.stores.objects.delete(&output_key).await?;

		tracing::info!(job_name = %job_name, key, transcript_key = %transcript_key, "Transcription stored.");

		Ok(TranscriptionOutcome::Completed { transcript_key })
	}

	async fn start_transcription(
		&self,
		key: &str,
		upload: &UploadKey,
		job_name: &str,
		output_key: &str,
	) -> Result<()> {
		let expires = crate::now().unix_timestamp() + self.cfg.transcription.url_ttl_secs as i64;
		let extension = files::extension_of(&upload.file_name);
		let request = TranscriptionJobRequest {
			job_name: job_name.to_string(),
			media_uri: self.signer.sign_url(
				SignedMethod::Get,
				key,
				files::content_type(&extension),
				expires,
			)?,
			output_upload_url: self.signer.sign_url(
				SignedMethod::Put,
				output_key,
				OUTPUT_CONTENT_TYPE,
				expires,
			)?,
			identify_language: self.cfg.transcription.identify_language,
		};

		match self.providers.transcription.start_job(&self.cfg.providers.transcription, &request).await? {
			StartOutcome::Started => tracing::info!(job_name, key, "Started transcription job."),
			StartOutcome::AlreadyExists =>
				tracing::info!(job_name, key, "Resuming existing transcription job."),
		}

		Ok(())
	}

	async fn wait_for_job(&self, job_name: &str) -> Result<JobStatus> {
		let interval = Duration::from_millis(self.cfg.transcription.poll_interval_ms);

		loop {
			let status = self
				.providers
				.transcription
				.job_status(&self.cfg.providers.transcription, job_name)
				.await?;

			if status.is_settled() {
				return Ok(status);
			}

			tracing::debug!(job_name, "Transcription job still running.");
			tokio::time::sleep(interval).await;
		}
	}
}
