use uuid::Uuid;

use crate::{AioService, Error, Result};
use aio_domain::{
	files::{self, FileKind},
	ids,
	keys::UploadKey,
	status::DocStatus,
};
use aio_storage::{
	models::{JobMessage, NewDocument, StorageEvent},
	objects,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IntakeOutcome {
	Ignored { key: String },
	MediaQueued { key: String },
	DocumentRegistered { document_id: Uuid, created: bool },
}

impl AioService {
	/// Routes one storage notification: media goes to transcription, documents get a record and
	/// an indexing job, anything else is ignored.
	pub async fn handle_storage_event(&self, event: &StorageEvent) -> Result<IntakeOutcome> {
		let key = objects::decode_event_key(&event.key);

		if event.bucket != self.stores.objects.bucket() {
			tracing::warn!(bucket = %event.bucket, key = %key, "Ignoring event for another bucket.");

			return Ok(IntakeOutcome::Ignored { key });
		}

		let Some(upload) = UploadKey::parse(&key) else {
			tracing::warn!(key = %key, "Ignoring key outside the upload layout.");

			return Ok(IntakeOutcome::Ignored { key });
		};

		match files::classify(&upload.file_name) {
			FileKind::Media => self.enqueue_media(key, &upload, event.sequencer.as_deref()).await,
			FileKind::Document =>
				self.register_document(key, &upload, event.sequencer.as_deref()).await,
			FileKind::Other => {
				tracing::debug!(key = %key, "Ignoring non-document object.");

				Ok(IntakeOutcome::Ignored { key })
			},
		}
	}

	async fn enqueue_media(
		&self,
		key: String,
		upload: &UploadKey,
		sequencer: Option<&str>,
	) -> Result<IntakeOutcome> {
		let job = JobMessage { documentid: None, key: Some(key.clone()), user: upload.user_id.clone() };
		let body = crate::job_body(&job)?;
		let queued = self
			.stores
			.queue
			.send(&self.cfg.queues.media_processing, &job_dedupe_key(&key, sequencer), &body)
			.await?;

		tracing::info!(key = %key, user_id = %upload.user_id, queued, "Queued media for transcription.");

		Ok(IntakeOutcome::MediaQueued { key })
	}

	/// Creates the record on the first write of `key`. A later write with a new `sequencer` queues
	/// a fresh indexing job and reopens the record as `UPLOADED`.
	async fn register_document(
		&self,
		key: String,
		upload: &UploadKey,
		sequencer: Option<&str>,
	) -> Result<IntakeOutcome> {
		let original_key = upload.original_key();
		// Transcripts are sized and attributed by the media file they came from.
		let meta = match self.stores.objects.head(&original_key).await? {
			Some(meta) => meta,
			None => self.stores.objects.head(&key).await?.ok_or_else(|| Error::NotFound {
				message: format!("object {key}"),
			})?,
		};
		let document_id = ids::document_id_for(&key);
		let conversation_id = ids::conversation_id_for(document_id);
		let doc = NewDocument {
			document_id,
			user_id: upload.user_id.clone(),
			filename: upload.folder.clone(),
			file_size: i64::try_from(meta.size).unwrap_or(i64::MAX),
			object_key: Some(meta.key),
			conversation_id,
			created_at: crate::now(),
		};
		let created = self.stores.records.insert_document(&doc).await?;

		self.stores.records.ensure_memory(conversation_id).await?;

		let job = JobMessage {
			documentid: Some(document_id),
			key: Some(key.clone()),
			user: upload.user_id.clone(),
		};
		let body = crate::job_body(&job)?;
		let queued = self
			.stores
			.queue
			.send(&self.cfg.queues.document_processing, &job_dedupe_key(&key, sequencer), &body)
			.await?;

		if queued && !created {
			let reopened = self
				.stores
				.records
				.transition_status(document_id, DocStatus::Uploaded, crate::now())
				.await?;

			tracing::info!(document_id = %document_id, reopened, "Queued re-indexing for an existing document.");
		}

		tracing::info!(
			key = %key,
			user_id = %upload.user_id,
			document_id = %document_id,
			created,
			queued,
			"Registered document."
		);

		Ok(IntakeOutcome::DocumentRegistered { document_id, created })
	}
}

/// Events without a sequencer count as replays of the first write.
fn job_dedupe_key(key: &str, sequencer: Option<&str>) -> String {
	match sequencer {
		Some(sequencer) => format!("{key}#{sequencer}"),
		None => key.to_string(),
	}
}
