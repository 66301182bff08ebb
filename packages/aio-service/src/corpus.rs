use serde::Serialize;
use uuid::Uuid;

use crate::{AioService, Error, Result};
use aio_domain::{files::DocumentFormat, ids, keys};
use aio_storage::models::{JobMessage, NewDocument};

#[derive(Clone, Debug, Serialize)]
pub struct CorpusRegistration {
	pub documentid: Uuid,
	pub filenames: Vec<String>,
}

impl AioService {
	/// Records the current bulk uploads as one corpus document and queues the corpus index build.
	pub async fn register_corpus(&self, user_id: &str) -> Result<CorpusRegistration> {
		crate::presign::validate_user_id(user_id)?;

		let filenames = self.bulk_filenames().await?;

		if filenames.is_empty() {
			return Err(Error::InvalidRequest { message: "There are no bulk uploads to index.".to_string() });
		}

		let document_id = ids::corpus_document_id();
		let conversation_id = ids::conversation_id_for(document_id);
		let doc = NewDocument {
			document_id,
			user_id: user_id.to_string(),
			filename: filenames.join(","),
			file_size: 0,
			object_key: None,
			conversation_id,
			created_at: crate::now(),
		};

		self.stores.records.insert_document(&doc).await?;
		self.stores.records.ensure_memory(conversation_id).await?;

		let job = JobMessage { documentid: Some(document_id), key: None, user: user_id.to_string() };

		self.stores
			.queue
			.send(&self.cfg.queues.document_processing, &document_id.to_string(), &crate::job_body(&job)?)
			.await?;

		tracing::info!(user_id, document_id = %document_id, files = filenames.len(), "Registered corpus.");

		Ok(CorpusRegistration { documentid: document_id, filenames })
	}

	async fn bulk_filenames(&self) -> Result<Vec<String>> {
		let mut names = Vec::new();

		for format in DocumentFormat::all() {
			for key in self.stores.objects.list(&keys::bulk_format_prefix(format)).await? {
				if let Some(name) = key.rsplit('/').next().filter(|name| !name.is_empty()) {
					names.push(name.to_string());
				}
			}
		}

		Ok(names)
	}
}
