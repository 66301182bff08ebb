use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AioService, Result};

#[derive(Clone, Debug, Serialize)]
pub struct DocumentSummary {
	pub documentid: Uuid,
	pub filename: String,
	pub filesize: i64,
	pub docstatus: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created: OffsetDateTime,
	pub conversations: Vec<ConversationSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationSummary {
	pub conversationid: Uuid,
	#[serde(with = "time::serde::rfc3339")]
	pub created: OffsetDateTime,
}

impl AioService {
	/// The caller's documents, newest first.
	pub async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentSummary>> {
		crate::presign::validate_user_id(user_id)?;

		let documents = self.stores.records.list_documents(user_id).await?;

		Ok(documents
			.into_iter()
			.map(|entry| DocumentSummary {
				documentid: entry.document.document_id,
				filename: entry.document.filename,
				filesize: entry.document.file_size,
				docstatus: entry.document.status,
				created: entry.document.created_at,
				conversations: entry
					.conversations
					.into_iter()
					.map(|conv| ConversationSummary {
						conversationid: conv.conversation_id,
						created: conv.created_at,
					})
					.collect(),
			})
			.collect())
	}
}
