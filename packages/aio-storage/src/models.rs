use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use aio_domain::status::DocStatus;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DocumentRecord {
	pub document_id: Uuid,
	pub user_id: String,
	pub filename: String,
	pub file_size: i64,
	pub object_key: Option<String>,
	pub status: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl DocumentRecord {
	pub fn doc_status(&self) -> Option<DocStatus> {
		DocStatus::parse(&self.status)
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ConversationRecord {
	pub conversation_id: Uuid,
	pub document_id: Uuid,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct DocumentWithConversations {
	pub document: DocumentRecord,
	pub conversations: Vec<ConversationRecord>,
}

/// A document record to create in `UPLOADED` state together with its first conversation.
#[derive(Clone, Debug)]
pub struct NewDocument {
	pub document_id: Uuid,
	pub user_id: String,
	pub filename: String,
	pub file_size: i64,
	pub object_key: Option<String>,
	pub conversation_id: Uuid,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
	Human,
	Ai,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemoryMessage {
	pub role: MessageRole,
	pub content: String,
}
impl MemoryMessage {
	pub fn human(content: impl Into<String>) -> Self {
		Self { role: MessageRole::Human, content: content.into() }
	}

	pub fn ai(content: impl Into<String>) -> Self {
		Self { role: MessageRole::Ai, content: content.into() }
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct QueueMessage {
	pub message_id: Uuid,
	pub queue: String,
	pub dedupe_key: String,
	pub body: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Notification emitted when an object is written. `key` is form-url-encoded.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageEvent {
	pub bucket: String,
	pub key: String,
	/// Distinguishes successive writes to the same key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sequencer: Option<String>,
}

/// Body of document- and media-processing messages.
///
/// A document job without `key` asks for the corpus index to be rebuilt.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JobMessage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub documentid: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	pub user: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_roles_use_lowercase_names() {
		let json = serde_json::to_value(MemoryMessage::ai("hi")).expect("serialize failed");

		assert_eq!(json, serde_json::json!({ "role": "ai", "content": "hi" }));
	}

	#[test]
	fn corpus_jobs_omit_the_key() {
		let job = JobMessage { documentid: Some(Uuid::nil()), key: None, user: "u1".to_string() };
		let json = serde_json::to_value(&job).expect("serialize failed");

		assert!(json.get("key").is_none());
		assert_eq!(serde_json::from_value::<JobMessage>(json).expect("parse failed"), job);
	}
}
