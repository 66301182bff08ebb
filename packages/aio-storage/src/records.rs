//! Document records, conversation stubs and conversation memory.

use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Result,
	db::Db,
	models::{
		ConversationRecord, DocumentRecord, DocumentWithConversations, MemoryMessage, NewDocument,
	},
};
use aio_domain::status::DocStatus;

pub trait RecordStore: Send + Sync {
	/// Creates the record and its first conversation. Returns `false` when the document exists.
	fn insert_document<'a>(&'a self, doc: &'a NewDocument) -> BoxFuture<'a, Result<bool>>;

	fn get_document<'a>(&'a self, document_id: Uuid)
	-> BoxFuture<'a, Result<Option<DocumentRecord>>>;

	/// The user's documents, newest first, with their conversations oldest first.
	fn list_documents<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<DocumentWithConversations>>>;

	/// Moves the document to `next` if its current status allows it. Returns whether it moved.
	fn transition_status<'a>(
		&'a self,
		document_id: Uuid,
		next: DocStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// Creates an empty memory for `session_id` unless one exists.
	fn ensure_memory<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<()>>;

	fn load_memory<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<Vec<MemoryMessage>>>;

	fn append_memory<'a>(
		&'a self,
		session_id: Uuid,
		messages: &'a [MemoryMessage],
	) -> BoxFuture<'a, Result<()>>;
}

impl RecordStore for Db {
	fn insert_document<'a>(&'a self, doc: &'a NewDocument) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;
			let inserted = insert_document(&mut *tx, doc).await?;

			if inserted {
				insert_conversation(&mut *tx, doc.conversation_id, doc.document_id, doc.created_at)
					.await?;
			}

			tx.commit().await?;

			Ok(inserted)
		})
	}

	fn get_document<'a>(
		&'a self,
		document_id: Uuid,
	) -> BoxFuture<'a, Result<Option<DocumentRecord>>> {
		Box::pin(async move { get_document(&self.pool, document_id).await })
	}

	fn list_documents<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<DocumentWithConversations>>> {
		Box::pin(async move {
			let documents = list_user_documents(&self.pool, user_id).await?;
			let ids: Vec<Uuid> = documents.iter().map(|doc| doc.document_id).collect();
			let conversations = list_conversations(&self.pool, &ids).await?;

			Ok(documents
				.into_iter()
				.map(|document| {
					let conversations = conversations
						.iter()
						.filter(|conv| conv.document_id == document.document_id)
						.cloned()
						.collect();

					DocumentWithConversations { document, conversations }
				})
				.collect())
		})
	}

	fn transition_status<'a>(
		&'a self,
		document_id: Uuid,
		next: DocStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { transition_status(&self.pool, document_id, next, now).await })
	}

	fn ensure_memory<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { ensure_memory(&self.pool, session_id).await })
	}

	fn load_memory<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<Vec<MemoryMessage>>> {
		Box::pin(async move { load_memory(&self.pool, session_id).await })
	}

	fn append_memory<'a>(
		&'a self,
		session_id: Uuid,
		messages: &'a [MemoryMessage],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { append_memory(&self.pool, session_id, messages).await })
	}
}

pub async fn insert_document<'e, E>(executor: E, doc: &NewDocument) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO documents (
\tdocument_id,
\tuser_id,
\tfilename,
\tfile_size,
\tobject_key,
\tstatus,
\tcreated_at,
\tupdated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
ON CONFLICT (document_id) DO NOTHING",
	)
	.bind(doc.document_id)
	.bind(doc.user_id.as_str())
	.bind(doc.filename.as_str())
	.bind(doc.file_size)
	.bind(doc.object_key.as_deref())
	.bind(DocStatus::Uploaded.as_str())
	.bind(doc.created_at)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn insert_conversation<'e, E>(
	executor: E,
	conversation_id: Uuid,
	document_id: Uuid,
	created_at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO conversations (conversation_id, document_id, created_at)
VALUES ($1, $2, $3)
ON CONFLICT (conversation_id) DO NOTHING",
	)
	.bind(conversation_id)
	.bind(document_id)
	.bind(created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_document<'e, E>(executor: E, document_id: Uuid) -> Result<Option<DocumentRecord>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, DocumentRecord>(
		"\
SELECT document_id, user_id, filename, file_size, object_key, status, created_at, updated_at
FROM documents
WHERE document_id = $1",
	)
	.bind(document_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn list_user_documents<'e, E>(executor: E, user_id: &str) -> Result<Vec<DocumentRecord>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, DocumentRecord>(
		"\
SELECT document_id, user_id, filename, file_size, object_key, status, created_at, updated_at
FROM documents
WHERE user_id = $1
ORDER BY created_at DESC, document_id ASC",
	)
	.bind(user_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_conversations<'e, E>(
	executor: E,
	document_ids: &[Uuid],
) -> Result<Vec<ConversationRecord>>
where
	E: PgExecutor<'e>,
{
	if document_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, ConversationRecord>(
		"\
SELECT conversation_id, document_id, created_at
FROM conversations
WHERE document_id = ANY($1)
ORDER BY created_at ASC",
	)
	.bind(document_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn transition_status<'e, E>(
	executor: E,
	document_id: Uuid,
	next: DocStatus,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let sources: Vec<String> =
		next.allowed_sources().iter().map(|status| status.as_str().to_string()).collect();
	let result = sqlx::query(
		"\
UPDATE documents
SET status = $1, updated_at = $2
WHERE document_id = $3 AND status = ANY($4)",
	)
	.bind(next.as_str())
	.bind(now)
	.bind(document_id)
	.bind(sources)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn ensure_memory<'e, E>(executor: E, session_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO chat_memory (session_id, history)
VALUES ($1, '[]'::jsonb)
ON CONFLICT (session_id) DO NOTHING",
	)
	.bind(session_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn load_memory<'e, E>(executor: E, session_id: Uuid) -> Result<Vec<MemoryMessage>>
where
	E: PgExecutor<'e>,
{
	let history: Option<Value> =
		sqlx::query_scalar("SELECT history FROM chat_memory WHERE session_id = $1")
			.bind(session_id)
			.fetch_optional(executor)
			.await?;

	match history {
		Some(value) => Ok(serde_json::from_value(value)?),
		None => Ok(Vec::new()),
	}
}

pub async fn append_memory<'e, E>(
	executor: E,
	session_id: Uuid,
	messages: &[MemoryMessage],
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let appended = serde_json::to_value(messages)?;

	sqlx::query(
		"\
INSERT INTO chat_memory (session_id, history, updated_at)
VALUES ($1, $2, now())
ON CONFLICT (session_id) DO UPDATE
SET history = chat_memory.history || EXCLUDED.history,
\tupdated_at = EXCLUDED.updated_at",
	)
	.bind(session_id)
	.bind(appended)
	.execute(executor)
	.await?;

	Ok(())
}
