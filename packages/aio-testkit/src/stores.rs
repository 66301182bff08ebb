//! In-memory [`RecordStore`] and [`MessageQueue`] with the same semantics as the Postgres ones.

use std::{
	collections::{BTreeMap, HashMap},
	sync::{Mutex, MutexGuard},
};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use aio_domain::status::DocStatus;
use aio_storage::{
	BoxFuture, Result,
	models::{
		ConversationRecord, DocumentRecord, DocumentWithConversations, MemoryMessage, NewDocument,
		QueueMessage,
	},
	queue::MessageQueue,
	records::RecordStore,
};

#[derive(Default)]
struct RecordState {
	documents: BTreeMap<Uuid, DocumentRecord>,
	conversations: Vec<ConversationRecord>,
	memory: HashMap<Uuid, Vec<MemoryMessage>>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
	state: Mutex<RecordState>,
}
impl MemoryRecordStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn document(&self, document_id: Uuid) -> Option<DocumentRecord> {
		self.lock().documents.get(&document_id).cloned()
	}

	pub fn documents(&self) -> Vec<DocumentRecord> {
		self.lock().documents.values().cloned().collect()
	}

	pub fn memory(&self, session_id: Uuid) -> Option<Vec<MemoryMessage>> {
		self.lock().memory.get(&session_id).cloned()
	}

	/// Forces a status without transition checks, for arranging test state.
	pub fn set_status(&self, document_id: Uuid, status: DocStatus) {
		if let Some(doc) = self.lock().documents.get_mut(&document_id) {
			doc.status = status.as_str().to_string();
		}
	}

	fn lock(&self) -> MutexGuard<'_, RecordState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl RecordStore for MemoryRecordStore {
	fn insert_document<'a>(&'a self, doc: &'a NewDocument) -> BoxFuture<'a, Result<bool>> {
		let mut state = self.lock();
		let inserted = if state.documents.contains_key(&doc.document_id) {
			false
		} else {
			state.documents.insert(doc.document_id, DocumentRecord {
				document_id: doc.document_id,
				user_id: doc.user_id.clone(),
				filename: doc.filename.clone(),
				file_size: doc.file_size,
				object_key: doc.object_key.clone(),
				status: DocStatus::Uploaded.as_str().to_string(),
				created_at: doc.created_at,
				updated_at: doc.created_at,
			});
			state.conversations.push(ConversationRecord {
				conversation_id: doc.conversation_id,
				document_id: doc.document_id,
				created_at: doc.created_at,
			});

			true
		};

		Box::pin(async move { Ok(inserted) })
	}

	fn get_document<'a>(
		&'a self,
		document_id: Uuid,
	) -> BoxFuture<'a, Result<Option<DocumentRecord>>> {
		let doc = self.document(document_id);

		Box::pin(async move { Ok(doc) })
	}

	fn list_documents<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<DocumentWithConversations>>> {
		let state = self.lock();
		let mut documents: Vec<DocumentWithConversations> = state
			.documents
			.values()
			.filter(|doc| doc.user_id == user_id)
			.map(|doc| DocumentWithConversations {
				document: doc.clone(),
				conversations: state
					.conversations
					.iter()
					.filter(|conv| conv.document_id == doc.document_id)
					.cloned()
					.collect(),
			})
			.collect();

		drop(state);
		documents.sort_by(|a, b| b.document.created_at.cmp(&a.document.created_at));

		Box::pin(async move { Ok(documents) })
	}

	fn transition_status<'a>(
		&'a self,
		document_id: Uuid,
		next: DocStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		let mut state = self.lock();
		let moved = match state.documents.get_mut(&document_id) {
			Some(doc) => {
				let allowed = DocStatus::parse(&doc.status)
					.map(|current| current.can_transition_to(next))
					.unwrap_or(false);

				if allowed {
					doc.status = next.as_str().to_string();
					doc.updated_at = now;
				}

				allowed
			},
			None => false,
		};

		Box::pin(async move { Ok(moved) })
	}

	fn ensure_memory<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<()>> {
		self.lock().memory.entry(session_id).or_default();

		Box::pin(async { Ok(()) })
	}

	fn load_memory<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<Vec<MemoryMessage>>> {
		let history = self.memory(session_id).unwrap_or_default();

		Box::pin(async move { Ok(history) })
	}

	fn append_memory<'a>(
		&'a self,
		session_id: Uuid,
		messages: &'a [MemoryMessage],
	) -> BoxFuture<'a, Result<()>> {
		self.lock().memory.entry(session_id).or_default().extend_from_slice(messages);

		Box::pin(async { Ok(()) })
	}
}

#[derive(Default)]
pub struct MemoryQueue {
	messages: Mutex<Vec<QueueMessage>>,
}
impl MemoryQueue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn messages(&self, queue: &str) -> Vec<QueueMessage> {
		self.lock().iter().filter(|message| message.queue == queue).cloned().collect()
	}

	pub fn bodies(&self, queue: &str) -> Vec<Value> {
		self.messages(queue).into_iter().map(|message| message.body).collect()
	}

	fn lock(&self) -> MutexGuard<'_, Vec<QueueMessage>> {
		self.messages.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn update<F>(&self, message_id: Uuid, f: F)
	where
		F: FnOnce(&mut QueueMessage),
	{
		if let Some(message) =
			self.lock().iter_mut().find(|message| message.message_id == message_id)
		{
			f(message);
		}
	}
}
impl MessageQueue for MemoryQueue {
	fn send<'a>(
		&'a self,
		queue: &'a str,
		dedupe_key: &'a str,
		body: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		let mut messages = self.lock();
		let exists = messages
			.iter()
			.any(|message| message.queue == queue && message.dedupe_key == dedupe_key);

		if !exists {
			let now = OffsetDateTime::now_utc();

			messages.push(QueueMessage {
				message_id: Uuid::new_v4(),
				queue: queue.to_string(),
				dedupe_key: dedupe_key.to_string(),
				body: body.clone(),
				status: "PENDING".to_string(),
				attempts: 0,
				last_error: None,
				available_at: now,
				created_at: now,
				updated_at: now,
			});
		}

		Box::pin(async move { Ok(!exists) })
	}

	fn claim<'a>(
		&'a self,
		queue: &'a str,
		now: OffsetDateTime,
		lease_seconds: i64,
	) -> BoxFuture<'a, Result<Option<QueueMessage>>> {
		let mut messages = self.lock();
		let next = messages
			.iter_mut()
			.filter(|message| {
				message.queue == queue
					&& matches!(message.status.as_str(), "PENDING" | "CLAIMED")
					&& message.available_at <= now
			})
			.min_by_key(|message| message.available_at);
		let claimed = next.map(|message| {
			message.status = "CLAIMED".to_string();
			message.available_at = now + time::Duration::seconds(lease_seconds);
			message.updated_at = now;

			message.clone()
		});

		Box::pin(async move { Ok(claimed) })
	}

	fn ack<'a>(&'a self, message_id: Uuid, now: OffsetDateTime) -> BoxFuture<'a, Result<()>> {
		self.update(message_id, |message| {
			message.status = "DONE".to_string();
			message.updated_at = now;
		});

		Box::pin(async { Ok(()) })
	}

	fn retry<'a>(
		&'a self,
		message_id: Uuid,
		attempts: i32,
		error_text: &'a str,
		available_at: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		self.update(message_id, |message| {
			message.status = "PENDING".to_string();
			message.attempts = attempts;
			message.last_error = Some(error_text.to_string());
			message.available_at = available_at;
			message.updated_at = now;
		});

		Box::pin(async { Ok(()) })
	}

	fn fail<'a>(
		&'a self,
		message_id: Uuid,
		attempts: i32,
		error_text: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		self.update(message_id, |message| {
			message.status = "FAILED".to_string();
			message.attempts = attempts;
			message.last_error = Some(error_text.to_string());
			message.updated_at = now;
		});

		Box::pin(async { Ok(()) })
	}
}
