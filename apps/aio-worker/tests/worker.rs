use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use aio_config::Config;
use aio_domain::{ids, status::DocStatus};
use aio_service::{AioService, Stores};
use aio_storage::{
	models::QueueMessage,
	objects::{LocalObjectStore, NotifyingObjectStore, ObjectStore},
	queue::MessageQueue,
};
use aio_testkit::{
	config::{self, CHAT_MODEL},
	providers::{self, FakeTranscription, HashEmbedding, ScriptedChat, StubTranslation},
	stores::{MemoryQueue, MemoryRecordStore},
};
use aio_worker::worker::{self, QueueKind};

struct Harness {
	_root: TempDir,
	service: AioService,
	records: Arc<MemoryRecordStore>,
	queue: Arc<MemoryQueue>,
}
impl Harness {
	fn new() -> Self {
		Self::with_config(|_| {})
	}

	fn with_config<F>(adjust: F) -> Self
	where
		F: FnOnce(&mut Config),
	{
		let root = tempfile::tempdir().expect("Failed to create object root.");
		let mut cfg = config::sample_config(root.path());

		adjust(&mut cfg);

		let records = Arc::new(MemoryRecordStore::new());
		let queue = Arc::new(MemoryQueue::new());
		let objects: Arc<dyn ObjectStore> = Arc::new(NotifyingObjectStore::new(
			LocalObjectStore::from_config(&cfg.storage.objects),
			queue.clone(),
			cfg.queues.storage_events.clone(),
			cfg.storage.objects.notify_prefixes.clone(),
		));
		let providers = providers::providers(
			Arc::new(HashEmbedding::new()),
			Arc::new(ScriptedChat::new().reply(CHAT_MODEL, "Answer.")),
			Arc::new(StubTranslation::prefixing()),
			Arc::new(FakeTranscription::new(objects.clone(), &["Spoken words."])),
		);
		let stores = Stores { records: records.clone(), queue: queue.clone(), objects };
		let service = AioService::with_providers(cfg, stores, providers);

		Self { _root: root, service, records, queue }
	}

	fn messages(&self, kind: QueueKind) -> Vec<QueueMessage> {
		self.queue.messages(kind.queue_name(&self.service.cfg.queues))
	}

	async fn drain(&self, kind: QueueKind) -> usize {
		let mut handled = 0;

		while worker::process_once(&self.service, kind).await.expect("processing failed") {
			handled += 1;
		}

		handled
	}
}

#[tokio::test]
async fn document_upload_flows_through_every_queue() {
	let harness = Harness::new();
	let key = "uploads/u1/notes.txt/notes.txt";

	harness
		.service
		.stores
		.objects
		.put(key, b"Rivers flow to the sea.".to_vec())
		.await
		.expect("put failed");

	assert_eq!(harness.drain(QueueKind::StorageEvents).await, 1);
	assert_eq!(harness.drain(QueueKind::Documents).await, 1);

	let document = harness.records.document(ids::document_id_for(key)).expect("Record is missing.");

	assert_eq!(document.doc_status(), Some(DocStatus::Ready));
	assert!(harness.messages(QueueKind::Documents).iter().all(|message| message.status == "DONE"));

	// Index artifacts produce events that are consumed and ignored.
	assert_eq!(harness.drain(QueueKind::StorageEvents).await, 2);
	assert_eq!(harness.drain(QueueKind::Documents).await, 0);
}

#[tokio::test]
async fn media_upload_is_transcribed_then_indexed() {
	let harness = Harness::new();
	let key = "uploads/u1/clip.mp4/clip.mp4";

	harness.service.stores.objects.put(key, b"mp4".to_vec()).await.expect("put failed");
	harness.drain(QueueKind::StorageEvents).await;

	assert_eq!(harness.drain(QueueKind::Media).await, 1);

	harness.drain(QueueKind::StorageEvents).await;
	harness.drain(QueueKind::Documents).await;

	let transcript_id = ids::document_id_for("uploads/u1/clip.mp4/job.txt");

	assert_eq!(
		harness.records.document(transcript_id).and_then(|doc| doc.doc_status()),
		Some(DocStatus::Ready)
	);
}

#[tokio::test]
async fn malformed_messages_fail_without_retry() {
	let harness = Harness::new();
	let queue = harness.service.cfg.queues.document_processing.clone();

	harness
		.queue
		.send(&queue, "bad", &json!({ "documentid": "not-a-uuid" }))
		.await
		.expect("send failed");

	assert!(worker::process_once(&harness.service, QueueKind::Documents).await.expect("processing"));

	let message = &harness.messages(QueueKind::Documents)[0];

	assert_eq!(message.status, "FAILED");
	assert_eq!(message.attempts, 1);
	assert!(message.last_error.as_deref().is_some_and(|text| text.starts_with("Invalid message body")));
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
	let harness = Harness::new();
	let queue = harness.service.cfg.queues.document_processing.clone();
	// A document job whose record was never written fails with NotFound.
	let body = json!({ "key": "uploads/u1/ghost.txt/ghost.txt", "user": "u1" });

	harness.queue.send(&queue, "ghost", &body).await.expect("send failed");

	assert!(worker::process_once(&harness.service, QueueKind::Documents).await.expect("processing"));

	let message = &harness.messages(QueueKind::Documents)[0];

	assert_eq!(message.status, "PENDING");
	assert_eq!(message.attempts, 1);
	assert!(message.available_at > time::OffsetDateTime::now_utc());
	// Not claimable until the backoff elapses.
	assert!(!worker::process_once(&harness.service, QueueKind::Documents).await.expect("processing"));
}

#[tokio::test]
async fn exhausted_attempts_end_in_failed() {
	let harness = Harness::with_config(|cfg| cfg.queues.max_attempts = 1);
	let queue = harness.service.cfg.queues.document_processing.clone();
	let body = json!({ "key": "uploads/u1/ghost.txt/ghost.txt", "user": "u1" });

	harness.queue.send(&queue, "ghost", &body).await.expect("send failed");
	worker::process_once(&harness.service, QueueKind::Documents).await.expect("processing failed");

	assert_eq!(harness.messages(QueueKind::Documents)[0].status, "FAILED");
}

#[tokio::test]
async fn idle_queues_report_no_work() {
	let harness = Harness::new();

	for kind in QueueKind::all() {
		assert!(!worker::process_once(&harness.service, kind).await.expect("processing failed"));
	}
}
