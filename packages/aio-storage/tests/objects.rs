use std::sync::Arc;

use aio_storage::{
	Error,
	models::StorageEvent,
	objects::{LocalObjectStore, NotifyingObjectStore, ObjectMeta, ObjectStore},
};
use aio_testkit::stores::MemoryQueue;

#[tokio::test]
async fn local_store_round_trips_objects() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let store = LocalObjectStore::new(root.path(), "aio-test");

	store.put("uploads/u1/a.txt/a.txt", b"hello".to_vec()).await.expect("put failed");
	store.put("uploads/u1/a.txt/index.vec", vec![0; 8]).await.expect("put failed");
	store.put("uploads/u2/b.txt/b.txt", b"other".to_vec()).await.expect("put failed");

	assert_eq!(store.bucket(), "aio-test");
	assert_eq!(store.get("uploads/u1/a.txt/a.txt").await.expect("get failed"), b"hello");
	assert_eq!(
		store.head("uploads/u1/a.txt/a.txt").await.expect("head failed"),
		Some(ObjectMeta { key: "uploads/u1/a.txt/a.txt".to_string(), size: 5 })
	);
	assert_eq!(store.list("uploads/u1/").await.expect("list failed"), vec![
		"uploads/u1/a.txt/a.txt".to_string(),
		"uploads/u1/a.txt/index.vec".to_string(),
	]);

	store.delete("uploads/u1/a.txt/a.txt").await.expect("delete failed");
	store.delete("uploads/u1/a.txt/a.txt").await.expect("Deleting a missing object must succeed.");

	assert!(store.head("uploads/u1/a.txt/a.txt").await.expect("head failed").is_none());
	assert!(matches!(store.get("uploads/u1/a.txt/a.txt").await, Err(Error::NotFound(_))));
	assert!(store.list("nothing/here/").await.expect("list failed").is_empty());
}

#[tokio::test]
async fn local_store_rejects_escaping_keys() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let store = LocalObjectStore::new(root.path(), "aio-test");

	for key in ["", "../etc/passwd", "a//b", "a/./b", "a\\b"] {
		assert!(
			matches!(store.put(key, Vec::new()).await, Err(Error::InvalidArgument(_))),
			"key {key:?} must be rejected"
		);
	}
}

#[tokio::test]
async fn notifying_store_emits_events_for_watched_prefixes() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let queue = Arc::new(MemoryQueue::new());
	let store = NotifyingObjectStore::new(
		LocalObjectStore::new(root.path(), "aio-test"),
		queue.clone(),
		"storage_events",
		vec!["uploads/".to_string()],
	);

	store.put("uploads/u1/my notes.txt/my notes.txt", b"one".to_vec()).await.expect("put failed");
	store.put("uploads/u1/my notes.txt/my notes.txt", b"two".to_vec()).await.expect("put failed");
	store.put("allinone/pdf/report.pdf", b"%PDF".to_vec()).await.expect("put failed");

	let events: Vec<StorageEvent> = queue
		.bodies("storage_events")
		.into_iter()
		.map(|body| serde_json::from_value(body).expect("Invalid storage event."))
		.collect();

	assert_eq!(events.len(), 2);

	for event in &events {
		assert_eq!(event.bucket, "aio-test");
		assert_eq!(event.key, "uploads/u1/my+notes.txt/my+notes.txt");
		assert!(event.sequencer.is_some());
	}

	assert_ne!(events[0].sequencer, events[1].sequencer);
	assert_eq!(store.get("allinone/pdf/report.pdf").await.expect("get failed"), b"%PDF");
}
