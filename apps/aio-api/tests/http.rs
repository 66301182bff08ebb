use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Method, Request, StatusCode, header},
	response::Response,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use aio_api::{routes, state::AppState};
use aio_service::{AioService, Stores, signing::SignedMethod};
use aio_storage::objects::{LocalObjectStore, NotifyingObjectStore, ObjectStore};
use aio_testkit::{
	config::{self, CHAT_MODEL, USER_HEADER},
	providers::{self, FakeTranscription, HashEmbedding, ScriptedChat, StubTranslation},
	stores::{MemoryQueue, MemoryRecordStore},
};

const PUBLIC_BASE_URL: &str = "http://objects.test";

struct TestApp {
	_root: TempDir,
	app: Router,
	state: AppState,
	queue: Arc<MemoryQueue>,
}
impl TestApp {
	fn new() -> Self {
		let root = tempfile::tempdir().expect("Failed to create object root.");
		let cfg = config::sample_config(root.path());
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
			Arc::new(FakeTranscription::new(objects.clone(), &[])),
		);
		let stores = Stores { records: Arc::new(MemoryRecordStore::new()), queue: queue.clone(), objects };
		let state = AppState::from_service(AioService::with_providers(cfg, stores, providers));
		let app = routes::router(state.clone());

		Self { _root: root, app, state, queue }
	}

	async fn send(&self, request: Request<Body>) -> Response {
		self.app.clone().oneshot(request).await.expect("Failed to call the router.")
	}
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
	Request::builder().method(method).uri(uri)
}

/// Strips the public base URL so the signed URL can be sent to the router directly.
fn local_uri(url: &str) -> String {
	url.strip_prefix(PUBLIC_BASE_URL).expect("Signed URL must use the public base URL.").to_string()
}

async fn json_body(response: Response) -> Value {
	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body.");

	serde_json::from_slice(&bytes).expect("Response body must be JSON.")
}

#[tokio::test]
async fn health_ok_with_cors_headers() {
	let test = TestApp::new();
	let response = test
		.send(request(Method::GET, "/health").body(Body::empty()).expect("Failed to build request."))
		.await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).map(|value| value.as_bytes()),
		Some(&b"*"[..])
	);
}

#[tokio::test]
async fn preflight_is_answered_without_auth() {
	let test = TestApp::new();
	let response = test
		.send(
			request(Method::OPTIONS, "/v1/presign?file_name=a.pdf")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(response.status(), StatusCode::NO_CONTENT);
	assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn user_presign_requires_identity() {
	let test = TestApp::new();
	let response = test
		.send(
			request(Method::GET, "/v1/presign?file_name=a.pdf")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(json_body(response).await["error_code"], "unauthorized");
}

#[tokio::test]
async fn presigned_upload_round_trip() {
	let test = TestApp::new();
	let response = test
		.send(
			request(Method::GET, "/v1/presign?file_name=notes.txt")
				.header(USER_HEADER, "u1")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(response.status(), StatusCode::OK);

	let url = json_body(response).await["presignedurl"]
		.as_str()
		.expect("presignedurl must be a string.")
		.to_string();
	let uri = local_uri(&url);

	assert!(uri.starts_with("/objects/uploads/u1/notes.txt/notes.txt?"), "uri {uri}");

	let wrong_type = test
		.send(
			request(Method::PUT, &uri)
				.header(header::CONTENT_TYPE, "application/pdf")
				.body(Body::from("hello"))
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(wrong_type.status(), StatusCode::FORBIDDEN);

	let stored = test
		.send(
			request(Method::PUT, &uri)
				.header(header::CONTENT_TYPE, "text/plain")
				.body(Body::from("hello"))
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(stored.status(), StatusCode::OK);
	assert_eq!(test.queue.bodies("storage_events").len(), 1);

	let objects = &test.state.service.stores.objects;

	assert_eq!(objects.get("uploads/u1/notes.txt/notes.txt").await.expect("get failed"), b"hello");

	// The signature covers the method, so the PUT URL cannot be used to read.
	let read_with_put_url =
		test.send(request(Method::GET, &uri).body(Body::empty()).expect("Failed to build request.")).await;

	assert_eq!(read_with_put_url.status(), StatusCode::FORBIDDEN);

	let expires = time::OffsetDateTime::now_utc().unix_timestamp() + 60;
	let get_url = test
		.state
		.service
		.signer
		.sign_url(SignedMethod::Get, "uploads/u1/notes.txt/notes.txt", "text/plain", expires)
		.expect("sign failed");
	let fetched = test
		.send(
			request(Method::GET, &local_uri(&get_url)).body(Body::empty()).expect("Failed to build request."),
		)
		.await;

	assert_eq!(fetched.status(), StatusCode::OK);
	assert_eq!(
		fetched.headers().get(header::CONTENT_TYPE).map(|value| value.as_bytes()),
		Some(&b"text/plain"[..])
	);

	let bytes = body::to_bytes(fetched.into_body(), usize::MAX).await.expect("Failed to read body.");

	assert_eq!(&bytes[..], b"hello");
}

#[tokio::test]
async fn unsigned_or_tampered_object_requests_are_forbidden() {
	let test = TestApp::new();
	let unsigned = test
		.send(
			request(Method::PUT, "/objects/uploads/u1/a.txt/a.txt")
				.header(header::CONTENT_TYPE, "text/plain")
				.body(Body::from("x"))
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(unsigned.status(), StatusCode::FORBIDDEN);

	let expires = time::OffsetDateTime::now_utc().unix_timestamp() + 60;
	let url = test
		.state
		.service
		.signer
		.sign_url(SignedMethod::Put, "uploads/u1/a.txt/a.txt", "text/plain", expires)
		.expect("sign failed");
	let tampered = local_uri(&url).replace("uploads/u1/a.txt/a.txt", "uploads/u2/a.txt/a.txt");
	let response = test
		.send(
			request(Method::PUT, &tampered)
				.header(header::CONTENT_TYPE, "text/plain")
				.body(Body::from("x"))
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(response.status(), StatusCode::FORBIDDEN);
	assert_eq!(json_body(response).await["error_code"], "forbidden");
	assert!(test.queue.bodies("storage_events").is_empty());
}

#[tokio::test]
async fn bulk_presign_lists_every_file() {
	let test = TestApp::new();
	let response = test
		.send(
			request(Method::GET, "/v1/presign?files=report.pdf,data.csv")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(response.status(), StatusCode::OK);

	let body = json_body(response).await;
	let entries = body.as_array().expect("Bulk presign must return an array.");

	assert_eq!(entries.len(), 2);
	assert_eq!(entries[0]["file_name"], "report.pdf");
	assert_eq!(entries[1]["key"], "allinone/csv/data.csv");
	assert!(entries[1]["presignedurl"].as_str().is_some_and(|url| url.contains("signature=")));
}

#[tokio::test]
async fn answering_an_unindexed_file_is_not_found() {
	let test = TestApp::new();
	let body = serde_json::json!({ "fileName": "missing.pdf", "prompt": "Anything?" });
	let response = test
		.send(
			request(Method::POST, &format!("/v1/conversations/{}", uuid::Uuid::new_v4()))
				.header(USER_HEADER, "u1")
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from(body.to_string()))
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert_eq!(json_body(response).await["error_code"], "not_found");
}

#[tokio::test]
async fn documents_and_corpus_require_identity_and_validate() {
	let test = TestApp::new();
	let anonymous = test
		.send(request(Method::GET, "/v1/documents").body(Body::empty()).expect("Failed to build request."))
		.await;

	assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

	let listed = test
		.send(
			request(Method::GET, "/v1/documents")
				.header(USER_HEADER, "u1")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(listed.status(), StatusCode::OK);
	assert_eq!(json_body(listed).await, serde_json::json!([]));

	let corpus = test
		.send(
			request(Method::POST, "/v1/corpus")
				.header(USER_HEADER, "u1")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await;

	assert_eq!(corpus.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(corpus).await["error_code"], "invalid_request");
}
