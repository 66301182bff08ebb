use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub queues: Queues,
	pub providers: Providers,
	pub presign: Presign,
	#[serde(default)]
	pub transcription: Transcription,
	#[serde(default)]
	pub indexing: Indexing,
	#[serde(default)]
	pub answer: Answer,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	/// Base URL clients use to reach `aio-api`; presigned URLs are rooted here.
	pub public_base_url: String,
	/// Header carrying the caller identity, set by the upstream authorizer.
	#[serde(default = "default_user_header")]
	pub user_header: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub objects: Objects,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Objects {
	pub root: PathBuf,
	pub bucket: String,
	/// Writes under these prefixes emit a storage event.
	#[serde(default = "default_notify_prefixes")]
	pub notify_prefixes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Queues {
	pub storage_events: String,
	pub document_processing: String,
	pub media_processing: String,
	#[serde(default = "default_lease_seconds")]
	pub lease_seconds: i64,
	/// Media jobs poll a transcription job, so their lease must outlive a typical job.
	#[serde(default = "default_media_lease_seconds")]
	pub media_lease_seconds: i64,
	#[serde(default = "default_queue_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub chat: LlmProviderConfig,
	pub condense: LlmProviderConfig,
	pub transcription: ProviderConfig,
	pub translation: ProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Presign {
	pub signing_secret: String,
	#[serde(default = "default_user_ttl_secs")]
	pub user_ttl_secs: u64,
	#[serde(default = "default_bulk_ttl_secs")]
	pub bulk_ttl_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Transcription {
	pub poll_interval_ms: u64,
	pub identify_language: bool,
	/// Lifetime of the signed URLs handed to the transcription service.
	pub url_ttl_secs: u64,
}
impl Default for Transcription {
	fn default() -> Self {
		Self { poll_interval_ms: 5_000, identify_language: true, url_ttl_secs: 3_600 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Indexing {
	pub max_chars: u32,
	pub overlap_chars: u32,
	pub embed_batch_size: u32,
}
impl Default for Indexing {
	fn default() -> Self {
		Self { max_chars: 1_000, overlap_chars: 0, embed_batch_size: 16 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Answer {
	pub document_top_k: u32,
	pub video_top_k: u32,
	pub default_language: String,
}
impl Default for Answer {
	fn default() -> Self {
		Self { document_top_k: 4, video_top_k: 7, default_language: "en".to_string() }
	}
}

fn default_user_header() -> String {
	"x-aio-user".to_string()
}

fn default_notify_prefixes() -> Vec<String> {
	vec!["uploads/".to_string()]
}

fn default_lease_seconds() -> i64 {
	60
}

fn default_media_lease_seconds() -> i64 {
	1_800
}

fn default_queue_poll_interval_ms() -> u64 {
	500
}

fn default_max_attempts() -> i32 {
	5
}

fn default_user_ttl_secs() -> u64 {
	500
}

fn default_bulk_ttl_secs() -> u64 {
	300
}
