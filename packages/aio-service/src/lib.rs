//! Handlers of the AllInOne pipeline.
//!
//! Each handler is a method on [`AioService`] and is written against the storage and provider
//! traits, so the same code runs behind the HTTP API, the queue workers and the tests.

pub mod answer;
pub mod corpus;
pub mod documents;
pub mod indexing;
pub mod intake;
pub mod loaders;
pub mod presign;
pub mod prompts;
pub mod signing;
pub mod transcription;
pub mod vector_index;

mod error;

pub use aio_storage::BoxFuture;
pub use answer::{AnswerRequest, AnswerResponse};
pub use error::{Error, Result};
pub use indexing::IndexingOutcome;
pub use intake::IntakeOutcome;
pub use presign::PresignedUpload;
pub use transcription::TranscriptionOutcome;

use std::sync::Arc;

use aio_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use aio_providers::{
	chat::{self, ChatMessage},
	embedding,
	transcription::{self as transcription_api, JobStatus, StartOutcome, TranscriptionJobRequest},
	translation,
};
use aio_storage::{
	db::Db,
	objects::{LocalObjectStore, NotifyingObjectStore, ObjectStore},
	queue::MessageQueue,
	records::RecordStore,
};
use signing::UrlSigner;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		batch_size: usize,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

pub trait TranslationProvider
where
	Self: Send + Sync,
{
	fn translate<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		text: &'a str,
		source_language: &'a str,
		target_language: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

pub trait TranscriptionProvider
where
	Self: Send + Sync,
{
	fn start_job<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		request: &'a TranscriptionJobRequest,
	) -> BoxFuture<'a, color_eyre::Result<StartOutcome>>;

	fn job_status<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		job_name: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<JobStatus>>;

	fn delete_job<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		job_name: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
	pub translation: Arc<dyn TranslationProvider>,
	pub transcription: Arc<dyn TranscriptionProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		chat: Arc<dyn ChatProvider>,
		translation: Arc<dyn TranslationProvider>,
		transcription: Arc<dyn TranscriptionProvider>,
	) -> Self {
		Self { embedding, chat, translation, transcription }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			chat: provider.clone(),
			translation: provider.clone(),
			transcription: provider,
		}
	}
}

/// The storage collaborators every handler works against.
#[derive(Clone)]
pub struct Stores {
	pub records: Arc<dyn RecordStore>,
	pub queue: Arc<dyn MessageQueue>,
	pub objects: Arc<dyn ObjectStore>,
}
impl Stores {
	/// Postgres-backed records and queues, and a local object store that emits storage events
	/// for writes under the configured prefixes.
	pub async fn connect(cfg: &Config) -> Result<Self> {
		let db = Arc::new(Db::connect(&cfg.storage.postgres).await?);

		db.ensure_schema().await?;

		let objects = NotifyingObjectStore::new(
			LocalObjectStore::from_config(&cfg.storage.objects),
			db.clone(),
			cfg.queues.storage_events.clone(),
			cfg.storage.objects.notify_prefixes.clone(),
		);

		Ok(Self { records: db.clone(), queue: db, objects: Arc::new(objects) })
	}
}

pub struct AioService {
	pub cfg: Config,
	pub stores: Stores,
	pub providers: Providers,
	pub signer: UrlSigner,
}
impl AioService {
	pub fn new(cfg: Config, stores: Stores) -> Self {
		Self::with_providers(cfg, stores, Providers::default())
	}

	pub fn with_providers(cfg: Config, stores: Stores, providers: Providers) -> Self {
		let signer = UrlSigner::new(&cfg.presign.signing_secret, &cfg.service.public_base_url);

		Self { cfg, stores, providers, signer }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		batch_size: usize,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts, batch_size))
	}
}
impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(chat::complete(cfg, messages))
	}
}
impl TranslationProvider for DefaultProviders {
	fn translate<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		text: &'a str,
		source_language: &'a str,
		target_language: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(translation::translate(cfg, text, source_language, target_language))
	}
}
impl TranscriptionProvider for DefaultProviders {
	fn start_job<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		request: &'a TranscriptionJobRequest,
	) -> BoxFuture<'a, color_eyre::Result<StartOutcome>> {
		Box::pin(transcription_api::start_job(cfg, request))
	}

	fn job_status<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		job_name: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<JobStatus>> {
		Box::pin(transcription_api::job_status(cfg, job_name))
	}

	fn delete_job<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		job_name: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(transcription_api::delete_job(cfg, job_name))
	}
}

pub(crate) fn now() -> time::OffsetDateTime {
	time::OffsetDateTime::now_utc()
}

pub(crate) fn job_body(job: &aio_storage::models::JobMessage) -> Result<serde_json::Value> {
	serde_json::to_value(job).map_err(|err| Error::Storage { message: err.to_string() })
}
