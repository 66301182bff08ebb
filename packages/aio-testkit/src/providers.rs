//! Deterministic stand-ins for the HTTP providers.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use color_eyre::eyre;
use url::Url;

use aio_config::{EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use aio_providers::{
	chat::ChatMessage,
	transcription::{JobStatus, StartOutcome, TranscriptionJobRequest},
};
use aio_service::{
	BoxFuture, ChatProvider, EmbeddingProvider, Providers, TranscriptionProvider,
	TranslationProvider,
};
use aio_storage::objects::{self, ObjectStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

/// Bag-of-words embedding: each lowercase word adds one to a bucket chosen by its hash, so
/// texts sharing words are similar.
#[derive(Default)]
pub struct HashEmbedding {
	calls: Mutex<Vec<usize>>,
}
impl HashEmbedding {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of texts per call, in call order.
	pub fn calls(&self) -> Vec<usize> {
		lock(&self.calls).clone()
	}

	pub fn vector_for(text: &str, dim: usize) -> Vec<f32> {
		let len = dim.max(1);
		let mut vector = vec![0.0; len];

		for word in text.split(|c: char| !c.is_alphanumeric()).filter(|word| !word.is_empty()) {
			let hash = blake3::hash(word.to_lowercase().as_bytes());
			let bucket = u16::from_le_bytes([hash.as_bytes()[0], hash.as_bytes()[1]]) as usize;

			vector[bucket % len] += 1.0;
		}

		vector
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		_batch_size: usize,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		lock(&self.calls).push(texts.len());

		let dim = cfg.dimensions as usize;
		let vectors = texts.iter().map(|text| Self::vector_for(text, dim)).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

#[derive(Clone, Debug)]
pub struct RecordedChat {
	pub model: String,
	pub prompt: String,
}

/// Replies with a fixed text per model and records every prompt.
#[derive(Default)]
pub struct ScriptedChat {
	replies: HashMap<String, String>,
	calls: Mutex<Vec<RecordedChat>>,
}
impl ScriptedChat {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reply(mut self, model: &str, text: &str) -> Self {
		self.replies.insert(model.to_string(), text.to_string());

		self
	}

	pub fn calls(&self) -> Vec<RecordedChat> {
		lock(&self.calls).clone()
	}
}
impl ChatProvider for ScriptedChat {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		let prompt =
			messages.iter().map(|message| message.content.as_str()).collect::<Vec<_>>().join("\n");

		lock(&self.calls).push(RecordedChat { model: cfg.model.clone(), prompt });

		let reply = self
			.replies
			.get(&cfg.model)
			.cloned()
			.ok_or_else(|| eyre::eyre!("No scripted reply for model {}.", cfg.model));

		Box::pin(async move { reply })
	}
}

/// Prefixes the text with the target language, or fails every call.
pub struct StubTranslation {
	fail: bool,
	calls: Mutex<Vec<(String, String)>>,
}
impl StubTranslation {
	pub fn prefixing() -> Self {
		Self { fail: false, calls: Mutex::new(Vec::new()) }
	}

	pub fn failing() -> Self {
		Self { fail: true, calls: Mutex::new(Vec::new()) }
	}

	/// `(text, target_language)` pairs, in call order.
	pub fn calls(&self) -> Vec<(String, String)> {
		lock(&self.calls).clone()
	}
}
impl TranslationProvider for StubTranslation {
	fn translate<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		text: &'a str,
		_source_language: &'a str,
		target_language: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		lock(&self.calls).push((text.to_string(), target_language.to_string()));

		let result = if self.fail {
			Err(eyre::eyre!("Translation service unavailable."))
		} else {
			Ok(format!("[{target_language}] {text}"))
		};

		Box::pin(async move { result })
	}
}

struct FakeJob {
	output_key: String,
	polls: usize,
}

/// A transcription service that finishes every job after a number of polls and uploads its
/// result straight into an object store.
pub struct FakeTranscription {
	objects: Arc<dyn ObjectStore>,
	segments: Vec<String>,
	failure: Option<String>,
	polls_before_done: usize,
	jobs: Mutex<HashMap<String, FakeJob>>,
	starts: Mutex<Vec<String>>,
	deleted: Mutex<Vec<String>>,
}
impl FakeTranscription {
	pub fn new(objects: Arc<dyn ObjectStore>, segments: &[&str]) -> Self {
		Self {
			objects,
			segments: segments.iter().map(|segment| segment.to_string()).collect(),
			failure: None,
			polls_before_done: 1,
			jobs: Mutex::new(HashMap::new()),
			starts: Mutex::new(Vec::new()),
			deleted: Mutex::new(Vec::new()),
		}
	}

	pub fn failing(mut self, reason: &str) -> Self {
		self.failure = Some(reason.to_string());

		self
	}

	/// Job names passed to `start_job`, including repeated starts.
	pub fn starts(&self) -> Vec<String> {
		lock(&self.starts).clone()
	}

	pub fn deleted(&self) -> Vec<String> {
		lock(&self.deleted).clone()
	}

	fn transcript_json(&self) -> Vec<u8> {
		let transcripts: Vec<serde_json::Value> = self
			.segments
			.iter()
			.map(|segment| serde_json::json!({ "transcript": segment }))
			.collect();

		serde_json::json!({ "results": { "transcripts": transcripts } }).to_string().into_bytes()
	}
}
impl TranscriptionProvider for FakeTranscription {
	fn start_job<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		request: &'a TranscriptionJobRequest,
	) -> BoxFuture<'a, color_eyre::Result<StartOutcome>> {
		lock(&self.starts).push(request.job_name.clone());

		let outcome = object_key_of(&request.output_upload_url).map(|output_key| {
			let mut jobs = lock(&self.jobs);

			if jobs.contains_key(&request.job_name) {
				return StartOutcome::AlreadyExists;
			}

			jobs.insert(request.job_name.clone(), FakeJob { output_key, polls: 0 });

			StartOutcome::Started
		});

		Box::pin(async move { outcome })
	}

	fn job_status<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		job_name: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<JobStatus>> {
		Box::pin(async move {
			let output_key = {
				let mut jobs = lock(&self.jobs);
				let job = jobs
					.get_mut(job_name)
					.ok_or_else(|| eyre::eyre!("Unknown transcription job {job_name}."))?;

				job.polls += 1;

				if job.polls <= self.polls_before_done {
					return Ok(JobStatus::InProgress);
				}

				job.output_key.clone()
			};

			if let Some(reason) = &self.failure {
				return Ok(JobStatus::Failed { reason: Some(reason.clone()) });
			}

			self.objects.put(&output_key, self.transcript_json()).await?;

			Ok(JobStatus::Completed)
		})
	}

	fn delete_job<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		job_name: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		lock(&self.deleted).push(job_name.to_string());
		lock(&self.jobs).remove(job_name);

		Box::pin(async { Ok(()) })
	}
}

/// Object key addressed by a signed `/objects/{key}` URL.
pub fn object_key_of(url: &str) -> color_eyre::Result<String> {
	let parsed = Url::parse(url)?;
	let path = parsed
		.path()
		.strip_prefix("/objects/")
		.ok_or_else(|| eyre::eyre!("{url} is not an object URL."))?;

	Ok(objects::decode_event_key(path))
}

/// Providers built from the given stubs.
pub fn providers(
	embedding: Arc<HashEmbedding>,
	chat: Arc<ScriptedChat>,
	translation: Arc<StubTranslation>,
	transcription: Arc<FakeTranscription>,
) -> Providers {
	Providers::new(embedding, chat, translation, transcription)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_vectors_count_words_per_bucket() {
		let vector = HashEmbedding::vector_for("Blue sky, blue SEA.", 8);
		let blue = HashEmbedding::vector_for("blue", 8);

		assert_eq!(vector.len(), 8);
		assert_eq!(vector.iter().sum::<f32>(), 4.0);
		assert_eq!(blue.iter().sum::<f32>(), 1.0);

		let bucket = blue.iter().position(|value| *value == 1.0).expect("blue has no bucket");

		assert!(vector[bucket] >= 2.0);
		assert_eq!(HashEmbedding::vector_for("", 0), vec![0.0]);
	}
}
