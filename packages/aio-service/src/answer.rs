use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AioService, Error, Result, prompts, vector_index::FlatIndex};
use aio_domain::{files, keys};
use aio_storage::models::MemoryMessage;

const ENGLISH: &str = "en";

#[derive(Clone, Debug, Deserialize)]
pub struct AnswerRequest {
	#[serde(rename = "fileName")]
	pub file_name: String,
	pub prompt: String,
	#[serde(default)]
	pub model_id: Option<String>,
	#[serde(default)]
	pub language: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnswerResponse {
	pub answer: String,
	pub language: String,
	pub translated: bool,
}

impl AioService {
	/// Answers `req.prompt` from the index of the user's `req.file_name` and the conversation
	/// history, then records the exchange.
	pub async fn answer(
		&self,
		user_id: &str,
		conversation_id: Uuid,
		req: &AnswerRequest,
	) -> Result<AnswerResponse> {
		crate::presign::validate_user_id(user_id)?;
		validate_request(req)?;

		if let Some(model_id) = req.model_id.as_deref()
			&& model_id != self.cfg.providers.chat.model
		{
			tracing::warn!(
				model_id,
				configured = %self.cfg.providers.chat.model,
				"Ignoring requested model; using the configured chat model."
			);
		}

		let language = req
			.language
			.as_deref()
			.map(str::trim)
			.filter(|language| !language.is_empty())
			.unwrap_or(self.cfg.answer.default_language.as_str())
			.to_string();
		let index = self.load_index(user_id, &req.file_name).await?;
		let is_video = files::is_media(&req.file_name);
		let answer = if is_video {
			let context =
				self.retrieve(&index, &req.prompt, self.cfg.answer.video_top_k as usize).await?;
			let messages = prompts::video_messages(&context, &req.prompt);

			self.providers.chat.complete(&self.cfg.providers.chat, &messages).await?
		} else {
			let history = self.stores.records.load_memory(conversation_id).await?;
			let question = if history.is_empty() {
				req.prompt.clone()
			} else {
				let messages = prompts::condense_messages(&history, &req.prompt);

				self.providers.chat.complete(&self.cfg.providers.condense, &messages).await?
			};
			let context =
				self.retrieve(&index, &question, self.cfg.answer.document_top_k as usize).await?;
			let messages = prompts::qa_messages(&context, &question);

			self.providers.chat.complete(&self.cfg.providers.chat, &messages).await?
		};
		let (answer, translated) = self.translate_answer(answer, &language).await;

		// Video answers are only remembered once translated.
		if !is_video || translated {
			let exchange = [MemoryMessage::human(req.prompt.clone()), MemoryMessage::ai(answer.clone())];

			self.stores.records.append_memory(conversation_id, &exchange).await?;
		}

		tracing::info!(
			user_id,
			conversation_id = %conversation_id,
			file_name = %req.file_name,
			language = %language,
			translated,
			"Answered question."
		);

		Ok(AnswerResponse { answer, language, translated })
	}

	async fn load_index(&self, user_id: &str, file_name: &str) -> Result<FlatIndex> {
		let prefix = keys::user_upload_prefix(user_id, file_name);
		let (vectors_key, metadata_key) = keys::index_keys(&prefix);
		let vectors = self.stores.objects.get(&vectors_key).await.map_err(|err| match err {
			aio_storage::Error::NotFound(_) => Error::NotFound {
				message: format!("No index for {file_name}; it may still be processing."),
			},
			other => other.into(),
		})?;
		let metadata = self.stores.objects.get(&metadata_key).await?;

		FlatIndex::decode(&vectors, &metadata)
	}

	async fn retrieve<'a>(
		&self,
		index: &'a FlatIndex,
		question: &str,
		top_k: usize,
	) -> Result<Vec<&'a str>> {
		let embedded = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &[question.to_string()], 1)
			.await?;
		let query = embedded.into_iter().next().ok_or_else(|| Error::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		})?;
		let hits = index.search(&query, top_k)?;

		Ok(hits.into_iter().map(|hit| hit.chunk.text.as_str()).collect())
	}

	/// Returns the answer in `language`, or the original answer when translation fails.
	async fn translate_answer(&self, answer: String, language: &str) -> (String, bool) {
		// Codes such as `zh-TW` reach the provider with their original casing.
		if language.eq_ignore_ascii_case(ENGLISH) {
			return (answer, false);
		}

		match self
			.providers
			.translation
			.translate(&self.cfg.providers.translation, &answer, ENGLISH, language)
			.await
		{
			Ok(translated) => (translated, true),
			Err(err) => {
				tracing::warn!(error = %err, language, "Translation failed; returning the untranslated answer.");

				(answer, false)
			},
		}
	}
}

fn validate_request(req: &AnswerRequest) -> Result<()> {
	if req.file_name.trim().is_empty() || req.file_name.contains('/') {
		return Err(Error::InvalidRequest { message: "fileName must be a plain file name.".to_string() });
	}
	if req.prompt.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "prompt must be non-empty.".to_string() });
	}

	Ok(())
}
