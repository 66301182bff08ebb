use std::path::Path;

use uuid::Uuid;

use crate::{
	AioService, Error, Result,
	loaders::{self, LoadedText},
	vector_index::{FlatIndex, IndexChunk},
};
use aio_chunking::ChunkingConfig;
use aio_domain::{
	files::{self, DocumentFormat},
	ids,
	keys::{self, UploadKey},
	status::DocStatus,
};
use aio_storage::models::JobMessage;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexingOutcome {
	Indexed { index_prefix: String, chunks: usize },
	/// The document was indexed by an earlier delivery.
	Skipped { document_id: Uuid },
}

impl AioService {
	/// Builds the index for one uploaded document, or the corpus index when `job` has no key.
	pub async fn handle_document_job(&self, job: &JobMessage) -> Result<IndexingOutcome> {
		match job.key.as_deref() {
			Some(key) => self.index_document(job, key).await,
			None => self.index_corpus(job).await,
		}
	}

	async fn index_document(&self, job: &JobMessage, key: &str) -> Result<IndexingOutcome> {
		let upload = UploadKey::parse(key).ok_or_else(|| Error::InvalidRequest {
			message: format!("Document key {key:?} is outside the upload layout."),
		})?;
		let format = DocumentFormat::from_extension(&files::extension_of(&upload.file_name))
			.ok_or_else(|| Error::UnsupportedFileType { file_name: upload.file_name.clone() })?;
		let document_id = job.documentid.unwrap_or_else(|| ids::document_id_for(key));

		if !self.begin_processing(document_id).await? {
			return Ok(IndexingOutcome::Skipped { document_id });
		}

		let result: Result<IndexingOutcome> = async {
			let bytes = self.stores.objects.get(key).await?;
			let texts = load_blocking(format, key.to_string(), bytes).await?;

			self.build_and_store_index(texts, &upload.prefix).await
		}
		.await;

		self.finish_processing(document_id, result).await
	}

	/// Downloads every bulk upload into a scratch directory and indexes them as one corpus.
	async fn index_corpus(&self, job: &JobMessage) -> Result<IndexingOutcome> {
		if let Some(document_id) = job.documentid
			&& !self.begin_processing(document_id).await?
		{
			return Ok(IndexingOutcome::Skipped { document_id });
		}

		let result: Result<IndexingOutcome> = async {
			let scratch = tempfile::tempdir().map_err(io_error)?;

			self.download_corpus(scratch.path()).await?;

			let texts = load_scratch_dir(scratch.path()).await?;

			self.build_and_store_index(texts, keys::BULK_PREFIX).await
		}
		.await;

		match job.documentid {
			Some(document_id) => self.finish_processing(document_id, result).await,
			None => result,
		}
	}

	async fn download_corpus(&self, scratch: &Path) -> Result<()> {
		for format in DocumentFormat::all() {
			let dir = scratch.join(format.folder());

			tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;

			for key in self.stores.objects.list(&keys::bulk_format_prefix(format)).await? {
				let Some(name) = key.rsplit('/').next().filter(|name| !name.is_empty()) else {
					continue;
				};
				let bytes = self.stores.objects.get(&key).await?;

				tokio::fs::write(dir.join(name), bytes).await.map_err(io_error)?;
			}
		}

		Ok(())
	}

	/// `UPLOADED | PROCESSING | FAILED -> PROCESSING`. Returns `false` for a document that is
	/// already READY.
	async fn begin_processing(&self, document_id: Uuid) -> Result<bool> {
		if self.stores.records.transition_status(document_id, DocStatus::Processing, crate::now()).await? {
			return Ok(true);
		}

		match self.stores.records.get_document(document_id).await? {
			Some(doc) if doc.doc_status() == Some(DocStatus::Ready) => {
				tracing::info!(document_id = %document_id, "Document already indexed; skipping.");

				Ok(false)
			},
			Some(doc) => Err(Error::Conflict {
				message: format!("Document {document_id} is in unexpected state {}.", doc.status),
			}),
			None => Err(Error::NotFound { message: format!("document {document_id}") }),
		}
	}

	async fn finish_processing(
		&self,
		document_id: Uuid,
		result: Result<IndexingOutcome>,
	) -> Result<IndexingOutcome> {
		let records = &self.stores.records;

		match result {
			Ok(outcome) => {
				if !records.transition_status(document_id, DocStatus::Ready, crate::now()).await? {
					tracing::warn!(document_id = %document_id, "Document left PROCESSING before indexing finished.");
				}

				tracing::info!(document_id = %document_id, ?outcome, "Document indexed.");

				Ok(outcome)
			},
			Err(err) => {
				tracing::error!(error = %err, document_id = %document_id, "Indexing failed.");

				if let Err(status_err) =
					records.transition_status(document_id, DocStatus::Failed, crate::now()).await
				{
					tracing::error!(
						error = %status_err,
						document_id = %document_id,
						"Failed to mark document as FAILED."
					);
				}

				Err(err)
			},
		}
	}

	async fn build_and_store_index(
		&self,
		texts: Vec<LoadedText>,
		prefix: &str,
	) -> Result<IndexingOutcome> {
		let chunking = ChunkingConfig {
			max_chars: self.cfg.indexing.max_chars,
			overlap_chars: self.cfg.indexing.overlap_chars,
		};
		let chunks: Vec<IndexChunk> = texts
			.iter()
			.flat_map(|loaded| {
				aio_chunking::split_text(&loaded.text, &chunking).into_iter().map(|chunk| IndexChunk {
					source: loaded.source.clone(),
					chunk_index: chunk.chunk_index,
					text: chunk.text,
				})
			})
			.collect();

		if chunks.is_empty() {
			return Err(Error::Index { message: format!("No text to index under {prefix}.") });
		}

		let embedding_cfg = &self.cfg.providers.embedding;
		let inputs: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
		let vectors = self
			.providers
			.embedding
			.embed(embedding_cfg, &inputs, self.cfg.indexing.embed_batch_size as usize)
			.await?;
		let index = FlatIndex::build(&embedding_cfg.model, embedding_cfg.dimensions, chunks, vectors)?;
		let (vectors_key, metadata_key) = keys::index_keys(prefix);

		self.stores.objects.put(&vectors_key, index.encode_vectors()).await?;
		self.stores.objects.put(&metadata_key, index.encode_metadata()?).await?;

		Ok(IndexingOutcome::Indexed { index_prefix: prefix.to_string(), chunks: index.len() })
	}
}

/// Runs the loader for every file in `{scratch}/{folder}` whose extension matches the folder.
async fn load_scratch_dir(scratch: &Path) -> Result<Vec<LoadedText>> {
	let mut texts = Vec::new();

	for format in DocumentFormat::all() {
		let mut entries =
			tokio::fs::read_dir(scratch.join(format.folder())).await.map_err(io_error)?;
		let mut names = Vec::new();

		while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
			let file_name = entry.file_name();

			if let Some(name) = file_name.to_str()
				&& files::extension_of(name) == format.extension()
			{
				names.push(name.to_string());
			}
		}

		names.sort();

		for name in names {
			let bytes =
				tokio::fs::read(scratch.join(format.folder()).join(&name)).await.map_err(io_error)?;
			let source = keys::bulk_upload_key(format.folder(), &name);

			texts.extend(load_blocking(format, source, bytes).await?);
		}
	}

	Ok(texts)
}

/// Text extraction is CPU-bound and some parsers panic on malformed input.
async fn load_blocking(
	format: DocumentFormat,
	source: String,
	bytes: Vec<u8>,
) -> Result<Vec<LoadedText>> {
	tokio::task::spawn_blocking(move || loaders::load(format, &source, &bytes))
		.await
		.map_err(|err| Error::Index { message: format!("Document loader aborted: {err}.") })?
}

fn io_error(err: std::io::Error) -> Error {
	Error::Storage { message: err.to_string() }
}
