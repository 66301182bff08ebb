mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Answer, Config, EmbeddingProviderConfig, Indexing, LlmProviderConfig, Objects, Postgres,
	Presign, ProviderConfig, Providers, Queues, Service, Storage, Transcription,
};

use std::{fs, path::Path};

const MAX_PRESIGN_TTL_SECS: u64 = 3_600;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}

	let base = cfg.service.public_base_url.as_str();

	if !(base.starts_with("http://") || base.starts_with("https://")) {
		return Err(Error::Validation {
			message: "service.public_base_url must start with http:// or https://.".to_string(),
		});
	}
	if cfg.service.user_header.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.user_header must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.objects.bucket.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.objects.bucket must be non-empty.".to_string(),
		});
	}

	for (label, name) in [
		("queues.storage_events", &cfg.queues.storage_events),
		("queues.document_processing", &cfg.queues.document_processing),
		("queues.media_processing", &cfg.queues.media_processing),
	] {
		if name.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.queues.storage_events == cfg.queues.document_processing
		|| cfg.queues.storage_events == cfg.queues.media_processing
		|| cfg.queues.document_processing == cfg.queues.media_processing
	{
		return Err(Error::Validation { message: "Queue names must be distinct.".to_string() });
	}
	if cfg.queues.lease_seconds <= 0 || cfg.queues.media_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "queues lease seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.queues.max_attempts <= 0 {
		return Err(Error::Validation {
			message: "queues.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("chat", &cfg.providers.chat.api_key),
		("condense", &cfg.providers.condense.api_key),
		("transcription", &cfg.providers.transcription.api_key),
		("translation", &cfg.providers.translation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	for (label, temperature) in [
		("chat", cfg.providers.chat.temperature),
		("condense", cfg.providers.condense.temperature),
	] {
		if !temperature.is_finite() || temperature < 0.0 {
			return Err(Error::Validation {
				message: format!(
					"providers.{label}.temperature must be a finite number, zero or greater."
				),
			});
		}
	}

	if cfg.presign.signing_secret.len() < 16 {
		return Err(Error::Validation {
			message: "presign.signing_secret must be at least 16 bytes.".to_string(),
		});
	}

	for (label, ttl) in [
		("presign.user_ttl_secs", cfg.presign.user_ttl_secs),
		("presign.bulk_ttl_secs", cfg.presign.bulk_ttl_secs),
	] {
		if ttl == 0 || ttl > MAX_PRESIGN_TTL_SECS {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 1-{MAX_PRESIGN_TTL_SECS}."),
			});
		}
	}

	if cfg.transcription.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "transcription.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.max_chars == 0 {
		return Err(Error::Validation {
			message: "indexing.max_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.overlap_chars >= cfg.indexing.max_chars {
		return Err(Error::Validation {
			message: "indexing.overlap_chars must be less than indexing.max_chars.".to_string(),
		});
	}
	if cfg.indexing.embed_batch_size == 0 {
		return Err(Error::Validation {
			message: "indexing.embed_batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.answer.document_top_k == 0 || cfg.answer.video_top_k == 0 {
		return Err(Error::Validation {
			message: "answer top_k values must be greater than zero.".to_string(),
		});
	}
	if cfg.answer.default_language.trim().is_empty() {
		return Err(Error::Validation {
			message: "answer.default_language must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	trim_trailing_slash(&mut cfg.service.public_base_url);
	trim_trailing_slash(&mut cfg.providers.embedding.api_base);
	trim_trailing_slash(&mut cfg.providers.chat.api_base);
	trim_trailing_slash(&mut cfg.providers.condense.api_base);
	trim_trailing_slash(&mut cfg.providers.transcription.api_base);
	trim_trailing_slash(&mut cfg.providers.translation.api_base);

	cfg.service.user_header = cfg.service.user_header.trim().to_ascii_lowercase();
	cfg.answer.default_language = cfg.answer.default_language.trim().to_string();

	for prefix in &mut cfg.storage.objects.notify_prefixes {
		if !prefix.is_empty() && !prefix.ends_with('/') {
			prefix.push('/');
		}
	}
}

fn trim_trailing_slash(value: &mut String) {
	while value.ends_with('/') {
		value.pop();
	}
}
