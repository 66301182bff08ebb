use serde::Serialize;

use crate::{AioService, Error, Result, signing::SignedMethod};
use aio_domain::{files, keys};

// Bounds the collision retries; each retry draws a fresh random suffix.
const MAX_KEY_ATTEMPTS: usize = 8;

#[derive(Clone, Debug, Serialize)]
pub struct PresignedUpload {
	pub file_name: String,
	pub key: String,
	pub content_type: String,
	pub presignedurl: String,
}

impl AioService {
	/// Signed PUT URL for a per-user upload at `uploads/{user}/{name}{ext}/{name}{ext}`.
	pub async fn presign_user_upload(
		&self,
		user_id: &str,
		file_name: &str,
	) -> Result<PresignedUpload> {
		validate_user_id(user_id)?;

		let (base, extension) = parsed_file_name(file_name)?;
		let key = self
			.unique_key(&base, &extension, |name| keys::user_upload_key(user_id, name))
			.await?;
		let upload = self.sign_upload(file_name, key, &extension, self.cfg.presign.user_ttl_secs)?;

		tracing::info!(user_id, key = %upload.key, "Issued presigned upload URL.");

		Ok(upload)
	}

	/// Signed PUT URLs for a comma-separated list of bulk uploads under `allinone/{folder}/`.
	pub async fn presign_bulk_uploads(&self, files: &str) -> Result<Vec<PresignedUpload>> {
		let names: Vec<&str> =
			files.split(',').map(str::trim).filter(|name| !name.is_empty()).collect();

		if names.is_empty() {
			return Err(Error::InvalidRequest { message: "files must name at least one file.".to_string() });
		}

		let mut uploads = Vec::with_capacity(names.len());

		for file_name in names {
			let (base, extension) = parsed_file_name(file_name)?;
			let folder = files::bulk_folder(&extension);
			let key =
				self.unique_key(&base, &extension, |name| keys::bulk_upload_key(folder, name)).await?;
			let upload =
				self.sign_upload(file_name, key, &extension, self.cfg.presign.bulk_ttl_secs)?;

			tracing::info!(key = %upload.key, "Issued presigned bulk upload URL.");

			uploads.push(upload);
		}

		Ok(uploads)
	}

	/// First key built from `base{ext}`, then `base-XXXX{ext}`, that does not exist yet.
	async fn unique_key<F>(&self, base: &str, extension: &str, key_for: F) -> Result<String>
	where
		F: Fn(&str) -> String,
	{
		let mut key = key_for(&format!("{base}{extension}"));

		for _ in 0..MAX_KEY_ATTEMPTS {
			if !self.object_exists(&key).await {
				return Ok(key);
			}

			let suffix = keys::random_suffix(&mut rand::thread_rng());

			key = key_for(&keys::with_suffix(base, &suffix, extension));
		}

		Err(Error::Conflict { message: format!("Could not find a free key for {base}{extension}.") })
	}

	/// Lookup failures count as "absent"; the upload then overwrites at worst.
	async fn object_exists(&self, key: &str) -> bool {
		match self.stores.objects.head(key).await {
			Ok(meta) => meta.is_some(),
			Err(err) => {
				tracing::warn!(error = %err, key, "Object existence check failed.");

				false
			},
		}
	}

	fn sign_upload(
		&self,
		file_name: &str,
		key: String,
		extension: &str,
		ttl_secs: u64,
	) -> Result<PresignedUpload> {
		let content_type = files::content_type(extension);
		let expires = crate::now().unix_timestamp() + ttl_secs as i64;
		let presignedurl = self.signer.sign_url(SignedMethod::Put, &key, content_type, expires)?;

		Ok(PresignedUpload {
			file_name: file_name.to_string(),
			key,
			content_type: content_type.to_string(),
			presignedurl,
		})
	}
}

fn parsed_file_name(file_name: &str) -> Result<(String, String)> {
	if file_name.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "file_name must be non-empty.".to_string() });
	}

	Ok(keys::sanitized_parts(file_name.trim()))
}

pub(crate) fn validate_user_id(user_id: &str) -> Result<()> {
	if user_id.is_empty() || user_id.contains('/') || user_id == "." || user_id == ".." {
		return Err(Error::InvalidRequest { message: format!("Invalid user id {user_id:?}.") });
	}

	Ok(())
}
