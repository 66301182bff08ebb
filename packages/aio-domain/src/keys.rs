//! Storage key layout.
//!
//! Per-user uploads live at `uploads/{user}/{file}/{file}`; everything derived from an upload
//! (transcript, index artifacts) is written next to it under `uploads/{user}/{file}/`. Bulk
//! uploads live at `allinone/{folder}/{file}` and share one corpus index at `allinone/`.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use crate::files::{self, DocumentFormat};

pub const UPLOADS_PREFIX: &str = "uploads";
pub const BULK_PREFIX: &str = "allinone";
pub const TRANSCRIPT_FILE: &str = "job.txt";
pub const INDEX_VECTORS_FILE: &str = "index.vec";
pub const INDEX_METADATA_FILE: &str = "index.json";
pub const SUFFIX_LEN: usize = 4;

// Short-uuid alphabet: no 0/O, 1/I/l.
const SUFFIX_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const FALLBACK_BASE_NAME: &str = "file";

static DISALLOWED_CHARS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("Static regex must compile."));
static LEADING_SEPARATORS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[-_]+").expect("Static regex must compile."));

/// A parsed `uploads/{user}/{folder}/.../{file}` key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadKey {
	pub user_id: String,
	/// Second path segment; names the original upload the object belongs to.
	pub folder: String,
	pub file_name: String,
	/// Everything before the file name, without a trailing slash.
	pub prefix: String,
}
impl UploadKey {
	pub fn parse(key: &str) -> Option<Self> {
		let segments: Vec<&str> = key.split('/').collect();

		if segments.len() < 4 || segments[0] != UPLOADS_PREFIX {
			return None;
		}

		let user_id = segments[1];
		let folder = segments[2];
		let file_name = segments[segments.len() - 1];

		if user_id.is_empty() || folder.is_empty() || file_name.is_empty() {
			return None;
		}

		Some(Self {
			user_id: user_id.to_string(),
			folder: folder.to_string(),
			file_name: file_name.to_string(),
			prefix: segments[..segments.len() - 1].join("/"),
		})
	}

	/// Key of the original upload this object was derived from.
	pub fn original_key(&self) -> String {
		user_upload_key(&self.user_id, &self.folder)
	}

	pub fn sibling(&self, file_name: &str) -> String {
		format!("{}/{file_name}", self.prefix)
	}
}

pub fn user_upload_prefix(user_id: &str, file_name: &str) -> String {
	format!("{UPLOADS_PREFIX}/{user_id}/{file_name}")
}

pub fn user_upload_key(user_id: &str, file_name: &str) -> String {
	format!("{}/{file_name}", user_upload_prefix(user_id, file_name))
}

pub fn bulk_upload_key(folder: &str, file_name: &str) -> String {
	format!("{BULK_PREFIX}/{folder}/{file_name}")
}

pub fn bulk_format_prefix(format: DocumentFormat) -> String {
	format!("{BULK_PREFIX}/{}/", format.folder())
}

/// `(vectors, metadata)` artifact keys for an index stored under `prefix`.
pub fn index_keys(prefix: &str) -> (String, String) {
	let prefix = prefix.trim_end_matches('/');

	if prefix.is_empty() {
		return (INDEX_VECTORS_FILE.to_string(), INDEX_METADATA_FILE.to_string());
	}

	(format!("{prefix}/{INDEX_VECTORS_FILE}"), format!("{prefix}/{INDEX_METADATA_FILE}"))
}

/// Restricts a name to `[A-Za-z0-9._-]`: spaces become underscores, other characters are
/// dropped, and leading hyphens/underscores are stripped.
pub fn sanitize_filename(name: &str) -> String {
	let underscored = name.replace(' ', "_");
	let filtered = DISALLOWED_CHARS.replace_all(&underscored, "");

	LEADING_SEPARATORS.replace(&filtered, "").into_owned()
}

/// Sanitized `(base, extension)` pair for an incoming file name.
pub fn sanitized_parts(file_name: &str) -> (String, String) {
	let (base, extension) = files::split_extension(file_name);
	let mut base = sanitize_filename(base);

	if base.is_empty() {
		base = FALLBACK_BASE_NAME.to_string();
	}

	(base, DISALLOWED_CHARS.replace_all(extension, "").into_owned())
}

pub fn random_suffix<R>(rng: &mut R) -> String
where
	R: Rng + ?Sized,
{
	(0..SUFFIX_LEN)
		.map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
		.collect()
}

pub fn with_suffix(base: &str, suffix: &str, extension: &str) -> String {
	format!("{base}-{suffix}{extension}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_original_and_derived_keys() {
		let original = UploadKey::parse("uploads/u1/clip.mp4/clip.mp4").expect("parse failed");

		assert_eq!(original.user_id, "u1");
		assert_eq!(original.folder, "clip.mp4");
		assert_eq!(original.file_name, "clip.mp4");
		assert_eq!(original.prefix, "uploads/u1/clip.mp4");
		assert_eq!(original.sibling(TRANSCRIPT_FILE), "uploads/u1/clip.mp4/job.txt");

		let derived = UploadKey::parse("uploads/u1/clip.mp4/job.txt").expect("parse failed");

		assert_eq!(derived.original_key(), "uploads/u1/clip.mp4/clip.mp4");
	}

	#[test]
	fn rejects_keys_outside_the_upload_layout() {
		assert!(UploadKey::parse("allinone/pdf/report.pdf").is_none());
		assert!(UploadKey::parse("uploads/u1/report.pdf").is_none());
		assert!(UploadKey::parse("uploads//a/a").is_none());
	}

	#[test]
	fn index_keys_handle_root_prefix() {
		assert_eq!(index_keys(""), ("index.vec".to_string(), "index.json".to_string()));
		assert_eq!(
			index_keys("allinone/"),
			("allinone/index.vec".to_string(), "allinone/index.json".to_string())
		);
	}
}
