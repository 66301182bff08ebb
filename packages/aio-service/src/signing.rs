//! Time-limited object URLs.
//!
//! A signed URL names one object, one HTTP method and one content type, and carries its expiry
//! and a keyed BLAKE3 MAC over those fields.

use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

const KEY_CONTEXT: &str = "aio presign v1";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignedMethod {
	Get,
	Put,
}
impl SignedMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Put => "PUT",
		}
	}
}

/// Query parameters of a signed URL.
#[derive(Clone, Debug, Deserialize)]
pub struct SignedQuery {
	pub method: String,
	pub content_type: String,
	pub expires: i64,
	pub signature: String,
}

pub struct UrlSigner {
	key: [u8; 32],
	public_base_url: String,
}
impl UrlSigner {
	pub fn new(secret: &str, public_base_url: &str) -> Self {
		Self {
			key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
			public_base_url: public_base_url.trim_end_matches('/').to_string(),
		}
	}

	/// `{public_base_url}/objects/{key}?method=&content_type=&expires=&signature=`.
	pub fn sign_url(
		&self,
		method: SignedMethod,
		key: &str,
		content_type: &str,
		expires: i64,
	) -> Result<String> {
		let mut url = Url::parse(&self.public_base_url).map_err(|err| Error::InvalidRequest {
			message: format!("public_base_url is not a valid URL: {err}."),
		})?;

		url.path_segments_mut()
			.map_err(|_| Error::InvalidRequest {
				message: "public_base_url cannot carry a path.".to_string(),
			})?
			.pop_if_empty()
			.push("objects")
			.extend(key.split('/'));
		url.query_pairs_mut()
			.append_pair("method", method.as_str())
			.append_pair("content_type", content_type)
			.append_pair("expires", &expires.to_string())
			.append_pair("signature", &self.signature(method, key, content_type, expires));

		Ok(url.into())
	}

	/// Checks that `query` authorizes `method` on `key` at unix time `now`.
	pub fn verify(
		&self,
		method: SignedMethod,
		key: &str,
		query: &SignedQuery,
		now: i64,
	) -> Result<()> {
		if query.method != method.as_str() {
			return Err(forbidden("Signed URL does not allow this method."));
		}
		if query.expires < now {
			return Err(forbidden("Signed URL has expired."));
		}

		let provided = blake3::Hash::from_hex(query.signature.as_bytes())
			.map_err(|_| forbidden("Signed URL signature is malformed."))?;
		let expected = self.mac(method, key, &query.content_type, query.expires);

		// `blake3::Hash` equality is constant-time.
		if provided != expected {
			return Err(forbidden("Signed URL signature does not match."));
		}

		Ok(())
	}

	fn signature(&self, method: SignedMethod, key: &str, content_type: &str, expires: i64) -> String {
		self.mac(method, key, content_type, expires).to_hex().to_string()
	}

	fn mac(&self, method: SignedMethod, key: &str, content_type: &str, expires: i64) -> blake3::Hash {
		let message = format!("{}\n{key}\n{content_type}\n{expires}", method.as_str());

		blake3::keyed_hash(&self.key, message.as_bytes())
	}
}

fn forbidden(message: &str) -> Error {
	Error::Forbidden { message: message.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn query_of(url: &str) -> SignedQuery {
		let parsed = Url::parse(url).expect("signed URL must parse");
		let pairs: std::collections::HashMap<String, String> =
			parsed.query_pairs().into_owned().collect();

		SignedQuery {
			method: pairs["method"].clone(),
			content_type: pairs["content_type"].clone(),
			expires: pairs["expires"].parse().expect("expires must be numeric"),
			signature: pairs["signature"].clone(),
		}
	}

	#[test]
	fn signed_urls_verify_until_expiry() {
		let signer = UrlSigner::new("0123456789abcdef", "http://localhost:8080/");
		let url = signer
			.sign_url(SignedMethod::Put, "uploads/u1/a.pdf/a.pdf", "application/pdf", 1_000)
			.expect("sign failed");

		assert!(url.starts_with("http://localhost:8080/objects/uploads/u1/a.pdf/a.pdf?method=PUT"));

		let query = query_of(&url);

		assert!(signer.verify(SignedMethod::Put, "uploads/u1/a.pdf/a.pdf", &query, 999).is_ok());
		assert!(signer.verify(SignedMethod::Put, "uploads/u1/a.pdf/a.pdf", &query, 1_001).is_err());
		assert!(signer.verify(SignedMethod::Get, "uploads/u1/a.pdf/a.pdf", &query, 999).is_err());
		assert!(signer.verify(SignedMethod::Put, "uploads/u2/a.pdf/a.pdf", &query, 999).is_err());
	}

	#[test]
	fn tampered_fields_fail_verification() {
		let signer = UrlSigner::new("0123456789abcdef", "http://localhost:8080");
		let url = signer
			.sign_url(SignedMethod::Get, "allinone/pdf/a.pdf", "application/pdf", 50)
			.expect("sign failed");
		let mut query = query_of(&url);

		query.content_type = "text/plain".to_string();

		assert!(signer.verify(SignedMethod::Get, "allinone/pdf/a.pdf", &query, 10).is_err());

		let other = UrlSigner::new("fedcba9876543210", "http://localhost:8080");

		assert!(
			other.verify(SignedMethod::Get, "allinone/pdf/a.pdf", &query_of(&url), 10).is_err()
		);
	}
}
