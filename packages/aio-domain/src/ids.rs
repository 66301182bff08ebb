//! Identifiers derived from storage keys, so a redelivered event maps onto the same records,
//! queue messages and transcription jobs as the first delivery.

use uuid::Uuid;

pub const JOB_NAME_PREFIX: &str = "aio-";

pub fn document_id_for(object_key: &str) -> Uuid {
	derive("document", object_key)
}

pub fn conversation_id_for(document_id: Uuid) -> Uuid {
	derive("conversation", &document_id.to_string())
}

/// Corpus registrations have no single source key; each registration is its own document.
pub fn corpus_document_id() -> Uuid {
	Uuid::new_v4()
}

pub fn transcription_job_name(media_key: &str) -> String {
	format!("{JOB_NAME_PREFIX}{}", derive("transcription", media_key).simple())
}

fn derive(kind: &str, source: &str) -> Uuid {
	let name = format!("aio:{kind}:{source}");

	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_are_stable_per_key() {
		let key = "uploads/u1/report.pdf/report.pdf";

		assert_eq!(document_id_for(key), document_id_for(key));
		assert_ne!(document_id_for(key), document_id_for("uploads/u1/other.pdf/other.pdf"));
	}

	#[test]
	fn id_kinds_do_not_collide() {
		let key = "uploads/u1/clip.mp4/clip.mp4";
		let job = transcription_job_name(key);

		assert!(job.starts_with(JOB_NAME_PREFIX));
		assert!(!job.contains(&document_id_for(key).simple().to_string()));
		assert_ne!(conversation_id_for(document_id_for(key)), document_id_for(key));
	}
}
