use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocStatus {
	Uploaded,
	Processing,
	Ready,
	Failed,
}
impl DocStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Uploaded => "UPLOADED",
			Self::Processing => "PROCESSING",
			Self::Ready => "READY",
			Self::Failed => "FAILED",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"UPLOADED" => Some(Self::Uploaded),
			"PROCESSING" => Some(Self::Processing),
			"READY" => Some(Self::Ready),
			"FAILED" => Some(Self::Failed),
			_ => None,
		}
	}

	/// States a document may be in for a transition into `self` to apply.
	///
	/// `PROCESSING -> PROCESSING` is allowed so a redelivered job can resume after its lease
	/// expired; `FAILED -> PROCESSING` lets a retried job start over. Any state may fall back to
	/// `UPLOADED` when the source object is rewritten and must be indexed again.
	pub fn allowed_sources(self) -> &'static [DocStatus] {
		match self {
			Self::Uploaded => &[Self::Processing, Self::Ready, Self::Failed],
			Self::Processing => &[Self::Uploaded, Self::Processing, Self::Failed],
			Self::Ready => &[Self::Processing],
			Self::Failed => &[Self::Uploaded, Self::Processing],
		}
	}

	pub fn can_transition_to(self, next: DocStatus) -> bool {
		next.allowed_sources().contains(&self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn happy_path_transitions() {
		assert!(DocStatus::Uploaded.can_transition_to(DocStatus::Processing));
		assert!(DocStatus::Processing.can_transition_to(DocStatus::Ready));
		assert!(DocStatus::Processing.can_transition_to(DocStatus::Failed));
	}

	#[test]
	fn ready_only_reopens_as_uploaded() {
		assert!(DocStatus::Ready.can_transition_to(DocStatus::Uploaded));

		for next in [DocStatus::Processing, DocStatus::Ready, DocStatus::Failed] {
			assert!(!DocStatus::Ready.can_transition_to(next), "READY -> {next:?} must be denied");
		}
	}

	#[test]
	fn round_trips_wire_names() {
		for status in [
			DocStatus::Uploaded,
			DocStatus::Processing,
			DocStatus::Ready,
			DocStatus::Failed,
		] {
			assert_eq!(DocStatus::parse(status.as_str()), Some(status));
		}

		assert_eq!(DocStatus::parse("ready"), None);
	}
}
