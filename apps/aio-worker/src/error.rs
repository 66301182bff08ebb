pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Service(#[from] aio_service::Error),
	#[error(transparent)]
	Storage(#[from] aio_storage::Error),
	#[error("Invalid message body: {0}")]
	Payload(#[from] serde_json::Error),
}
impl Error {
	/// Whether another delivery of the same message can succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Payload(_) => false,
			Self::Service(err) => !matches!(
				err,
				aio_service::Error::InvalidRequest { .. }
					| aio_service::Error::UnsupportedFileType { .. }
			),
			Self::Storage(_) => true,
		}
	}
}
