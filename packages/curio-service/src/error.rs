pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Could not understand this query: {message}")]
	IntentResolution { message: String },
	#[error("No retrieval source is available: {message}")]
	RetrievalUnavailable { message: String },
	#[error("Timed out: {message}")]
	Timeout { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<curio_storage::Error> for Error {
	fn from(err: curio_storage::Error) -> Self {
		match err {
			curio_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			curio_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<curio_providers::Error> for Error {
	fn from(err: curio_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant { message: err.to_string() }
	}
}
