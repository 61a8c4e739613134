pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error(transparent)]
	Planner(#[from] sweep_domain::Error),
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sweep_providers::Error> for Error {
	fn from(err: sweep_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<sweep_storage::Error> for Error {
	fn from(err: sweep_storage::Error) -> Self {
		match err {
			sweep_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
