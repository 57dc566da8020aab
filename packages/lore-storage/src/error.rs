use qdrant_client::QdrantError;
use tonic::Code;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error(transparent)]
	Qdrant(#[from] Box<QdrantError>),
}
impl Error {
	/// Whether the error reports that the target Qdrant collection does not exist yet.
	pub fn is_missing_collection(&self) -> bool {
		match self {
			Self::Qdrant(err) => match err.as_ref() {
				QdrantError::ResponseError { status } if status.code() == Code::NotFound => true,
				err => is_missing_collection_message(&err.to_string()),
			},
			_ => false,
		}
	}
}

impl From<QdrantError> for Error {
	fn from(err: QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}

pub fn is_missing_collection_message(message: &str) -> bool {
	let message = message.to_lowercase();

	message.contains("collection")
		&& (message.contains("not found") || message.contains("doesn't exist"))
}

#[cfg(test)]
mod tests {
	use qdrant_client::QdrantError;
	use tonic::{Code, Status};

	use crate::error::{Error, is_missing_collection_message};

	#[test]
	fn not_found_status_is_a_missing_collection_whatever_the_wording() {
		let missing = Error::from(QdrantError::ResponseError {
			status: Status::new(Code::NotFound, "no such thing: lore_chunks"),
		});
		let unavailable = Error::from(QdrantError::ResponseError {
			status: Status::new(Code::Unavailable, "connection refused"),
		});

		assert!(missing.is_missing_collection());
		assert!(!unavailable.is_missing_collection());
	}

	#[test]
	fn worded_errors_without_a_status_still_count() {
		let missing =
			Error::from(QdrantError::ConversionError("Collection `docs` doesn't exist!".to_string()));

		assert!(missing.is_missing_collection());
		assert!(!Error::InvalidArgument("collection not found".to_string()).is_missing_collection());
	}

	#[test]
	fn detects_missing_collection_messages() {
		assert!(is_missing_collection_message("Not found: Collection `docs` doesn't exist!"));
		assert!(is_missing_collection_message("collection docs not found"));
		assert!(!is_missing_collection_message("Collection docs: timeout"));
		assert!(!is_missing_collection_message("point not found"));
	}
}
