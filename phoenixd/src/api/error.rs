// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use hyper::StatusCode;

use crate::io::DbError;

/// Errors surfaced by the HTTP layer. The message is plain text for a human
/// operator; nothing parses it.
#[derive(Debug)]
pub(crate) enum ApiError {
	MissingParameter(&'static str),
	InvalidParameter { name: &'static str, expected: &'static str },
	BadRequest(String),
	Unauthorized,
	NotFound,
	MethodNotAllowed,
	Internal(String),
}

impl ApiError {
	pub(crate) fn status(&self) -> StatusCode {
		match self {
			ApiError::MissingParameter(_)
			| ApiError::InvalidParameter { .. }
			| ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
			ApiError::NotFound => StatusCode::NOT_FOUND,
			ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub(crate) fn message(&self) -> String {
		match self {
			ApiError::MissingParameter(name) => format!("missing parameter: {}", name),
			ApiError::InvalidParameter { name, expected } => {
				format!("invalid parameter {} (expected {})", name, expected)
			},
			ApiError::BadRequest(message) => message.clone(),
			ApiError::Unauthorized => "unauthorized".to_string(),
			ApiError::NotFound => "not found".to_string(),
			ApiError::MethodNotAllowed => "method not allowed".to_string(),
			ApiError::Internal(message) => message.clone(),
		}
	}
}

// Store corruption is fatal for the operation and surfaces as a 500; it is
// never degraded to a default value.
impl From<DbError> for ApiError {
	fn from(e: DbError) -> Self {
		ApiError::Internal(e.to_string())
	}
}
