//! Route error responses.
//!
//! A wrong secret answers 404 with no body so it is indistinguishable
//! from an endpoint that does not exist.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::dispatch::RouteError;

impl RouteError {
    /// Status code sent to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::MissingHost | RouteError::MissingSecret { .. } => StatusCode::BAD_REQUEST,
            RouteError::UnknownHost(_) | RouteError::SecretMismatch(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Plain-text body sent to the client.
    pub fn body(&self) -> String {
        match self {
            RouteError::MissingHost => "Host required\n".to_string(),
            RouteError::MissingSecret { hostname, action } => {
                format!("Secret required e.g. https://{}/{}/secret\n", hostname, action)
            }
            RouteError::UnknownHost(_) => "Host not valid\n".to_string(),
            RouteError::SecretMismatch(_) => String::new(),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}
