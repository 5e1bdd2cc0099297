use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("login required")]
    Unauthenticated,

    #[error("{entity} {id} belongs to another user")]
    Forbidden { entity: &'static str, id: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn forbidden(entity: &'static str, id: i64) -> Self {
        Self::Forbidden { entity, id }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::SEE_OTHER,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tera::Error> for AppError {
    fn from(error: tera::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => Redirect::to("/login").into_response(),
            Self::Internal(ref error) => {
                tracing::error!(error = ?error, "request failed");
                (self.status_code(), "Internal Server Error").into_response()
            }
            _ => {
                tracing::debug!(error = %self, "request rejected");
                (self.status_code(), self.to_string()).into_response()
            }
        }
    }
}
