use actix_web::{
    error::{self, BlockingError, ResponseError},
    http::StatusCode,
    HttpRequest, HttpResponse,
};
use diesel::r2d2::PoolError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Deserialize, Serialize)]
pub struct ListResp<T> {
    pub results: Vec<T>,
    pub count: i32,
}

impl<T> ListResp<T>
where
    T: std::clone::Clone,
{
    pub fn from(results: &[T]) -> Self {
        Self {
            results: results.to_vec(),
            count: results.len() as i32,
        }
    }
}

/// Failures surfaced by the API, each with its own status code.
///
/// `Conflict` is the only one a client is expected to retry.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl ApiError {
    pub fn unauthorized(msg: &str) -> Self {
        ApiError::Unauthorized(msg.to_string())
    }

    pub fn not_found(msg: &str) -> Self {
        ApiError::NotFound(msg.to_string())
    }

    pub fn invalid_argument(msg: &str) -> Self {
        ApiError::InvalidArgument(msg.to_string())
    }

    pub fn conflict(msg: &str) -> Self {
        ApiError::Conflict(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        ApiError::InternalError(msg.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }

    fn to_error_resp(&self) -> ErrorResp {
        ErrorResp {
            error: self.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_error_resp())
    }
}

// Convert Diesel errors to semantic API errors
impl From<DieselError> for ApiError {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::NotFound => ApiError::not_found("Resource not found"),
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => {
                    ApiError::conflict("Resource was written concurrently, retry")
                }
                DatabaseErrorKind::SerializationFailure => {
                    ApiError::conflict("Transaction lost a race, retry")
                }
                DatabaseErrorKind::ForeignKeyViolation => {
                    ApiError::not_found("Referenced resource does not exist")
                }
                DatabaseErrorKind::CheckViolation => ApiError::invalid_argument(info.message()),
                _ => ApiError::DatabaseError(info.message().to_string()),
            },
            _ => ApiError::internal("An unexpected error occurred"),
        }
    }
}

impl From<BlockingError> for ApiError {
    fn from(error: BlockingError) -> Self {
        ApiError::InternalError(format!("Blocking error: {}", error))
    }
}

impl From<PoolError> for ApiError {
    fn from(error: PoolError) -> Self {
        ApiError::DatabaseError(format!("Could not get db connection from pool: {}", error))
    }
}

/// JSON body of every error response.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResp {
    pub error: String,
}

impl ErrorResp {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

pub fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> error::Error {
    use actix_web::error::JsonPayloadError;

    let detail = ErrorResp::new(&err.to_string());
    let resp = match &err {
        JsonPayloadError::ContentType => HttpResponse::UnsupportedMediaType().json(detail),
        JsonPayloadError::Deserialize(json_err) if json_err.is_data() => {
            HttpResponse::UnprocessableEntity().json(detail)
        }
        _ => HttpResponse::BadRequest().json(detail),
    };
    error::InternalError::from_response(err, resp).into()
}
