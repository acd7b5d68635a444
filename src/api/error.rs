use std::io::Cursor;

use rocket::http::{ContentType, Status};
use serde_json::json;

use crate::images::ResizeError;
use crate::storage::StorageError;

/// Every failure a request can surface. This is the single place where
/// internal errors become HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    ResizeError(ResizeError),
    ListingError(StorageError),
}

impl From<ResizeError> for ApiError {
    fn from(error: ResizeError) -> Self {
        ApiError::ResizeError(error)
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        ApiError::ListingError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::ResizeError(ResizeError::ObjectNotFound(_)) => Status::NotFound,
            ApiError::ResizeError(ResizeError::StorageError(_)) => Status::BadGateway,
            ApiError::ResizeError(ResizeError::ImageError(_)) => Status::UnprocessableEntity,
            ApiError::ResizeError(ResizeError::TaskFailed(_)) => Status::InternalServerError,
            ApiError::ListingError(_) => Status::BadGateway,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiError::ResizeError(ResizeError::ObjectNotFound(_)) => "Image not found",
            ApiError::ResizeError(ResizeError::StorageError(_)) => "Storage error",
            ApiError::ResizeError(ResizeError::ImageError(_)) => "Image processing error",
            ApiError::ResizeError(ResizeError::TaskFailed(_)) => "Internal error",
            ApiError::ListingError(_) => "Listing failed",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::ResizeError(error) => error.to_string(),
            ApiError::ListingError(error) => error.to_string(),
        }
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            log::error!("{} ({}): {}", self.title(), status, self.message());
        } else {
            log::warn!("{} ({}): {}", self.title(), status, self.message());
        }

        let body = json!({
            "error": self.title(),
            "message": self.message()
        })
        .to_string();

        rocket::Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_failures_to_statuses() {
        let cases = [
            (ApiError::from(ResizeError::ObjectNotFound("cat.jpg".into())), 404),
            (ApiError::from(ResizeError::StorageError("timeout".into())), 502),
            (ApiError::from(ResizeError::ImageError("bad data".into())), 422),
            (ApiError::from(ResizeError::TaskFailed("panicked".into())), 500),
            (ApiError::from(StorageError::Status(403)), 502),
        ];

        for (error, code) in cases {
            assert_eq!(error.status().code, code, "{:?}", error);
        }
    }
}
