use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown model: '{0}'")]
    UnknownModel(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Unsupported color mode: {0}")]
    UnsupportedColorMode(String),

    #[error("Label catalog has {catalog} entries but model produced {model} scores")]
    CatalogMismatch { catalog: usize, model: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ClassifyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifyError::UnknownModel(_) => StatusCode::BAD_REQUEST,
            ClassifyError::ImageDecode(_) => StatusCode::BAD_REQUEST,
            ClassifyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClassifyError::Base64(_) => StatusCode::BAD_REQUEST,
            ClassifyError::Json(_) => StatusCode::BAD_REQUEST,
            ClassifyError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ClassifyError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ClassifyError::UnsupportedColorMode(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ClassifyError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ClassifyError::Config(_) => "CONFIG_ERROR",
            ClassifyError::UnknownModel(_) => "UNKNOWN_MODEL",
            ClassifyError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ClassifyError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            ClassifyError::UnsupportedColorMode(_) => "UNSUPPORTED_COLOR_MODE",
            ClassifyError::CatalogMismatch { .. } => "CATALOG_MISMATCH",
            ClassifyError::Inference(_) => "INFERENCE_ERROR",
            ClassifyError::InvalidInput(_) => "INVALID_INPUT",
            ClassifyError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            ClassifyError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ClassifyError::Io(_) => "IO_ERROR",
            ClassifyError::Json(_) => "JSON_ERROR",
            ClassifyError::Base64(_) => "BASE64_DECODE_ERROR",
            ClassifyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_correctable_errors_map_to_bad_request() {
        let unknown = ClassifyError::UnknownModel("nonexistent_model".to_string());
        assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.error_code(), "UNKNOWN_MODEL");

        let decode = ClassifyError::ImageDecode(image::ImageError::IoError(
            std::io::Error::new(std::io::ErrorKind::InvalidData, "garbage"),
        ));
        assert_eq!(decode.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(decode.error_code(), "IMAGE_DECODE_ERROR");
    }

    #[test]
    fn catalog_mismatch_is_internal() {
        let err = ClassifyError::CatalogMismatch { catalog: 1000, model: 1001 };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "CATALOG_MISMATCH");
        assert!(err.to_string().contains("1000"));
        assert!(err.to_string().contains("1001"));
    }

    #[test]
    fn model_load_is_service_unavailable() {
        let err = ClassifyError::ModelLoad("resnet18.onnx missing".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
