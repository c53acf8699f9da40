//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::logic::config::ConfigError;
use crate::logic::features::FeatureError;
use crate::logic::model::RegistryError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Resource errors
    NotFound(String),
    AlreadyExists(String),

    // Validation errors
    ValidationError {
        message: String,
        errors: Vec<String>,
    },

    // Lifecycle errors (wrong state for the requested transition)
    Conflict(String),

    // Model runtime failure, contained: body still carries the fallback
    Inference {
        message: String,
        data: Value,
        safety: Value,
    },

    // Generic errors
    InternalError(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError {
            message: message.into(),
            errors: Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, extra) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::ValidationError { message, errors } => {
                let extra = (!errors.is_empty()).then(|| json!({ "errors": errors }));
                (StatusCode::BAD_REQUEST, message, extra)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Inference { message, data, safety } => {
                tracing::error!("Model inference error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    message,
                    Some(json!({ "data": data, "safety": safety })),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16()
        });
        if let (Some(Value::Object(extra)), Some(obj)) = (extra, body.as_object_mut()) {
            obj.extend(extra);
        }

        (status, Json(body)).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownModel(_) => AppError::NotFound(err.to_string()),
            RegistryError::DuplicateModel(_) => AppError::AlreadyExists(err.to_string()),
            RegistryError::OutputMismatch { .. } | RegistryError::InvalidInput { .. } => {
                AppError::validation(err.to_string())
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownNamespace(_)
            | ConfigError::UnknownVersion { .. }
            | ConfigError::NoActiveVersion(_) => AppError::NotFound(err.to_string()),
            ConfigError::DuplicateNamespace(_) => AppError::AlreadyExists(err.to_string()),
            ConfigError::Validation { errors } => AppError::ValidationError {
                message: "Config validation failed".to_string(),
                errors,
            },
            ConfigError::InvalidStrategy(_) => AppError::validation(err.to_string()),
            ConfigError::InvalidTransition { .. } | ConfigError::NothingToRollBack(_) => {
                AppError::Conflict(err.to_string())
            }
            ConfigError::Drift { .. } => AppError::InternalError(err.to_string()),
        }
    }
}

impl From<FeatureError> for AppError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::NotFound(_) => AppError::NotFound(err.to_string()),
            FeatureError::NonFinite { .. } | FeatureError::EmptyName => {
                AppError::validation(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_map_to_status() {
        let status = |e: ConfigError| AppError::from(e).into_response().status();

        assert_eq!(status(ConfigError::UnknownNamespace("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ConfigError::Validation { errors: vec!["bad".into()] }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(ConfigError::NothingToRollBack("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(ConfigError::Drift {
                namespace: "x".into(),
                version: 1,
                stored: "a".into(),
                computed: "b".into(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_registry_errors_map_to_status() {
        let status = |e: RegistryError| AppError::from(e).into_response().status();
        assert_eq!(status(RegistryError::UnknownModel("m".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(RegistryError::DuplicateModel("m".into())), StatusCode::CONFLICT);
    }
}
