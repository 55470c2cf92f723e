//! Service endpoints that do not proxy: health, service info, contact, metrics.

use axum::{
    extract::{rejection::JsonRejection, OriginalUri, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::http::error::ProxyError;
use crate::http::server::AppState;

pub const SERVICE_NAME: &str = "forward-proxy";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "message": "API is running.",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Body of `POST /api/contact`. Every field is required and must be non-blank.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

impl ContactForm {
    fn field(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

pub async fn contact(
    State(state): State<AppState>,
    form: Result<Json<ContactForm>, JsonRejection>,
) -> Response {
    let form = match form {
        Ok(Json(form)) => form,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Contact body rejected");
            ContactForm::default()
        }
    };

    let (Some(name), Some(email), Some(_message)) = (
        ContactForm::field(&form.name),
        ContactForm::field(&form.email),
        ContactForm::field(&form.message),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Validation Failed",
                "message": "Name, email, and message are required fields.",
            })),
        )
            .into_response();
    };

    if state.secrets.external_key.is_none() {
        return ProxyError::ConfigurationMissing("EXTERNAL_SECRET_KEY").into_response();
    }

    tracing::info!("Contact message received");
    Json(json!({
        "success": true,
        "message": format!("Thank you, {}. Your message has been received.", name),
        "receivedData": { "name": name, "email": email },
    }))
    .into_response()
}

pub async fn api_not_found(OriginalUri(uri): OriginalUri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": format!("Endpoint {} does not exist.", uri),
        })),
    )
        .into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE))],
        state.metrics.render(),
    )
        .into_response()
}

/// Fallback when static files are disabled.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
}
