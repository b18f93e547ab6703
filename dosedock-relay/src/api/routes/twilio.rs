//! SMS provider delivery-status callback.

use axum::{
    Form, Router,
    extract::rejection::FormRejection,
    routing::post,
};
use serde::Deserialize;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::channels::mask_recipient;

/// Fields of the form-encoded status callback that are logged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusCallback {
    message_sid: Option<String>,
    message_status: Option<String>,
    to: Option<String>,
    from: Option<String>,
    error_code: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/twilio/status", post(status_callback))
}

async fn status_callback(
    form: Result<Form<StatusCallback>, FormRejection>,
) -> ApiResult<&'static str> {
    let Form(callback) = form.map_err(|e| {
        tracing::debug!(error = %e, "Rejected status callback");
        ApiError::bad_request("invalid form")
    })?;

    info!(
        sid = callback.message_sid.as_deref().unwrap_or("-"),
        status = callback.message_status.as_deref().unwrap_or("-"),
        to = %callback.to.as_deref().map(mask_recipient).unwrap_or_default(),
        from = callback.from.as_deref().unwrap_or("-"),
        error_code = callback.error_code.as_deref().unwrap_or("-"),
        "SMS status callback"
    );

    Ok("ok")
}
