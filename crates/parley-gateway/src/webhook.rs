use crate::dispatch::Dispatcher;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use parley_channels::{TelegramChannel, Update};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header Telegram uses to echo the secret given to `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared state for the webhook handler.
pub struct WebhookState {
    /// Dispatcher receiving converted events.
    pub dispatcher: Arc<Dispatcher>,
    /// Expected value of [`SECRET_HEADER`]. `None` accepts every request.
    pub secret: Option<String>,
}

/// Whether `headers` carry [`SECRET_HEADER`] equal to `expected`.
///
/// Compares raw header bytes without short-circuiting on the first
/// mismatch. A missing header never matches.
pub fn secret_header_matches(expected: &str, headers: &HeaderMap) -> bool {
    let Some(received) = headers.get(SECRET_HEADER) else {
        return false;
    };
    let (expected, received) = (expected.as_bytes(), received.as_bytes());
    expected.len() == received.len()
        && expected
            .iter()
            .zip(received)
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Axum handler for Telegram update pushes.
///
/// Route: `POST /telegram/webhook`
///
/// Checks the secret header, converts the update into an event and hands it
/// to the dispatcher on a separate task. Telegram only needs to know the
/// update was accepted; the dispatch outcome is logged by the dispatcher.
pub async fn telegram_webhook(
    headers: HeaderMap,
    State(state): State<Arc<WebhookState>>,
    body: String,
) -> impl IntoResponse {
    if let Some(ref secret) = state.secret {
        if !secret_header_matches(secret, &headers) {
            warn!("Webhook secret validation failed");
            return (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({"error": "invalid secret"}).to_string(),
            );
        }
    }

    let update: Update = match serde_json::from_str(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "Malformed update body");
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": "malformed update"}).to_string(),
            );
        }
    };
    let update_id = update.update_id;

    match TelegramChannel::update_to_event(update) {
        Some(event) => {
            let dispatcher = Arc::clone(&state.dispatcher);
            tokio::spawn(async move {
                dispatcher.dispatch(event).await;
            });
            (
                StatusCode::OK,
                serde_json::json!({"status": "accepted"}).to_string(),
            )
        }
        None => {
            debug!(update_id, "Update carries nothing routable");
            (
                StatusCode::OK,
                serde_json::json!({"status": "ignored"}).to_string(),
            )
        }
    }
}
