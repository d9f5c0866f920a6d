use crate::dispatch::Dispatcher;
use crate::webhook::{telegram_webhook, WebhookState};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Shared state of the health endpoint.
pub struct AppState {
    /// Dispatcher whose counters are reported.
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP surface of the bot: the Telegram webhook and a health endpoint.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the HTTP routes.
    ///
    /// `secret`, when set, must be echoed by Telegram in the
    /// `X-Telegram-Bot-Api-Secret-Token` header of every webhook request.
    pub fn build(dispatcher: Arc<Dispatcher>, secret: Option<String>) -> Router {
        let webhook_state = Arc::new(WebhookState {
            dispatcher: Arc::clone(&dispatcher),
            secret,
        });
        let app_state = Arc::new(AppState { dispatcher });

        Router::new()
            .route("/health", get(health_handler))
            .with_state(app_state)
            .merge(
                Router::new()
                    .route("/telegram/webhook", post(telegram_webhook))
                    .with_state(webhook_state),
            )
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let router = state.dispatcher.router();
    serde_json::json!({
        "status": "ok",
        "service": "parley",
        "routes": router.states().len(),
        "callbacks": router.callback_prefixes().len(),
        "dispatch": state.dispatcher.stats(),
    })
    .to_string()
}
