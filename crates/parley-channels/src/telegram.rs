use crate::channel::{Channel, InlineButton, OutgoingMessage};
use async_trait::async_trait;
use parley_core::{CallbackEvent, Event, MessageEvent, ParleyError, ParleyResult, SessionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Bound on one Bot API call. Long polls get the poll timeout on top.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// First pause after a failed poll; doubled per consecutive failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Telegram Bot API channel adapter.
///
/// Uses the Telegram Bot HTTP API for outbound effects and long-polling
/// (`getUpdates`) for inbound updates. Incoming messages and button
/// presses are converted to engine [`Event`]s and forwarded through a
/// `tokio::sync::mpsc` channel. Webhook deployments skip polling and feed
/// parsed [`Update`]s through [`TelegramChannel::update_to_event`].
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
    request_timeout: Duration,
    retry_delay: Duration,
    event_tx: mpsc::Sender<Event>,
    event_rx: Option<mpsc::Receiver<Event>>,
}

// ── Telegram API types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Why one `getUpdates` round trip failed.
#[derive(Debug)]
enum PollFailure {
    /// Network trouble, a 5xx, 409 or 429 answer, or an unreadable body.
    Retry {
        error: ParleyError,
        after: Option<Duration>,
    },
    /// The API rejected the request itself, e.g. a revoked token.
    Fatal(ParleyError),
}

/// Statuses worth polling again after a pause.
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::CONFLICT
}

/// An update as delivered by `getUpdates` or a webhook POST.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New incoming message.
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    /// Inline button press.
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A Telegram message (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    /// Message id within the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    #[serde(default)]
    pub from: Option<TelegramUser>,
    /// Chat the message belongs to.
    pub chat: TelegramChat,
    /// Text, absent for media messages.
    #[serde(default)]
    pub text: Option<String>,
}

/// A Telegram callback query (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Query id, needed to acknowledge the press.
    pub id: String,
    /// User who pressed the button.
    pub from: TelegramUser,
    /// Message carrying the keyboard.
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    /// Callback token attached to the button.
    #[serde(default)]
    pub data: Option<String>,
}

/// A Telegram user (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    /// User id.
    pub id: i64,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Optional last name.
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A Telegram chat (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    /// Chat id; used as the session id.
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

impl<'a> InlineKeyboardMarkup<'a> {
    fn from_rows(rows: &'a [Vec<InlineButton>]) -> Self {
        Self {
            inline_keyboard: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| InlineKeyboardButton {
                            text: &b.text,
                            callback_data: &b.token,
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct EditReplyMarkupRequest<'a> {
    chat_id: i64,
    message_id: i64,
    reply_markup: InlineKeyboardMarkup<'a>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SetWebhookRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: [&'a str; 2],
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

// ── Implementation ──────────────────────────────────────────────────────────

impl TelegramChannel {
    /// Create a new `TelegramChannel`.
    ///
    /// * `bot_token` – The bot token obtained from @BotFather.
    /// * `event_buffer` – Capacity of the internal mpsc event buffer.
    pub fn new(bot_token: impl Into<String>, event_buffer: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        Self {
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
            client: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Point the client at a different Bot API server (self-hosted API or
    /// a test double).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound every Bot API call by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Pause before the first retry of a failed poll.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Take the receiving half of the event channel.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.event_rx.take()
    }

    /// Convert a Telegram update into an engine event.
    ///
    /// Returns `None` for updates the engine does not route (media without
    /// text, callback queries without data, other update kinds).
    pub fn update_to_event(update: Update) -> Option<Event> {
        if let Some(query) = update.callback_query {
            let token = query.data?;
            let session = query
                .message
                .as_ref()
                .map_or(query.from.id, |m| m.chat.id);
            let mut event = CallbackEvent::new(SessionId(session), token);
            event.sender_id = Some(query.from.id);
            event.message_id = query.message.map(|m| m.message_id);
            event.query_id = Some(query.id);
            return Some(event.into());
        }

        let msg = update.message?;
        let text = msg.text?;
        let mut event = MessageEvent::new(SessionId(msg.chat.id), text);
        event.message_id = Some(msg.message_id);
        if let Some(user) = msg.from {
            event.sender_id = Some(user.id);
            event.sender_name = Some(match user.last_name {
                Some(last) => format!("{} {last}", user.first_name),
                None => user.first_name,
            });
        }
        Some(event.into())
    }

    /// Start long-polling the Telegram `getUpdates` endpoint.
    ///
    /// Runs until the receiver is dropped, forwarding every routable
    /// update through the mpsc channel. It should be spawned onto a Tokio
    /// task. Network errors, 5xx, 409 and 429 answers are retried with a
    /// doubling pause (honouring `retry_after`); any other API rejection
    /// ends the loop with an error.
    pub async fn poll_updates(&self, poll_timeout_secs: u64) -> ParleyResult<()> {
        let mut offset: Option<i64> = None;
        let mut delay = self.retry_delay;
        info!(timeout = poll_timeout_secs, "Telegram long polling started");

        loop {
            if self.event_tx.is_closed() {
                return Ok(());
            }

            let updates = match self.fetch_updates(offset, poll_timeout_secs).await {
                Ok(updates) => {
                    delay = self.retry_delay;
                    updates
                }
                Err(PollFailure::Fatal(e)) => {
                    error!(error = %e, "Telegram rejected getUpdates");
                    return Err(e);
                }
                Err(PollFailure::Retry { error, after }) => {
                    let wait = after.map_or(delay, |after| after.max(delay));
                    warn!(
                        error = %error,
                        retry_in_ms = wait.as_millis() as u64,
                        "Telegram poll failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = self.event_tx.closed() => return Ok(()),
                    }
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                    continue;
                }
            };

            for update in updates {
                // Advance the offset so we do not receive this update again.
                offset = Some(update.update_id + 1);

                let update_id = update.update_id;
                let Some(event) = Self::update_to_event(update) else {
                    debug!(update_id, "Skipping unroutable Telegram update");
                    continue;
                };
                // Best-effort send; if the receiver is dropped we stop.
                if self.event_tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn fetch_updates(
        &self,
        offset: Option<i64>,
        poll_timeout_secs: u64,
    ) -> Result<Vec<Update>, PollFailure> {
        let mut params: Vec<(&str, String)> = vec![
            ("timeout", poll_timeout_secs.to_string()),
            ("allowed_updates", r#"["message","callback_query"]"#.to_string()),
        ];
        if let Some(off) = offset {
            params.push(("offset", off.to_string()));
        }

        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&params)
            .timeout(Duration::from_secs(poll_timeout_secs) + self.request_timeout)
            .send()
            .await
            .map_err(|e| PollFailure::Retry {
                error: ParleyError::Channel(format!("Telegram poll error: {e}")),
                after: None,
            })?;

        let status = response.status();
        let body: TelegramResponse<Vec<Update>> = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                let error = ParleyError::Channel(format!("Telegram parse error ({status}): {e}"));
                return Err(if status.is_success() || is_retryable(status) {
                    PollFailure::Retry { error, after: None }
                } else {
                    PollFailure::Fatal(error)
                });
            }
        };

        if body.ok {
            return Ok(body.result.unwrap_or_default());
        }

        let error = ParleyError::Channel(format!(
            "Telegram API error ({status}): {}",
            body.description.unwrap_or_default()
        ));
        if is_retryable(status) {
            Err(PollFailure::Retry {
                error,
                after: body
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
            })
        } else {
            Err(PollFailure::Fatal(error))
        }
    }

    /// Register `url` as the webhook; Telegram will echo `secret` in the
    /// `X-Telegram-Bot-Api-Secret-Token` header.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> ParleyResult<()> {
        let payload = SetWebhookRequest {
            url,
            secret_token: secret,
            allowed_updates: ["message", "callback_query"],
        };
        let _: bool = self.call("setWebhook", &payload).await?;
        info!(url = %url, "Telegram webhook registered");
        Ok(())
    }

    /// Remove the webhook so long polling can be used.
    pub async fn delete_webhook(&self) -> ParleyResult<()> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<P, T>(&self, method: &str, payload: &P) -> ParleyResult<T>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(payload)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ParleyError::Channel(format!("Telegram {method} error: {e}")))?;

        let body: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| ParleyError::Channel(format!("Telegram parse error: {e}")))?;

        if !body.ok {
            return Err(ParleyError::Channel(format!(
                "Telegram {method} failed: {}",
                body.description.unwrap_or_default()
            )));
        }

        body.result
            .ok_or_else(|| ParleyError::Channel(format!("Telegram {method} returned no result")))
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: OutgoingMessage) -> ParleyResult<i64> {
        let payload = SendMessageRequest {
            chat_id: message.session_id.0,
            text: &message.text,
            reply_markup: (!message.keyboard.is_empty())
                .then(|| InlineKeyboardMarkup::from_rows(&message.keyboard)),
        };
        let sent: SentMessage = self.call("sendMessage", &payload).await?;
        Ok(sent.message_id)
    }

    async fn clear_keyboard(&self, session_id: SessionId, message_id: i64) -> ParleyResult<()> {
        let payload = EditReplyMarkupRequest {
            chat_id: session_id.0,
            message_id,
            reply_markup: InlineKeyboardMarkup::from_rows(&[]),
        };
        match self
            .call::<_, serde_json::Value>("editMessageReplyMarkup", &payload)
            .await
        {
            Ok(_) => Ok(()),
            // Keyboard already gone: the desired end state holds.
            Err(ParleyError::Channel(msg)) if msg.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, query_id: &str, notice: Option<&str>) -> ParleyResult<()> {
        let payload = AnswerCallbackRequest {
            callback_query_id: query_id,
            text: notice,
        };
        let _: bool = self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }
}
