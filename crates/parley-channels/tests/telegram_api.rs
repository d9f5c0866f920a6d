#![allow(clippy::unwrap_used, clippy::expect_used)]

use parley_channels::{Channel, InlineButton, OutgoingMessage, TelegramChannel};
use parley_core::{Event, SessionId};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:test";

async fn channel_for(server: &MockServer) -> TelegramChannel {
    TelegramChannel::new(TOKEN, 16).with_api_base(server.uri())
}

#[tokio::test]
async fn test_send_message_with_keyboard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(serde_json::json!({
            "chat_id": 42,
            "text": "Confirm?",
            "reply_markup": {"inline_keyboard": [[{"text": "Yes", "callback_data": "confirm|yes"}]]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": {"message_id": 555, "chat": {"id": 42}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server).await;
    let message = OutgoingMessage::text(SessionId(42), "Confirm?")
        .with_row(vec![InlineButton::new("Yes", "confirm|yes")]);
    let id = channel.send(message).await.unwrap();
    assert_eq!(id, 555);
}

#[tokio::test]
async fn test_api_error_is_channel_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let channel = channel_for(&server).await;
    let err = channel
        .send(OutgoingMessage::text(SessionId(1), "hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("chat not found"));
}

#[tokio::test]
async fn test_clear_keyboard_tolerates_not_modified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/editMessageReplyMarkup")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "ok": false,
            "description": "Bad Request: message is not modified"
        })))
        .mount(&server)
        .await;

    let channel = channel_for(&server).await;
    channel.clear_keyboard(SessionId(1), 10).await.unwrap();
}

#[tokio::test]
async fn test_answer_callback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/answerCallbackQuery")))
        .and(body_partial_json(serde_json::json!({"callback_query_id": "q-9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server).await;
    channel.answer_callback("q-9", None).await.unwrap();
}

#[tokio::test]
async fn test_poll_forwards_updates_until_receiver_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": [
                {"update_id": 1, "message": {"message_id": 1, "chat": {"id": 9}, "text": "hello"}},
                {"update_id": 2, "callback_query": {
                    "id": "q", "from": {"id": 9, "first_name": "A"},
                    "message": {"message_id": 1, "chat": {"id": 9}},
                    "data": "queue|1"
                }}
            ]
        })))
        .mount(&server)
        .await;

    let mut channel = channel_for(&server).await;
    let mut rx = channel.take_event_receiver().unwrap();
    assert!(channel.take_event_receiver().is_none());

    let poller = tokio::spawn(async move { channel.poll_updates(0).await });

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert!(matches!(first, Event::Message(ref m) if m.text == "hello"));
    assert!(matches!(second, Event::Callback(ref c) if c.token == "queue|1"));

    drop(rx);
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_poll_retries_after_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": [
                {"update_id": 7, "message": {"message_id": 1, "chat": {"id": 9}, "text": "after outage"}}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let mut channel = channel_for(&server)
        .await
        .with_retry_delay(Duration::from_millis(10));
    let mut rx = channel.take_event_receiver().unwrap();
    let poller = tokio::spawn(async move { channel.poll_updates(0).await });

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("update delivered after the failed poll")
        .unwrap();
    assert!(matches!(event, Event::Message(ref m) if m.text == "after outage"));
    assert!(server.received_requests().await.unwrap().len() >= 2);

    drop(rx);
    let result = tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_poll_stops_on_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut channel = channel_for(&server)
        .await
        .with_retry_delay(Duration::from_millis(10));
    let _rx = channel.take_event_receiver().unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), channel.poll_updates(0))
        .await
        .expect("polling ends without retrying")
        .unwrap_err();
    assert!(err.to_string().contains("Unauthorized"));
}

#[tokio::test]
async fn test_request_timeout_bounds_slow_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": true, "result": {"message_id": 1}}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let channel = channel_for(&server)
        .await
        .with_request_timeout(Duration::from_millis(200));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        channel.send(OutgoingMessage::text(SessionId(1), "hi")),
    )
    .await
    .expect("the client gives up on its own");
    assert!(result.is_err());
}
