//! Realtime channel: one WebSocket per logged-in user.
//!
//! After connecting, the client sends `{"type":"auth","userId":...}` and
//! then only reads. Frames are JSON objects; `rule_triggered` frames ask for
//! an immediate poll, everything else is a notification. There is no
//! reconnect and no heartbeat: when the socket closes the channel is done.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use pushapp_core::{SdkError, SdkResult};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// A decoded socket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketMessage {
    RuleTriggered { rule_id: Option<String> },
    Notification(Value),
}

impl SocketMessage {
    pub fn classify(frame: Value) -> Self {
        let data = frame.get("data");
        let message_type = data
            .and_then(|d| d.get("message_type"))
            .and_then(Value::as_str);
        if message_type == Some("rule_triggered") {
            let rule_id = data
                .and_then(|d| d.get("rule_id"))
                .and_then(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            return SocketMessage::RuleTriggered { rule_id };
        }
        SocketMessage::Notification(frame)
    }
}

/// Parse a frame body. Only JSON objects are accepted.
pub fn parse_frame(body: &[u8]) -> Option<SocketMessage> {
    match serde_json::from_slice::<Value>(body) {
        Ok(frame @ Value::Object(_)) => Some(SocketMessage::classify(frame)),
        Ok(other) => {
            warn!(frame = %other, "Ignoring non-object socket frame");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse socket frame");
            None
        }
    }
}

pub fn auth_frame(user_id: &str) -> Value {
    json!({"type": "auth", "userId": user_id})
}

pub type MessageHandler = Arc<dyn Fn(SocketMessage) + Send + Sync>;

/// A live connection. Dropping it tears the socket down.
pub struct RealtimeChannel {
    user_id: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    pub async fn connect(url: &str, user_id: &str, on_message: MessageHandler) -> SdkResult<Self> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SdkError::WebSocket(e.to_string()))?;
        info!(url = %url, user_id = %user_id, "WebSocket connected");

        let (mut write, mut read) = stream.split();
        write
            .send(Message::Text(auth_frame(user_id).to_string().into()))
            .await
            .map_err(|e| SdkError::WebSocket(e.to_string()))?;
        metrics::counter!("pushapp.socket.connects").increment(1);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let owner = user_id.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!(error = %e, "Close frame not sent");
                        }
                        break;
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            debug!(frame = %text.as_str(), "WebSocket received");
                            if let Some(msg) = parse_frame(text.as_bytes()) {
                                on_message(msg);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(msg) = parse_frame(&data) {
                                on_message(msg);
                            }
                        }
                        Some(Ok(Message::Close(reason))) => {
                            info!(user_id = %owner, reason = ?reason, "WebSocket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(user_id = %owner, error = %e, "WebSocket read error");
                            break;
                        }
                        None => break,
                    }
                }
            }
            debug!(user_id = %owner, "WebSocket task finished");
        });

        Ok(Self {
            user_id: user_id.to_string(),
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Send a close frame and stop reading.
    pub fn disconnect(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
