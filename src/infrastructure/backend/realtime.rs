//! Realtime change feed over the backend's Phoenix websocket.
//!
//! One socket per subscription: join a `postgres_changes` channel, pump
//! change frames into the subscription and keep the socket alive with
//! heartbeats until the subscription is dropped.

use crate::application::ports::{ChangeEvent, ChangeFilter, ChangeKind, Subscription};
use crate::application::shared::mappers::row::parse_datetime;
use crate::shared::error::AppError;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

const PHOENIX_VSN: &str = "1.0.0";
const JOIN_REF: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
        }
    }

    fn into_message(self) -> Result<Message, AppError> {
        Ok(Message::text(serde_json::to_string(&self)?))
    }
}

pub fn socket_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/realtime/v1/websocket?apikey={anon_key}&vsn={PHOENIX_VSN}")
}

pub fn join_frame(topic: &str, filter: &ChangeFilter, access_token: &str) -> PhoenixFrame {
    let mut change = json!({
        "event": "*",
        "schema": "public",
        "table": filter.table,
    });
    if let Some(row_filter) = &filter.filter {
        change["filter"] = Value::String(row_filter.to_string());
    }
    PhoenixFrame::new(
        topic,
        "phx_join",
        json!({
            "config": {
                "broadcast": {"self": false},
                "presence": {"key": ""},
                "postgres_changes": [change],
            },
            "access_token": access_token,
        }),
        JOIN_REF.to_string(),
    )
}

pub fn heartbeat_frame(reference: u64) -> PhoenixFrame {
    PhoenixFrame::new("phoenix", "heartbeat", json!({}), reference.to_string())
}

pub fn leave_frame(topic: &str, reference: u64) -> PhoenixFrame {
    PhoenixFrame::new(topic, "phx_leave", json!({}), reference.to_string())
}

/// `Some(Ok)` / `Some(Err)` for the reply to `reference`, `None` for anything else.
pub fn reply_status(frame: &PhoenixFrame, reference: &str) -> Option<Result<(), String>> {
    if frame.event != "phx_reply" || frame.reference.as_deref() != Some(reference) {
        return None;
    }
    match frame.payload.get("status").and_then(Value::as_str) {
        Some("ok") => Some(Ok(())),
        _ => {
            let reason = frame
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or("join rejected");
            Some(Err(reason.to_string()))
        }
    }
}

/// Decodes a `postgres_changes` payload.
pub fn change_event(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data").unwrap_or(payload);
    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .and_then(ChangeKind::parse)?;
    let table = data.get("table").and_then(Value::as_str)?.to_string();
    let as_row = |key: &str| {
        data.get(key)
            .and_then(Value::as_object)
            .filter(|row| !row.is_empty())
            .cloned()
    };
    Some(ChangeEvent {
        kind,
        table,
        new: as_row("record"),
        old: as_row("old_record"),
        commit_timestamp: data.get("commit_timestamp").and_then(parse_datetime),
    })
}

#[derive(Debug, Clone)]
pub struct RealtimeClient {
    socket_url: String,
    heartbeat: Duration,
    join_timeout: Duration,
}

impl RealtimeClient {
    pub fn new(base_url: &str, anon_key: &str, heartbeat: Duration, join_timeout: Duration) -> Self {
        Self {
            socket_url: socket_url(base_url, anon_key),
            heartbeat,
            join_timeout,
        }
    }

    pub async fn subscribe(
        &self,
        filter: ChangeFilter,
        access_token: &str,
    ) -> Result<Subscription, AppError> {
        let (socket, _) = tokio_tungstenite::connect_async(self.socket_url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let topic = format!(
            "realtime:public:{}:{}",
            filter.table,
            uuid::Uuid::new_v4().simple()
        );
        sink.send(join_frame(&topic, &filter, access_token).into_message()?)
            .await?;

        let joined = tokio::time::timeout(self.join_timeout, async {
            while let Some(message) = stream.next().await {
                let Message::Text(text) = message? else {
                    continue;
                };
                let Ok(frame) = serde_json::from_str::<PhoenixFrame>(text.as_str()) else {
                    continue;
                };
                if let Some(status) = reply_status(&frame, JOIN_REF) {
                    return status.map_err(AppError::Subscription);
                }
            }
            Err(AppError::Subscription("socket closed before join".into()))
        })
        .await
        .map_err(|_| AppError::Subscription(format!("join of {topic} timed out")))?;
        joined?;
        tracing::info!(%topic, table = %filter.table, "realtime channel joined");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let heartbeat_every = self.heartbeat;
        let channel_topic = topic.clone();

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(heartbeat_every);
            heartbeat.tick().await;
            let mut next_ref = 2u64;

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        if let Ok(leave) = leave_frame(&channel_topic, next_ref).into_message() {
                            let _ = sink.send(leave).await;
                        }
                        let _ = sink.close().await;
                        tracing::debug!(topic = %channel_topic, "realtime channel left");
                        break;
                    }
                    _ = heartbeat.tick() => {
                        let sent = match heartbeat_frame(next_ref).into_message() {
                            Ok(frame) => sink.send(frame).await.map_err(AppError::from),
                            Err(err) => Err(err),
                        };
                        next_ref += 1;
                        if let Err(err) = sent {
                            tracing::warn!(topic = %channel_topic, error = %err, "heartbeat failed");
                            break;
                        }
                    }
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            let frame = match serde_json::from_str::<PhoenixFrame>(text.as_str()) {
                                Ok(frame) => frame,
                                Err(err) => {
                                    tracing::warn!(error = %err, "unreadable realtime frame");
                                    continue;
                                }
                            };
                            if frame.topic != channel_topic {
                                continue;
                            }
                            match frame.event.as_str() {
                                "postgres_changes" => {
                                    let Some(event) = change_event(&frame.payload) else {
                                        tracing::warn!(topic = %channel_topic, "malformed change payload");
                                        continue;
                                    };
                                    if events_tx.send(event).is_err() {
                                        break;
                                    }
                                }
                                "phx_error" | "phx_close" => {
                                    tracing::warn!(topic = %channel_topic, event = %frame.event, "realtime channel closed by server");
                                    break;
                                }
                                _ => {}
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!(topic = %channel_topic, "realtime socket closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::warn!(topic = %channel_topic, error = %err, "realtime socket error");
                            break;
                        }
                    }
                }
            }
            // dropping events_tx ends the subscription's stream
        });

        Ok(Subscription::new(topic, events_rx, Some(cancel_tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::Filter;

    #[test]
    fn socket_url_switches_scheme() {
        assert_eq!(
            socket_url("https://demo.example.co/", "anon"),
            "wss://demo.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(
            socket_url("http://localhost:54321", "k"),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn join_frame_carries_scoped_filter() {
        let filter = ChangeFilter {
            table: "messages".into(),
            filter: Some(Filter::eq("conversation_id", "c1")),
        };
        let frame = join_frame("realtime:public:messages:x", &filter, "token");
        let encoded = serde_json::to_value(&frame).unwrap();

        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["payload"]["access_token"], "token");
        let change = &encoded["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "messages");
        assert_eq!(change["filter"], "conversation_id=eq.c1");
    }

    #[test]
    fn join_reply_is_recognised_by_ref() {
        let ok: PhoenixFrame = serde_json::from_value(json!({
            "topic": "realtime:t", "event": "phx_reply", "ref": "1",
            "payload": {"status": "ok", "response": {}}
        }))
        .unwrap();
        assert_eq!(reply_status(&ok, "1"), Some(Ok(())));
        assert_eq!(reply_status(&ok, "2"), None);

        let rejected: PhoenixFrame = serde_json::from_value(json!({
            "topic": "realtime:t", "event": "phx_reply", "ref": "1",
            "payload": {"status": "error", "response": {"reason": "invalid filter"}}
        }))
        .unwrap();
        assert_eq!(reply_status(&rejected, "1"), Some(Err("invalid filter".to_string())));
    }

    #[test]
    fn change_payload_decodes_rows() {
        let payload = json!({
            "ids": [1],
            "data": {
                "type": "DELETE",
                "schema": "public",
                "table": "post_comments",
                "record": {},
                "old_record": {"id": "c1"},
                "commit_timestamp": "2024-05-01T10:00:00Z",
            }
        });
        let event = change_event(&payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.table, "post_comments");
        assert!(event.new.is_none());
        assert_eq!(event.old.unwrap().get("id"), Some(&json!("c1")));
        assert!(event.commit_timestamp.is_some());

        assert!(change_event(&json!({"data": {"type": "TRUNCATE", "table": "t"}})).is_none());
    }

    #[test]
    fn heartbeat_goes_to_phoenix_topic() {
        let frame = heartbeat_frame(7);
        assert_eq!(frame.topic, "phoenix");
        assert_eq!(frame.reference.as_deref(), Some("7"));
        assert_eq!(leave_frame("realtime:t", 8).event, "phx_leave");
    }
}
