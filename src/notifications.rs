//! In-process fan-out of attendance changes to server-sent-event clients.

use std::convert::Infallible;

use actix_web::web::Bytes;
use futures::Stream;
use futures::stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceEvent {
    pub kind: ChangeKind,
    pub attendance_id: u64,
    pub sub_warehouse_id: Option<u64>,
    pub user_id: u64,
}

#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<AttendanceEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the event; zero is not an error.
    pub fn publish(&self, event: AttendanceEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.sender.subscribe()
    }

    /// SSE frames for one client. Lagging clients skip the missed events and
    /// keep streaming; the stream ends when the hub is dropped.
    pub fn sse_stream(&self) -> impl Stream<Item = Result<Bytes, Infallible>> + 'static {
        let connected = stream::once(async { Ok::<_, Infallible>(Bytes::from_static(b": connected\n\n")) });

        let events = stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((Ok(sse_frame(&event)), rx)),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "SSE client lagged behind");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Notification channel closed");
                        return None;
                    }
                }
            }
        });

        futures::StreamExt::chain(connected, events)
    }
}

fn sse_frame(event: &AttendanceEvent) -> Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("event: attendance\ndata: {}\n\n", payload))
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn event(id: u64) -> AttendanceEvent {
        AttendanceEvent {
            kind: ChangeKind::Updated,
            attendance_id: id,
            sub_warehouse_id: Some(4),
            user_id: 1,
        }
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let hub = NotificationHub::new(4);
        assert_eq!(hub.publish(event(1)), 0);
    }

    #[actix_web::test]
    async fn subscribers_get_sse_frames() {
        let hub = NotificationHub::new(4);
        let mut frames = Box::pin(hub.sse_stream());

        let hello = frames.next().await.unwrap().unwrap();
        assert_eq!(&hello[..], b": connected\n\n");

        assert_eq!(hub.publish(event(9)), 1);
        let frame = frames.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: attendance\ndata: "));
        assert!(text.contains("\"attendance_id\":9"));
        assert!(text.contains("\"kind\":\"updated\""));
    }
}
