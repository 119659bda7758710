use std::collections::{HashMap, VecDeque};

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::state::{Attachment, ChatMessage, SenderRole, Tx};

pub const HISTORY_CAP: usize = 200;
pub const REPLAY_DEPTH: usize = 50;
pub const MAX_ATTACHMENT_TOTAL: u64 = 10 * 1024 * 1024;
const FANOUT_CAPACITY: usize = 256;

/// An inbound submission before the hub has stamped it.
pub struct Draft {
    pub id: Option<String>,
    pub room: String,
    pub sender: SenderRole,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Reject {
    #[error("room is required")]
    EmptyRoom,
    #[error("message needs text or attachments")]
    EmptyBody,
    #[error("attachments exceed the 10 MiB ceiling")]
    Oversized,
}

#[derive(Default)]
struct Inner {
    rooms:   HashMap<String, Tx>,
    history: HashMap<String, VecDeque<ChatMessage>>,
}

/// Per-room fan-out plus bounded history, shared by every transport.
///
/// One lock guards both maps: concurrent accepts for a room serialize, and
/// `subscribe` takes its history snapshot and its receiver under the same
/// critical section, so a message shows up either in the replay or on the
/// live channel, never both and never neither.
#[derive(Default)]
pub struct ChatHub {
    inner: Mutex<Inner>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, stamp and broadcast a submission. Timestamps are always
    /// server-assigned; a caller-supplied id is honored when present.
    pub async fn accept(&self, draft: Draft) -> Result<ChatMessage, Reject> {
        let room = normalize_room(&draft.room);
        if room.is_empty() {
            return Err(Reject::EmptyRoom);
        }
        if draft.text.trim().is_empty() && draft.attachments.is_empty() {
            return Err(Reject::EmptyBody);
        }
        let declared: u64 = draft.attachments.iter().map(|a| a.size).sum();
        if declared > MAX_ATTACHMENT_TOTAL {
            return Err(Reject::Oversized);
        }

        let msg = ChatMessage {
            id: draft.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            room: room.clone(),
            sender: draft.sender,
            text: draft.text,
            timestamp: chrono::Utc::now(),
            attachments: draft.attachments,
        };

        let mut inner = self.inner.lock().await;
        let log = inner.history.entry(room.clone()).or_default();
        log.push_back(msg.clone());
        if log.len() > HISTORY_CAP {
            log.pop_front();
        }
        if let Some(tx) = inner.rooms.get(&room) {
            // send only errors when no receiver is left; that is fine
            let _ = tx.send(msg.clone());
        }
        Ok(msg)
    }

    /// Register a live subscriber, returning the receiver together with the
    /// replay tail (most recent [`REPLAY_DEPTH`] entries, oldest first).
    pub async fn subscribe(&self, room: &str) -> (broadcast::Receiver<ChatMessage>, Vec<ChatMessage>) {
        let room = normalize_room(room);
        let mut inner = self.inner.lock().await;
        let replay = tail_of(inner.history.get(&room), REPLAY_DEPTH);
        let tx = inner
            .rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(FANOUT_CAPACITY).0);
        (tx.subscribe(), replay)
    }

    /// Most recent `n` history entries for a room, in append order.
    pub async fn tail(&self, room: &str, n: usize) -> Vec<ChatMessage> {
        let room = normalize_room(room);
        let inner = self.inner.lock().await;
        tail_of(inner.history.get(&room), n)
    }

    /// Drop a room's fan-out channel once its last subscriber is gone.
    /// History stays so late joiners still get a replay.
    pub async fn prune(&self, room: &str) {
        let room = normalize_room(room);
        let mut inner = self.inner.lock().await;
        if inner.rooms.get(&room).is_some_and(|tx| tx.receiver_count() == 0) {
            inner.rooms.remove(&room);
            debug!(%room, "dropped idle room");
        }
    }
}

pub fn normalize_room(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn tail_of(log: Option<&VecDeque<ChatMessage>>, n: usize) -> Vec<ChatMessage> {
    match log {
        Some(log) => log.iter().skip(log.len().saturating_sub(n)).cloned().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(room: &str, text: &str) -> Draft {
        Draft {
            id: None,
            room: room.into(),
            sender: SenderRole::Alumno,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    fn attachment(size: u64) -> Attachment {
        Attachment {
            id: "a1".into(),
            name: "notas.pdf".into(),
            mime: "application/pdf".into(),
            size,
            data: String::new(),
        }
    }

    #[tokio::test]
    async fn delivers_in_accept_order() {
        let hub = ChatHub::new();
        let (mut rx, replay) = hub.subscribe("alpha").await;
        assert!(replay.is_empty());

        hub.accept(draft("alpha", "first")).await.unwrap();
        hub.accept(draft("alpha", "second")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().text, "first");
        assert_eq!(rx.recv().await.unwrap().text, "second");

        let (_rx2, replay) = hub.subscribe("alpha").await;
        let texts: Vec<_> = replay.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn replay_is_capped_at_fifty() {
        let hub = ChatHub::new();
        for i in 0..60 {
            hub.accept(draft("alpha", &format!("m{i}"))).await.unwrap();
        }

        let (_rx, replay) = hub.subscribe("alpha").await;
        assert_eq!(replay.len(), REPLAY_DEPTH);
        assert_eq!(replay.first().unwrap().text, "m10");
        assert_eq!(replay.last().unwrap().text, "m59");
    }

    #[tokio::test]
    async fn history_is_capped_at_two_hundred() {
        let hub = ChatHub::new();
        for i in 0..230 {
            hub.accept(draft("alpha", &format!("m{i}"))).await.unwrap();
        }

        let log = hub.tail("alpha", usize::MAX).await;
        assert_eq!(log.len(), HISTORY_CAP);
        assert_eq!(log.first().unwrap().text, "m30");
        assert_eq!(log.last().unwrap().text, "m229");
    }

    #[tokio::test]
    async fn rejects_invalid_drafts() {
        let hub = ChatHub::new();
        let (mut rx, _) = hub.subscribe("alpha").await;

        assert_eq!(hub.accept(draft("  ", "hello")).await.unwrap_err(), Reject::EmptyRoom);
        assert_eq!(hub.accept(draft("alpha", "   ")).await.unwrap_err(), Reject::EmptyBody);

        assert!(hub.tail("alpha", usize::MAX).await.is_empty());
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn enforces_attachment_ceiling() {
        let hub = ChatHub::new();

        let mut over = draft("alpha", "");
        over.attachments = vec![attachment(11 * 1024 * 1024)];
        assert_eq!(hub.accept(over).await.unwrap_err(), Reject::Oversized);
        assert!(hub.tail("alpha", usize::MAX).await.is_empty());

        let mut at_limit = draft("alpha", "");
        at_limit.attachments = vec![attachment(MAX_ATTACHMENT_TOTAL)];
        assert!(hub.accept(at_limit).await.is_ok());
        assert_eq!(hub.tail("alpha", usize::MAX).await.len(), 1);
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = ChatHub::new();
        let (mut beta_rx, _) = hub.subscribe("beta").await;

        hub.accept(draft("alpha", "hello alpha")).await.unwrap();

        assert!(matches!(beta_rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
        assert!(hub.tail("beta", usize::MAX).await.is_empty());
        let (_rx, replay) = hub.subscribe("beta").await;
        assert!(replay.is_empty());
    }

    #[tokio::test]
    async fn disconnect_deregisters_sink() {
        let hub = ChatHub::new();
        let (rx, _) = hub.subscribe("alpha").await;
        drop(rx);
        hub.prune("alpha").await;

        hub.accept(draft("alpha", "after disconnect")).await.unwrap();

        // the new subscriber sees the message only through replay
        let (mut rx2, replay) = hub.subscribe("alpha").await;
        assert_eq!(replay.len(), 1);
        assert!(matches!(rx2.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn room_lookup_is_case_insensitive() {
        let hub = ChatHub::new();
        let (mut rx, _) = hub.subscribe("ALU-001").await;

        hub.accept(draft(" alu-001 ", "hola")).await.unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.room, "alu-001");
        assert_eq!(got.text, "hola");
    }

    #[tokio::test]
    async fn honors_caller_supplied_id() {
        let hub = ChatHub::new();
        let mut d = draft("alpha", "hi");
        d.id = Some("client-42".into());
        assert_eq!(hub.accept(d).await.unwrap().id, "client-42");
    }
}
