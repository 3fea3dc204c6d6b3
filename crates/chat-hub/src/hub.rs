use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::WsEvent;

/// Depth of each connection's outbound queue. A slow reader backpressures
/// the sender instead of the hub buffering unboundedly.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// What a connection's write-side task is told to do. `Close` is how
/// [`SocketHub::shutdown_all`] reaches sockets the hub itself cannot touch
/// directly (it only ever holds the sending half of the channel).
#[derive(Debug, Clone)]
pub enum HubMessage {
    Event(String),
    Close { code: u16, reason: String },
}

struct Member {
    user_id: String,
    sender: mpsc::Sender<HubMessage>,
}

#[derive(Default)]
struct ConversationEntry {
    members: DashMap<String, Member>,
}

/// Per-conversation connection registry and fanout point (§4.6). Membership
/// lives entirely in memory — a restart drops every connection, which is
/// consistent with clients being expected to reconnect and re-authorize.
#[derive(Default)]
pub struct SocketHub {
    conversations: DashMap<String, ConversationEntry>,
}

impl SocketHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a conversation's set and tell its current peers
    /// someone joined. The `connected` event addressed to the new connection
    /// itself is the caller's responsibility (send it directly over
    /// `sender`) since it is never broadcast.
    pub async fn register(
        &self,
        conversation_id: &str,
        connection_id: &str,
        user_id: &str,
        sender: mpsc::Sender<HubMessage>,
    ) {
        let count = {
            let entry = self
                .conversations
                .entry(conversation_id.to_string())
                .or_default();
            entry.members.insert(
                connection_id.to_string(),
                Member {
                    user_id: user_id.to_string(),
                    sender,
                },
            );
            entry.members.len()
        };

        info!(conversation_id, connection_id, count, "connection registered");
        self.broadcast_filtered(
            conversation_id,
            &WsEvent::UserJoined {
                user_id: user_id.to_string(),
                connection_count: count,
            },
            Some(connection_id),
        )
        .await;
    }

    /// Remove a connection and tell the remaining peers it left. A no-op if
    /// the connection was already gone (double deregistration is harmless).
    pub async fn deregister(&self, conversation_id: &str, connection_id: &str, reason: &str) {
        let removed = {
            let Some(entry) = self.conversations.get(conversation_id) else {
                return;
            };
            let Some((_, member)) = entry.members.remove(connection_id) else {
                return;
            };
            let count = entry.members.len();
            let empty = entry.members.is_empty();
            (member, count, empty)
        };
        let (member, count, empty) = removed;

        info!(conversation_id, connection_id, reason, "connection deregistered");
        if empty {
            self.conversations.remove(conversation_id);
        } else {
            self.broadcast(
                conversation_id,
                &WsEvent::UserLeft {
                    user_id: member.user_id,
                    connection_count: count,
                },
            )
            .await;
        }
    }

    /// Single-target send. A failed delivery means the connection's task
    /// has already gone away, so it is deregistered with reason `send_error`.
    pub async fn send_to(&self, conversation_id: &str, connection_id: &str, event: &WsEvent) {
        let sender = self.conversations.get(conversation_id).and_then(|entry| {
            entry
                .members
                .get(connection_id)
                .map(|m| m.sender.clone())
        });
        let Some(sender) = sender else {
            return;
        };
        if sender
            .send(HubMessage::Event(event.to_json()))
            .await
            .is_err()
        {
            self.deregister(conversation_id, connection_id, "send_error")
                .await;
        }
    }

    /// Fan a single event out to every member of a conversation concurrently.
    /// Sends are dispatched together via `join_all`, not awaited one at a
    /// time, so one slow or dead connection cannot delay the others.
    /// Members whose send fails are deregistered with reason `broadcast_error`.
    pub async fn broadcast(&self, conversation_id: &str, event: &WsEvent) {
        self.broadcast_filtered(conversation_id, event, None).await;
    }

    async fn broadcast_filtered(&self, conversation_id: &str, event: &WsEvent, exclude: Option<&str>) {
        let targets: Vec<(String, mpsc::Sender<HubMessage>)> = {
            let Some(entry) = self.conversations.get(conversation_id) else {
                return;
            };
            entry
                .members
                .iter()
                .filter(|m| Some(m.key().as_str()) != exclude)
                .map(|m| (m.key().clone(), m.value().sender.clone()))
                .collect()
        };

        if targets.is_empty() {
            return;
        }
        let payload = event.to_json();
        let sends = targets.iter().map(|(id, sender)| {
            let payload = payload.clone();
            let sender = sender.clone();
            let id = id.clone();
            async move {
                match sender.send(HubMessage::Event(payload)).await {
                    Ok(()) => None,
                    Err(_) => Some(id),
                }
            }
        });
        let failures: Vec<String> = join_all(sends).await.into_iter().flatten().collect();

        for id in failures {
            // `deregister` can itself broadcast (user_left), which re-enters
            // this function — box the call to break the resulting
            // self-referential future type.
            Box::pin(self.deregister(conversation_id, &id, "broadcast_error")).await;
        }
    }

    /// Tell every still-registered connection in every conversation the
    /// server is going away, then drop all bookkeeping. The actual socket
    /// close is performed by each connection's task upon receiving
    /// [`HubMessage::Close`].
    pub async fn shutdown_all(&self, message: &str) {
        let event = WsEvent::ServerShutdown {
            message: message.to_string(),
        };
        let payload = event.to_json();

        let all_members: Vec<mpsc::Sender<HubMessage>> = self
            .conversations
            .iter()
            .flat_map(|entry| {
                entry
                    .members
                    .iter()
                    .map(|m| m.value().sender.clone())
                    .collect::<Vec<_>>()
            })
            .collect();

        let closes = all_members.into_iter().map(|sender| {
            let payload = payload.clone();
            async move {
                let _ = sender.send(HubMessage::Event(payload)).await;
                let _ = sender
                    .send(HubMessage::Close {
                        code: 1001,
                        reason: "going away".to_string(),
                    })
                    .await;
            }
        });
        join_all(closes).await;

        let count = self.conversations.len();
        self.conversations.clear();
        warn!(conversations = count, "socket hub shut down");
    }

    pub fn connection_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .get(conversation_id)
            .map(|e| e.members.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<HubMessage>, mpsc::Receiver<HubMessage>) {
        mpsc::channel(OUTBOUND_CHANNEL_CAPACITY)
    }

    #[tokio::test]
    async fn register_notifies_existing_peers_but_not_the_newcomer() {
        let hub = SocketHub::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        hub.register("c1", "conn1", "u1", tx1).await;
        hub.register("c1", "conn2", "u2", tx2).await;

        // conn1 (existing peer) hears about conn2 joining.
        let msg = rx1.recv().await.unwrap();
        match msg {
            HubMessage::Event(json) => assert!(json.contains("user_joined") && json.contains("u2")),
            _ => panic!("expected event"),
        }
        // conn2 (the newcomer) gets nothing from the hub itself.
        assert!(rx2.try_recv().is_err());
        assert_eq!(hub.connection_count("c1"), 2);
    }

    #[tokio::test]
    async fn deregister_notifies_remaining_peers_with_updated_count() {
        let hub = SocketHub::new();
        let (tx1, mut rx1) = channel();
        let (tx2, _rx2) = channel();
        hub.register("c1", "conn1", "u1", tx1).await;
        hub.register("c1", "conn2", "u2", tx2).await;
        rx1.recv().await.unwrap(); // drain the user_joined notice

        hub.deregister("c1", "conn2", "client_closed").await;

        let msg = rx1.recv().await.unwrap();
        match msg {
            HubMessage::Event(json) => assert!(json.contains("user_left") && json.contains("\"connection_count\":1")),
            _ => panic!("expected event"),
        }
        assert_eq!(hub.connection_count("c1"), 1);
    }

    #[tokio::test]
    async fn deregistering_the_last_member_drops_the_conversation_entry() {
        let hub = SocketHub::new();
        let (tx1, _rx1) = channel();
        hub.register("c1", "conn1", "u1", tx1).await;
        hub.deregister("c1", "conn1", "client_closed").await;
        assert_eq!(hub.connection_count("c1"), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let hub = SocketHub::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        hub.register("c1", "conn1", "u1", tx1).await;
        hub.register("c1", "conn2", "u2", tx2).await;
        rx1.recv().await.unwrap(); // user_joined from conn2's registration

        hub.broadcast(
            "c1",
            &WsEvent::UserTyping {
                user_id: "u1".to_string(),
            },
        )
        .await;

        assert!(matches!(rx1.recv().await, Some(HubMessage::Event(_))));
        assert!(matches!(rx2.recv().await, Some(HubMessage::Event(_))));
    }

    #[tokio::test]
    async fn broadcast_drops_members_whose_receiver_is_gone() {
        let hub = SocketHub::new();
        let (tx1, rx1) = channel();
        drop(rx1); // simulate a connection whose task already exited
        hub.register("c1", "conn1", "u1", tx1).await;

        hub.broadcast(
            "c1",
            &WsEvent::UserTyping {
                user_id: "someone".to_string(),
            },
        )
        .await;

        assert_eq!(hub.connection_count("c1"), 0);
    }

    #[tokio::test]
    async fn shutdown_all_closes_every_connection_and_clears_state() {
        let hub = SocketHub::new();
        let (tx1, mut rx1) = channel();
        hub.register("c1", "conn1", "u1", tx1).await;

        hub.shutdown_all("maintenance").await;

        assert!(matches!(rx1.recv().await, Some(HubMessage::Event(_))));
        assert!(matches!(
            rx1.recv().await,
            Some(HubMessage::Close { code: 1001, .. })
        ));
        assert_eq!(hub.connection_count("c1"), 0);
    }
}
