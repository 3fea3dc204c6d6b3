use chat_core::types::Message;
use serde::Serialize;

/// Every frame the hub ever pushes down a socket. Internally tagged so the
/// wire shape is a flat `{"type": "...", ...fields}` object (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected {
        conversation_id: String,
        user_id: String,
        org_id: String,
    },
    UserJoined {
        user_id: String,
        connection_count: usize,
    },
    UserLeft {
        user_id: String,
        connection_count: usize,
    },
    UserTyping {
        user_id: String,
    },
    NewMessage {
        message: Message,
    },
    MessageUpdated {
        message: Message,
    },
    MessageDeleted {
        message_id: String,
    },
    ServerShutdown {
        message: String,
    },
    Pong,
}

impl WsEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("WsEvent serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_wire_shape_includes_org_id() {
        let event = WsEvent::Connected {
            conversation_id: "c1".to_string(),
            user_id: "u1".to_string(),
            org_id: "o1".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["conversation_id"], "c1");
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["org_id"], "o1");
    }
}
