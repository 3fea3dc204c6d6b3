use std::sync::Arc;

use chat_core::types::Message;
use chat_hub::{SocketHub, WsEvent};
use chat_store::MessageStore;
use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::sanitize::{sanitize, MAX_CONTENT_LEN};

/// Enforces the message lifecycle, its tenant-isolation invariants, and the
/// broadcast side effects that follow a write (§4.5). Callers have already
/// cleared permission checks in the routing layer; the engine only enforces
/// ownership/tenancy invariants that depend on the message itself.
pub struct MessageEngine {
    store: Arc<MessageStore>,
    hub: Arc<SocketHub>,
}

impl MessageEngine {
    pub fn new(store: Arc<MessageStore>, hub: Arc<SocketHub>) -> Self {
        Self { store, hub }
    }

    #[instrument(skip(self, content), fields(org_id, conversation_id, sender_id))]
    pub async fn create(
        &self,
        conversation_id: &str,
        org_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message> {
        let content = validate_content(content)?;
        let now = Utc::now().to_rfc3339();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content,
            created_at: now.clone(),
            updated_at: now,
            is_deleted: false,
        };
        self.store.insert(&message)?;
        self.hub
            .broadcast(conversation_id, &WsEvent::NewMessage { message: message.clone() })
            .await;
        Ok(message)
    }

    #[instrument(skip(self))]
    pub fn list(
        &self,
        conversation_id: &str,
        org_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Message>, u64)> {
        Ok(self.store.paginate(org_id, conversation_id, page, page_size)?)
    }

    #[instrument(skip(self, new_content))]
    pub async fn update(
        &self,
        message_id: &str,
        conversation_id: &str,
        org_id: &str,
        user_id: &str,
        new_content: &str,
    ) -> Result<Message> {
        let mut message = self.load_for_mutation(message_id, conversation_id, org_id)?;
        if message.sender_id != user_id {
            return Err(EngineError::Forbidden);
        }

        message.content = validate_content(new_content)?;
        message.updated_at = Utc::now().to_rfc3339();
        self.store.save(&message)?;
        self.hub
            .broadcast(
                conversation_id,
                &WsEvent::MessageUpdated { message: message.clone() },
            )
            .await;
        Ok(message)
    }

    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        message_id: &str,
        conversation_id: &str,
        org_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<()> {
        let mut message = self.load_for_mutation(message_id, conversation_id, org_id)?;
        if !is_admin && message.sender_id != user_id {
            return Err(EngineError::Forbidden);
        }

        message.is_deleted = true;
        message.updated_at = Utc::now().to_rfc3339();
        self.store.save(&message)?;
        self.hub
            .broadcast(
                conversation_id,
                &WsEvent::MessageDeleted { message_id: message.id.clone() },
            )
            .await;
        Ok(())
    }

    /// Steps 1-3 of the update/delete precondition ladder (§4.5): existence,
    /// then conversation match (NotFound on mismatch — existence in another
    /// conversation is never revealed), then org match (Forbidden, audited).
    fn load_for_mutation(&self, message_id: &str, conversation_id: &str, org_id: &str) -> Result<Message> {
        let message = self.store.get(message_id)?.ok_or(EngineError::NotFound)?;
        if message.conversation_id != conversation_id {
            return Err(EngineError::NotFound);
        }
        if message.org_id != org_id {
            warn!(
                message_id,
                expected_org = org_id,
                actual_org = message.org_id.as_str(),
                "cross-tenant mutation attempt"
            );
            return Err(EngineError::Forbidden);
        }
        Ok(message)
    }
}

fn validate_content(raw: &str) -> Result<String> {
    let sanitized = sanitize(raw);
    if sanitized.is_empty() {
        return Err(EngineError::Validation("content must not be empty".to_string()));
    }
    if sanitized.chars().count() > MAX_CONTENT_LEN {
        return Err(EngineError::Validation(format!(
            "content exceeds {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_store::db::init_db;
    use rusqlite::Connection;

    fn engine() -> MessageEngine {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        MessageEngine::new(Arc::new(MessageStore::new(conn)), Arc::new(SocketHub::new()))
    }

    #[tokio::test]
    async fn create_persists_and_sanitizes() {
        let engine = engine();
        let msg = engine
            .create("c1", "o1", "u1", "<script>x</script>hi")
            .await
            .unwrap();
        assert_eq!(msg.content, "xhi");
        assert_eq!(msg.org_id, "o1");
        assert!(!msg.is_deleted);
    }

    #[tokio::test]
    async fn create_rejects_empty_content() {
        let engine = engine();
        let err = engine.create("c1", "o1", "u1", "   <br>  ").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn update_by_owner_succeeds() {
        let engine = engine();
        let msg = engine.create("c1", "o1", "u1", "hi").await.unwrap();
        let updated = engine
            .update(&msg.id, "c1", "o1", "u1", "bye")
            .await
            .unwrap();
        assert_eq!(updated.content, "bye");
    }

    #[tokio::test]
    async fn update_by_non_owner_is_forbidden() {
        let engine = engine();
        let msg = engine.create("c1", "o1", "u1", "hi").await.unwrap();
        let err = engine.update(&msg.id, "c1", "o1", "u2", "bye").await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden));
    }

    #[tokio::test]
    async fn update_with_wrong_conversation_is_not_found() {
        let engine = engine();
        let msg = engine.create("c1", "o1", "u1", "hi").await.unwrap();
        let err = engine
            .update(&msg.id, "c-other", "o1", "u1", "bye")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn update_with_wrong_org_is_forbidden_not_not_found() {
        let engine = engine();
        let msg = engine.create("c1", "o1", "u1", "hi").await.unwrap();
        let err = engine
            .update(&msg.id, "c1", "o-other", "u1", "bye")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden));
    }

    #[tokio::test]
    async fn delete_is_soft_and_excluded_from_list() {
        let engine = engine();
        let msg = engine.create("c1", "o1", "u1", "hi").await.unwrap();
        engine
            .delete(&msg.id, "c1", "o1", "u1", false)
            .await
            .unwrap();

        let (page, total) = engine.list("c1", "o1", 1, 10).unwrap();
        assert_eq!(total, 0);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn delete_by_non_owner_requires_admin() {
        let engine = engine();
        let msg = engine.create("c1", "o1", "u1", "hi").await.unwrap();
        let err = engine
            .delete(&msg.id, "c1", "o1", "u2", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden));

        engine
            .delete(&msg.id, "c1", "o1", "u2", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn content_limit_counts_characters_not_bytes() {
        let engine = engine();
        // Each "é" is 2 bytes but 1 char; well under the char limit even
        // though its byte length would exceed MAX_CONTENT_LEN.
        let content = "é".repeat(MAX_CONTENT_LEN);
        assert!(content.len() > MAX_CONTENT_LEN);
        let msg = engine.create("c1", "o1", "u1", &content).await.unwrap();
        assert_eq!(msg.content.chars().count(), MAX_CONTENT_LEN);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_tenant_scoped() {
        let engine = engine();
        engine.create("c1", "o1", "u1", "first").await.unwrap();
        engine.create("c1", "o1", "u1", "second").await.unwrap();
        engine.create("c1", "o2", "u1", "other tenant").await.unwrap();

        let (page, total) = engine.list("c1", "o1", 1, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page[0].content, "second");
        assert_eq!(page[1].content, "first");
    }
}
