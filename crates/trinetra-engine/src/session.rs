use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use trinetra_contracts::events::{payload, EventLog};
use uuid::Uuid;

use crate::backend::Content;
use crate::error::SessionError;
use crate::record_event;

/// Remote conversational context for one session key.
///
/// The model and behavior instruction are fixed at creation. The history holds every
/// completed exchange and is sent with each new message, which is what gives the remote
/// model its memory of the conversation.
#[derive(Debug)]
pub struct ConversationSession {
    id: String,
    key: String,
    model: String,
    system_instruction: String,
    history: Mutex<Vec<Content>>,
}

impl ConversationSession {
    fn new(key: &str, model: &str, system_instruction: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            model: model.to_string(),
            system_instruction: system_instruction.to_string(),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Snapshot of the completed exchanges, oldest first.
    pub fn history(&self) -> Vec<Content> {
        self.lock_history().clone()
    }

    /// Number of completed user/model exchanges.
    pub fn turns(&self) -> usize {
        self.lock_history().len() / 2
    }

    pub(crate) fn record_exchange(&self, user: Content, reply: Content) {
        let mut history = self.lock_history();
        history.push(user);
        history.push(reply);
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<Content>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session handles keyed by session key, owned by the application context.
///
/// Every operation takes the store lock, so two callers racing on the first
/// `get_or_create` for a key always end up holding the same handle.
#[derive(Debug)]
pub struct SessionStore {
    chat_model: String,
    events: EventLog,
    sessions: Mutex<BTreeMap<String, Arc<ConversationSession>>>,
}

impl SessionStore {
    pub fn new(chat_model: impl Into<String>, events: EventLog) -> Self {
        Self {
            chat_model: chat_model.into(),
            events,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the existing handle for `key`, creating it with `system_instruction` when
    /// absent. The instruction is ignored once the key exists.
    pub fn get_or_create(&self, key: &str, system_instruction: &str) -> Arc<ConversationSession> {
        let mut sessions = self.lock_sessions();
        if let Some(existing) = sessions.get(key) {
            return Arc::clone(existing);
        }
        let session = self.build(key, system_instruction, "session_created");
        sessions.insert(key.to_string(), Arc::clone(&session));
        session
    }

    pub fn create(
        &self,
        key: &str,
        system_instruction: &str,
    ) -> Result<Arc<ConversationSession>, SessionError> {
        let mut sessions = self.lock_sessions();
        if sessions.contains_key(key) {
            return Err(SessionError::AlreadyExists(key.to_string()));
        }
        let session = self.build(key, system_instruction, "session_created");
        sessions.insert(key.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, key: &str) -> Option<Arc<ConversationSession>> {
        self.lock_sessions().get(key).cloned()
    }

    /// Installs a fresh session for `key`. The previous handle's conversation context is
    /// discarded; callers still holding it keep a detached session.
    pub fn replace(&self, key: &str, system_instruction: &str) -> Arc<ConversationSession> {
        let mut sessions = self.lock_sessions();
        let session = self.build(key, system_instruction, "session_replaced");
        sessions.insert(key.to_string(), Arc::clone(&session));
        session
    }

    pub fn evict(&self, key: &str) -> Option<Arc<ConversationSession>> {
        let removed = self.lock_sessions().remove(key);
        if let Some(session) = removed.as_ref() {
            record_event(
                &self.events,
                "session_evicted",
                payload(json!({
                    "key": key,
                    "session_id": session.id(),
                    "turns": session.turns(),
                })),
            );
        }
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_sessions().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_sessions().is_empty()
    }

    fn build(
        &self,
        key: &str,
        system_instruction: &str,
        event_type: &str,
    ) -> Arc<ConversationSession> {
        let session = Arc::new(ConversationSession::new(
            key,
            &self.chat_model,
            system_instruction,
        ));
        record_event(
            &self.events,
            event_type,
            payload(json!({
                "key": key,
                "session_id": session.id(),
                "model": session.model(),
            })),
        );
        session
    }

    fn lock_sessions(&self) -> MutexGuard<'_, BTreeMap<String, Arc<ConversationSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::backend::Part;

    use super::*;

    fn store() -> SessionStore {
        SessionStore::new("gemini-2.5-pro", EventLog::disabled("test"))
    }

    #[test]
    fn same_key_returns_identical_handle_and_keeps_first_instruction() {
        let store = store();
        let first = store.get_or_create("chat", "Be kind.");
        let second = store.get_or_create("chat", "Be terse.");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.system_instruction(), "Be kind.");
        assert_eq!(second.model(), "gemini-2.5-pro");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_handles() {
        let store = store();
        let chat = store.get_or_create("chat", "a");
        let code = store.get_or_create("vibecoding", "b");

        assert!(!Arc::ptr_eq(&chat, &code));
        assert_ne!(chat.id(), code.id());
        assert_eq!(store.keys(), vec!["chat".to_string(), "vibecoding".to_string()]);
    }

    #[test]
    fn replace_discards_previous_context() {
        let store = store();
        let original = store.get_or_create("chat", "old");
        original.record_exchange(
            Content::user(vec![Part::text("hi")]),
            Content::model(vec![Part::text("hello")]),
        );
        assert_eq!(original.turns(), 1);

        let replaced = store.replace("chat", "new");
        assert!(!Arc::ptr_eq(&original, &replaced));
        assert_eq!(replaced.system_instruction(), "new");
        assert_eq!(replaced.turns(), 0);

        let fetched = store.get_or_create("chat", "ignored");
        assert!(Arc::ptr_eq(&fetched, &replaced));
    }

    #[test]
    fn create_refuses_existing_key_and_evict_removes_it() {
        let store = store();
        let created = store.create("chat", "a").unwrap();
        assert!(matches!(
            store.create("chat", "b"),
            Err(SessionError::AlreadyExists(key)) if key == "chat"
        ));

        let evicted = store.evict("chat").unwrap();
        assert!(Arc::ptr_eq(&created, &evicted));
        assert!(store.get("chat").is_none());
        assert!(store.is_empty());
        assert!(store.evict("chat").is_none());
    }

    #[test]
    fn concurrent_first_use_yields_one_handle() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create("chat", &format!("instruction {idx}")))
            })
            .collect();
        let sessions: Vec<Arc<ConversationSession>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_lifecycle_is_logged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let store = SessionStore::new("gemini-2.5-pro", EventLog::new(&path, "run"));

        store.get_or_create("chat", "a");
        store.get_or_create("chat", "a");
        store.replace("chat", "b");
        store.evict("chat");

        let types: Vec<String> = std::fs::read_to_string(&path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec!["session_created", "session_replaced", "session_evicted"]
        );
        Ok(())
    }
}
