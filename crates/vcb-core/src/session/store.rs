use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    domain::{ChatId, UserId},
    session::state::{Session, SessionConfig},
};

/// Sessions are per chat *and* per user, so group chats do not share a wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat: ChatId,
    pub user: UserId,
}

/// Keyed in-memory session map with one lock per session.
///
/// Holding the guard returned by [`SessionStore::lock`] is what makes a
/// transition exclusive; the map lock itself is only held for the lookup.
pub struct SessionStore {
    defaults: SessionConfig,
    inner: Mutex<HashMap<SessionKey, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new(defaults: SessionConfig) -> Self {
        Self {
            defaults,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Lock (creating on first use) the session for `key`.
    pub async fn lock(&self, key: SessionKey) -> OwnedMutexGuard<Session> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(self.defaults.clone()))))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Forget the session for `key`, waiting for an in-flight transition first.
    pub async fn remove(&self, key: SessionKey) -> Option<Session> {
        let lock = self.inner.lock().await.remove(&key)?;
        let guard = lock.lock_owned().await;
        Some(guard.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> SessionStore {
        SessionStore::new(SessionConfig {
            contacts_per_output: 100,
            naming_template: "contacts1".to_string(),
            contact_label_prefix: "Contact".to_string(),
            contact_label_start: 1,
            bundle_zip: false,
        })
    }

    fn key(chat: i64, user: i64) -> SessionKey {
        SessionKey {
            chat: ChatId(chat),
            user: UserId(user),
        }
    }

    #[tokio::test]
    async fn sessions_are_created_lazily_per_chat_and_user() {
        let store = store();
        assert!(store.is_empty().await);
        {
            let mut s = store.lock(key(1, 1)).await;
            s.config.contacts_per_output = 5;
        }
        assert_eq!(store.lock(key(1, 1)).await.config.contacts_per_output, 5);
        assert_eq!(store.lock(key(1, 2)).await.config.contacts_per_output, 100);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn removed_sessions_start_over_from_defaults() {
        let store = store();
        store.lock(key(1, 1)).await.config.contacts_per_output = 5;

        let removed = store.remove(key(1, 1)).await.unwrap();
        assert_eq!(removed.config.contacts_per_output, 5);
        assert!(store.is_empty().await);
        assert!(store.remove(key(1, 1)).await.is_none());
        assert_eq!(store.lock(key(1, 1)).await.config.contacts_per_output, 100);
    }

    #[tokio::test]
    async fn second_locker_waits_for_the_first() {
        let store = Arc::new(store());
        let guard = store.lock(key(9, 9)).await;

        let s2 = store.clone();
        let waiter = tokio::spawn(async move {
            let mut s = s2.lock(key(9, 9)).await;
            s.config.contact_label_start += 1;
            s.config.contact_label_start
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        // Other sessions are not blocked.
        drop(store.lock(key(9, 10)).await);

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 2);
    }
}
