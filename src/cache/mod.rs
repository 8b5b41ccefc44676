//! Content-addressed response cache
//!
//! Memoizes model responses keyed by a deterministic digest of the request
//! messages, consulted before any network call or token reservation. Shared
//! across tenants on purpose: identical content benefits from memoization
//! regardless of who asked, and keys derive purely from message text.
//!
//! The map is bounded (LRU) to cap memory growth over a long process life;
//! within capacity the functional contract is plain memoization.

use crate::model::Message;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

/// Stable hash over the full ordered message payload.
///
/// Messages are rendered in a canonical field order (role, then content)
/// with unambiguous separators, so semantically identical requests collide
/// no matter how their wire form ordered the fields.
pub fn request_hash(messages: &[Message]) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(b"role:");
        hasher.update(message.role.as_bytes());
        hasher.update([0x1f]);
        hasher.update(b"content:");
        hasher.update(message.content.as_bytes());
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}

/// Mutex-guarded LRU of raw model output keyed by [`request_hash`].
pub struct ResponseCache {
    entries: Mutex<LruCache<String, String>>,
}

impl ResponseCache {
    /// Create a cache holding up to `capacity` entries (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, hash: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(hash) {
            Some(value) => {
                metrics::counter!("pacer_cache_hits_total").increment(1);
                Some(value.clone())
            }
            None => {
                metrics::counter!("pacer_cache_misses_total").increment(1);
                None
            }
        }
    }

    pub async fn insert(&self, hash: String, value: String) {
        let mut entries = self.entries.lock().await;
        entries.put(hash, value);
        metrics::gauge!("pacer_cache_entries").set(entries.len() as f64);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    #[test]
    fn identical_payloads_hash_equal() {
        let a = vec![Message::system("be brief"), Message::user("hello")];
        let b = vec![Message::system("be brief"), Message::user("hello")];
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn field_ordering_in_wire_form_does_not_affect_hash() {
        // Same message, JSON keys in different order
        let a: Message =
            serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        let b: Message =
            serde_json::from_str(r#"{"content":"hello","role":"user"}"#).unwrap();
        assert_eq!(request_hash(&[a]), request_hash(&[b]));
    }

    #[test]
    fn message_order_affects_hash() {
        let a = vec![Message::user("one"), Message::user("two")];
        let b = vec![Message::user("two"), Message::user("one")];
        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn role_content_boundary_is_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = vec![Message::new("user", "abc"), Message::new("user", "")];
        let b = vec![Message::new("user", "ab"), Message::new("user", "c")];
        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[tokio::test]
    async fn get_after_insert_returns_value() {
        let cache = ResponseCache::new(16);
        let hash = request_hash(&[Message::user("hello")]);
        assert!(cache.get(&hash).await.is_none());

        cache.insert(hash.clone(), "cached answer".to_string()).await;
        assert_eq!(cache.get(&hash).await.unwrap(), "cached answer");
    }

    #[tokio::test]
    async fn capacity_is_bounded_with_lru_eviction() {
        let cache = ResponseCache::new(2);
        cache.insert("a".to_string(), "1".to_string()).await;
        cache.insert("b".to_string(), "2".to_string()).await;
        // Touch "a" so "b" is the eviction candidate
        assert!(cache.get("a").await.is_some());
        cache.insert("c".to_string(), "3".to_string()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
    }
}
