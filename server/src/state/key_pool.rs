use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::PipelineError;

#[derive(Debug, Default)]
struct KeyPoolInner {
    keys: Vec<String>,
    // Always in [0, keys.len()) while keys is non-empty
    cursor: usize,
}

impl KeyPoolInner {
    fn next(&mut self) -> Option<String> {
        let key = self.keys.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.keys.len();
        Some(key)
    }
}

/// Round-robin dispenser of API credentials.
///
/// Clones share the same rotation, so every run and the retry path draw from
/// one cursor. The cursor lives in memory only and restarts at the first key
/// whenever the process starts or the pool is reconfigured.
#[derive(Debug, Clone, Default)]
pub struct KeyPool {
    inner: Arc<Mutex<KeyPoolInner>>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let pool = Self::default();
        pool.configure(keys);
        pool
    }

    fn lock(&self) -> MutexGuard<'_, KeyPoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the pool wholesale. Blank entries are dropped.
    pub fn configure(&self, keys: Vec<String>) {
        let keys = clean_keys(keys);
        let mut inner = self.lock();
        inner.keys = keys;
        inner.cursor = 0;
    }

    /// Like [`KeyPool::configure`], but refuses to leave the pool empty.
    pub fn configure_required(&self, keys: Vec<String>) -> Result<(), PipelineError> {
        let keys = clean_keys(keys);
        if keys.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one API key is required".to_string(),
            ));
        }
        let mut inner = self.lock();
        inner.keys = keys;
        inner.cursor = 0;
        Ok(())
    }

    /// Hand out the key under the cursor and advance it. `None` when empty.
    pub fn next_key(&self) -> Option<String> {
        self.lock().next()
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    pub fn masked_keys(&self) -> Vec<String> {
        self.lock().keys.iter().map(|k| mask_key(k)).collect()
    }
}

fn clean_keys(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Show only the first four characters of a credential.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let pool = KeyPool::default();
        assert!(pool.is_empty());
        assert_eq!(pool.next_key(), None);
    }

    #[test]
    fn test_strict_round_robin() {
        let pool = KeyPool::new(keys(&["k1", "k2", "k3"]));
        let picked: Vec<_> = (0..7).filter_map(|_| pool.next_key()).collect();
        assert_eq!(picked, keys(&["k1", "k2", "k3", "k1", "k2", "k3", "k1"]));
    }

    #[test]
    fn test_fair_distribution_over_many_calls() {
        let pool = KeyPool::new(keys(&["a", "b", "c", "d"]));
        let n = 103;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..n {
            *counts.entry(pool.next_key().unwrap()).or_default() += 1;
        }

        for count in counts.values() {
            assert!(*count == n / 4 || *count == n.div_ceil(4));
        }
        assert_eq!(counts.values().sum::<usize>(), n);
    }

    #[test]
    fn test_configure_resets_cursor_and_drops_blanks() {
        let pool = KeyPool::new(keys(&["k1", "k2"]));
        pool.next_key();

        pool.configure(keys(&[" x ", "", "  ", "y"]));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.next_key().as_deref(), Some("x"));
        assert_eq!(pool.next_key().as_deref(), Some("y"));
    }

    #[test]
    fn test_configure_required_rejects_empty() {
        let pool = KeyPool::new(keys(&["k1"]));
        let err = pool.configure_required(keys(&["", " "])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        // Previous configuration is untouched
        assert_eq!(pool.next_key().as_deref(), Some("k1"));
    }

    #[test]
    fn test_clones_share_rotation() {
        let pool = KeyPool::new(keys(&["k1", "k2"]));
        let other = pool.clone();
        assert_eq!(pool.next_key().as_deref(), Some("k1"));
        assert_eq!(other.next_key().as_deref(), Some("k2"));
    }

    #[test]
    fn test_concurrent_dispatch_keeps_balance() {
        let pool = KeyPool::new(keys(&["k1", "k2", "k3"]));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || (0..50).filter_map(|_| pool.next_key()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                *counts.entry(key).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|c| *c == 100));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("AIzaSyD-secret"), "AIza…");
        assert_eq!(mask_key("ab"), "ab…");
    }

    #[test]
    fn test_masked_keys() {
        let pool = KeyPool::new(keys(&["sk-123456", "sk-abcdef"]));
        assert_eq!(pool.masked_keys(), keys(&["sk-1…", "sk-a…"]));
    }
}
