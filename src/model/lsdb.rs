use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::model::lsa::LinkStatePacket;

// Cloning shares the underlying table; all operations, including the
// background aging tick, serialize under one lock.
#[derive(Clone)]
pub struct Lsdb {
    inner: Arc<Mutex<HashMap<u32, LinkStatePacket>>>,
}

impl Default for Lsdb {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Lsdb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: u32, lsa: LinkStatePacket) {
        self.inner
            .lock()
            .expect("lsdb lock poisoned")
            .insert(key, lsa);
    }

    pub fn get(&self, key: u32) -> Option<LinkStatePacket> {
        self.inner.lock().expect("lsdb lock poisoned").get(&key).cloned()
    }

    pub fn remove(&self, key: u32) {
        self.inner.lock().expect("lsdb lock poisoned").remove(&key);
    }

    pub fn snapshot(&self) -> HashMap<u32, LinkStatePacket> {
        self.inner.lock().expect("lsdb lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lsdb lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().expect("lsdb lock poisoned").clear();
    }

    fn tick(&self) -> Vec<u32> {
        let mut guard = self.inner.lock().expect("lsdb lock poisoned");
        let expired: Vec<u32> = guard
            .iter()
            .filter_map(|(key, lsa)| (lsa.ttl == 0).then_some(*key))
            .collect();
        for key in &expired {
            guard.remove(key);
        }
        for lsa in guard.values_mut() {
            lsa.ttl = lsa.ttl.saturating_sub(1);
        }
        expired
    }

    pub fn spawn_aging_thread(&self, cancel: Arc<std::sync::atomic::AtomicBool>) {
        let lsdb = self.clone();
        thread::spawn(move || {
            use std::sync::atomic::Ordering;
            while !cancel.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(1));
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let expired = lsdb.tick();
                for key in expired {
                    debug!(link_state_id = key, "lsdb entry aged out");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lsa::LinkStatePacket;

    #[test]
    fn add_then_get_returns_same_lsa() {
        let lsdb = Lsdb::new();
        let lsa = LinkStatePacket::new(1, 1, vec![], 60);
        lsdb.add(1, lsa.clone());
        assert_eq!(lsdb.get(1), Some(lsa));
    }

    #[test]
    fn tick_decrements_and_evicts_at_zero() {
        let lsdb = Lsdb::new();
        lsdb.add(1, LinkStatePacket::new(1, 1, vec![], 1));
        lsdb.add(2, LinkStatePacket::new(2, 1, vec![], 0));

        let expired = lsdb.tick();
        assert_eq!(expired, vec![2]);
        assert_eq!(lsdb.get(1).unwrap().ttl, 0);
        assert_eq!(lsdb.get(2), None);

        let expired = lsdb.tick();
        assert_eq!(expired, vec![1]);
        assert_eq!(lsdb.get(1), None);
    }

    #[test]
    fn remove_of_absent_key_is_a_no_op() {
        let lsdb = Lsdb::new();
        lsdb.remove(42);
        assert!(lsdb.is_empty());
    }

    #[test]
    fn snapshot_is_independent_of_later_mutation() {
        let lsdb = Lsdb::new();
        lsdb.add(1, LinkStatePacket::new(1, 1, vec![], 60));
        let snap = lsdb.snapshot();
        lsdb.remove(1);
        assert_eq!(snap.len(), 1);
        assert!(lsdb.is_empty());
    }
}
