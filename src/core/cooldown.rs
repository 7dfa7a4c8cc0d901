// src/core/cooldown.rs
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

/// Last-alert timestamps per key. One registry per monitor; never shared.
pub struct CooldownRegistry<K> {
    last_alert: Mutex<HashMap<K, DateTime<Utc>>>,
}

impl<K> Default for CooldownRegistry<K> {
    fn default() -> Self {
        Self {
            last_alert: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> CooldownRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `key` never alerted or its last alert is at least `min_interval` old.
    pub fn is_cooled_down(&self, key: &K, now: DateTime<Utc>, min_interval: Duration) -> bool {
        match self.last_alert.lock().get(key) {
            Some(last) => now - *last >= min_interval,
            None => true,
        }
    }

    pub fn record_alert(&self, key: &K, now: DateTime<Utc>) {
        self.last_alert.lock().insert(key.clone(), now);
    }

    /// Check-and-record in one step. Returns whether the alert may fire.
    pub fn try_acquire(&self, key: &K, now: DateTime<Utc>, min_interval: Duration) -> bool {
        let mut map = self.last_alert.lock();
        let ready = match map.get(key) {
            Some(last) => now - *last >= min_interval,
            None => true,
        };
        if ready {
            map.insert(key.clone(), now);
        }
        ready
    }

    /// Keys that have alerted at least once.
    pub fn len(&self) -> usize {
        self.last_alert.lock().len()
    }
}
