//! In-memory registration database
//!
//! Maps registration keys to the set of producers asserting them, plus the
//! per-producer metadata captured at IDENTIFY time. Structural mutations take
//! the write lock; lookups copy their snapshot out under the read lock so
//! callers iterate without holding it. Heartbeat and tombstone timestamps are
//! atomics, so the PING hot path never contends with lookups.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use swarmq_common::EPHEMERAL_SUFFIX;

/// Wall-clock unix nanoseconds, the unit of every producer timestamp.
pub fn unix_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// A single assertion about a producer. Three shapes exist:
/// `("client", "", "")` for the producer itself, `("topic", <topic>, "")`,
/// and `("channel", <topic>, <channel>)`. Empty fields are literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration {
    pub category: String,
    pub key: String,
    pub subkey: String,
}

impl Registration {
    pub fn new(
        category: impl Into<String>,
        key: impl Into<String>,
        subkey: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            subkey: subkey.into(),
        }
    }

    /// Wildcard match: `"*"` on key or subkey means any value; the category
    /// is always exact.
    fn is_match(&self, category: &str, key: &str, subkey: &str) -> bool {
        self.category == category
            && (key == "*" || self.key == key)
            && (subkey == "*" || self.subkey == subkey)
    }

    /// Ephemeral names are deleted once their producer set empties.
    pub fn is_ephemeral(&self) -> bool {
        match self.category.as_str() {
            "topic" => self.key.ends_with(EPHEMERAL_SUFFIX),
            "channel" => self.subkey.ends_with(EPHEMERAL_SUFFIX),
            _ => false,
        }
    }
}

/// Peer metadata captured at IDENTIFY time. One record exists per connection
/// and is shared, via `Arc`, by every registration referencing the producer.
///
/// Deserialization accepts the IDENTIFY JSON body; every field defaults so
/// the command handler can report missing required fields itself. `id` and
/// the timestamps never travel over the wire.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub remote_address: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub broadcast_address: String,
    #[serde(default)]
    pub tcp_port: u16,
    #[serde(default)]
    pub http_port: u16,
    #[serde(default)]
    pub version: String,
    #[serde(skip)]
    last_update: AtomicI64,
    #[serde(skip)]
    tombstoned_at: AtomicI64,
}

impl PeerInfo {
    /// Nanosecond timestamp of the last successful PING or IDENTIFY.
    /// Zero means never updated.
    pub fn last_update(&self) -> i64 {
        self.last_update.load(Ordering::SeqCst)
    }

    /// Record a heartbeat.
    pub fn touch(&self, now: i64) {
        self.last_update.store(now, Ordering::SeqCst);
    }

    /// Nanosecond timestamp of the tombstone. Zero means not tombstoned.
    pub fn tombstoned_at(&self) -> i64 {
        self.tombstoned_at.load(Ordering::SeqCst)
    }

    /// Hide this producer from lookups until `tombstone_lifetime` past `now`.
    pub fn tombstone(&self, now: i64) {
        self.tombstoned_at.store(now, Ordering::SeqCst);
    }
}

/// A producer entry in a registration's producer set.
#[derive(Debug, Clone)]
pub struct Producer {
    pub peer_info: Arc<PeerInfo>,
}

impl Producer {
    pub fn new(peer_info: Arc<PeerInfo>) -> Self {
        Self { peer_info }
    }

    /// The identity the admin surface addresses: `broadcast_address:http_port`.
    pub fn node_address(&self) -> String {
        format!(
            "{}:{}",
            self.peer_info.broadcast_address, self.peer_info.http_port
        )
    }

    /// Active means a heartbeat within `inactivity_timeout` of `now` and any
    /// tombstone already expired.
    pub fn is_active(
        &self,
        now: i64,
        inactivity_timeout: Duration,
        tombstone_lifetime: Duration,
    ) -> bool {
        let last = self.peer_info.last_update();
        if now - last >= inactivity_timeout.as_nanos() as i64 {
            return false;
        }
        !self.is_tombstoned(now, tombstone_lifetime)
    }

    /// An expired tombstone is ignored; the record itself is kept.
    pub fn is_tombstoned(&self, now: i64, lifetime: Duration) -> bool {
        let tombstoned_at = self.peer_info.tombstoned_at();
        tombstoned_at != 0 && now - tombstoned_at < lifetime.as_nanos() as i64
    }
}

impl Serialize for Producer {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.peer_info.serialize(serializer)
    }
}

type ProducerMap = HashMap<String, Producer>;

/// The shared registration database.
#[derive(Debug, Default)]
pub struct RegistrationDb {
    registration_map: RwLock<HashMap<Registration, ProducerMap>>,
}

impl RegistrationDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration key, with an empty producer set if new.
    pub fn add_registration(&self, key: Registration) {
        self.registration_map.write().entry(key).or_default();
    }

    /// Insert `producer` under `key`, creating the key if absent. Returns
    /// true when the producer was not already present.
    pub fn add_producer(&self, key: Registration, producer: Producer) -> bool {
        let mut map = self.registration_map.write();
        let producers = map.entry(key).or_default();
        match producers.entry(producer.peer_info.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(producer);
                true
            }
        }
    }

    /// Remove the producer with `id` from `key`'s set. Returns whether a
    /// removal happened and how many producers remain under the key.
    pub fn remove_producer(&self, key: &Registration, id: &str) -> (bool, usize) {
        let mut map = self.registration_map.write();
        let Some(producers) = map.get_mut(key) else {
            return (false, 0);
        };
        let removed = producers.remove(id).is_some();
        (removed, producers.len())
    }

    /// Delete the key and its entire producer set.
    pub fn remove_registration(&self, key: &Registration) {
        self.registration_map.write().remove(key);
    }

    fn need_filter(key: &str, subkey: &str) -> bool {
        key == "*" || subkey == "*"
    }

    /// Every stored key matching the query.
    pub fn find_registrations(&self, category: &str, key: &str, subkey: &str) -> Vec<Registration> {
        let map = self.registration_map.read();
        if !Self::need_filter(key, subkey) {
            let k = Registration::new(category, key, subkey);
            if map.contains_key(&k) {
                return vec![k];
            }
            return Vec::new();
        }
        map.keys()
            .filter(|k| k.is_match(category, key, subkey))
            .cloned()
            .collect()
    }

    /// Union of the producer sets of every matching key, deduplicated by
    /// producer id. A producer typically appears under several keys.
    pub fn find_producers(&self, category: &str, key: &str, subkey: &str) -> Vec<Producer> {
        let map = self.registration_map.read();
        if !Self::need_filter(key, subkey) {
            let k = Registration::new(category, key, subkey);
            return map
                .get(&k)
                .map(|producers| producers.values().cloned().collect())
                .unwrap_or_default();
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for (k, producers) in map.iter() {
            if !k.is_match(category, key, subkey) {
                continue;
            }
            for (id, producer) in producers {
                if seen.insert(id.clone()) {
                    results.push(producer.clone());
                }
            }
        }
        results
    }

    /// Every key whose producer set contains `id`. Disconnect cleanup walks
    /// this list.
    pub fn lookup_registrations(&self, id: &str) -> Vec<Registration> {
        self.registration_map
            .read()
            .iter()
            .filter(|(_, producers)| producers.contains_key(id))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Record a heartbeat for the producer with `id`. All of the producer's
    /// entries share one peer record, so a single store covers them.
    pub fn touch_producer(&self, id: &str, now: i64) {
        let map = self.registration_map.read();
        for producers in map.values() {
            if let Some(producer) = producers.get(id) {
                producer.peer_info.touch(now);
                return;
            }
        }
    }

    /// Tombstone the producer advertised as `node` under this topic's
    /// registration. Unknown topics and producers are a no-op.
    pub fn tombstone_topic_producer(&self, topic: &str, node: &str, now: i64) {
        for producer in self.find_producers("topic", topic, "") {
            if producer.node_address() == node {
                producer.peer_info.tombstone(now);
            }
        }
    }

    /// Keep only producers with a recent heartbeat and no live tombstone.
    pub fn filter_by_active(
        producers: Vec<Producer>,
        inactivity_timeout: Duration,
        tombstone_lifetime: Duration,
    ) -> Vec<Producer> {
        let now = unix_nanos();
        producers
            .into_iter()
            .filter(|p| p.is_active(now, inactivity_timeout, tombstone_lifetime))
            .collect()
    }
}
