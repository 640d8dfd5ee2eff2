//! Registration database behavior

use std::sync::Arc;
use std::time::Duration;

use swarmq_directory::registration::{
    unix_nanos, PeerInfo, Producer, Registration, RegistrationDb,
};

fn peer(id: &str) -> Arc<PeerInfo> {
    let mut info = PeerInfo::default();
    info.id = id.to_string();
    info.remote_address = id.to_string();
    info.hostname = "test-host".to_string();
    info.broadcast_address = "host.example".to_string();
    info.tcp_port = 4150;
    info.http_port = 4151;
    info.version = "1.0".to_string();
    Arc::new(info)
}

#[test]
fn test_add_producer_visibility() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49001");

    let key = Registration::new("topic", "orders", "");
    assert!(db.add_producer(key.clone(), Producer::new(p.clone())));
    // a second add of the same producer id is a no-op
    assert!(!db.add_producer(key.clone(), Producer::new(p.clone())));

    let producers = db.find_producers("topic", "orders", "");
    assert_eq!(producers.len(), 1);
    assert_eq!(producers[0].peer_info.id, "127.0.0.1:49001");

    let (removed, left) = db.remove_producer(&key, &p.id);
    assert!(removed);
    assert_eq!(left, 0);
    assert!(db.find_producers("topic", "orders", "").is_empty());

    // removing again reports nothing removed
    let (removed, _) = db.remove_producer(&key, &p.id);
    assert!(!removed);
}

#[test]
fn test_empty_set_is_still_a_registration() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49002");
    let key = Registration::new("channel", "orders", "payments");

    db.add_producer(key.clone(), Producer::new(p.clone()));
    db.remove_producer(&key, &p.id);

    // the key survives its producer set emptying
    assert_eq!(db.find_registrations("channel", "orders", "payments").len(), 1);
    assert!(db.find_producers("channel", "orders", "payments").is_empty());

    db.remove_registration(&key);
    assert!(db.find_registrations("channel", "orders", "payments").is_empty());
}

#[test]
fn test_add_registration_without_producers() {
    let db = RegistrationDb::new();
    db.add_registration(Registration::new("topic", "orders", ""));

    assert_eq!(db.find_registrations("topic", "orders", "").len(), 1);
    assert!(db.find_producers("topic", "orders", "").is_empty());
}

#[test]
fn test_find_producers_dedups_by_id() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49003");

    db.add_producer(
        Registration::new("channel", "orders", "payments"),
        Producer::new(p.clone()),
    );
    db.add_producer(
        Registration::new("channel", "orders", "refunds"),
        Producer::new(p.clone()),
    );

    let producers = db.find_producers("channel", "orders", "*");
    assert_eq!(producers.len(), 1);
}

#[test]
fn test_find_registrations_wildcards() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49004");

    db.add_producer(Registration::new("topic", "orders", ""), Producer::new(p.clone()));
    db.add_producer(
        Registration::new("channel", "orders", "payments"),
        Producer::new(p.clone()),
    );
    db.add_producer(
        Registration::new("channel", "invoices", "payments"),
        Producer::new(p.clone()),
    );

    let mut subkeys: Vec<String> = db
        .find_registrations("channel", "orders", "*")
        .into_iter()
        .map(|r| r.subkey)
        .collect();
    subkeys.sort();
    assert_eq!(subkeys, ["payments"]);

    let mut keys: Vec<String> = db
        .find_registrations("channel", "*", "payments")
        .into_iter()
        .map(|r| r.key)
        .collect();
    keys.sort();
    assert_eq!(keys, ["invoices", "orders"]);

    // the category never wildcards
    assert!(db.find_registrations("topic", "orders", "payments").is_empty());
}

#[test]
fn test_lookup_registrations_is_exact() {
    let db = RegistrationDb::new();
    let p1 = peer("127.0.0.1:49005");
    let p2 = peer("127.0.0.1:49006");

    db.add_producer(Registration::new("client", "", ""), Producer::new(p1.clone()));
    db.add_producer(Registration::new("topic", "orders", ""), Producer::new(p1.clone()));
    db.add_producer(Registration::new("topic", "invoices", ""), Producer::new(p2.clone()));

    let mut found: Vec<(String, String)> = db
        .lookup_registrations(&p1.id)
        .into_iter()
        .map(|r| (r.category, r.key))
        .collect();
    found.sort();
    assert_eq!(
        found,
        [
            ("client".to_string(), "".to_string()),
            ("topic".to_string(), "orders".to_string()),
        ]
    );

    assert_eq!(db.lookup_registrations(&p2.id).len(), 1);
    assert!(db.lookup_registrations("127.0.0.1:59999").is_empty());
}

#[test]
fn test_touch_producer_updates_heartbeat() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49007");
    db.add_producer(Registration::new("client", "", ""), Producer::new(p.clone()));

    assert_eq!(p.last_update(), 0);
    let now = unix_nanos();
    db.touch_producer(&p.id, now);
    assert_eq!(p.last_update(), now);
}

#[test]
fn test_filter_by_active_excludes_stale() {
    let db = RegistrationDb::new();
    let fresh = peer("127.0.0.1:49008");
    let stale = peer("127.0.0.1:49009");
    let never = peer("127.0.0.1:49010");

    let key = Registration::new("topic", "orders", "");
    db.add_producer(key.clone(), Producer::new(fresh.clone()));
    db.add_producer(key.clone(), Producer::new(stale.clone()));
    db.add_producer(key.clone(), Producer::new(never.clone()));

    let now = unix_nanos();
    fresh.touch(now);
    stale.touch(now - Duration::from_secs(301).as_nanos() as i64);
    // `never` keeps last_update == 0 and is never active

    let active = RegistrationDb::filter_by_active(
        db.find_producers("topic", "orders", ""),
        Duration::from_secs(300),
        Duration::from_secs(45),
    );
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].peer_info.id, fresh.id);
}

#[test]
fn test_tombstone_masks_until_expiry() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49011");
    db.add_producer(Registration::new("topic", "orders", ""), Producer::new(p.clone()));

    let now = unix_nanos();
    p.touch(now);

    let node = format!("{}:{}", p.broadcast_address, p.http_port);
    db.tombstone_topic_producer("orders", &node, now);

    let inactivity = Duration::from_secs(300);
    let lifetime = Duration::from_secs(45);

    // masked immediately after the tombstone is set
    let active = RegistrationDb::filter_by_active(
        db.find_producers("topic", "orders", ""),
        inactivity,
        lifetime,
    );
    assert!(active.is_empty());

    // visible again once the tombstone has aged out; the record is intact
    p.tombstone(now - Duration::from_secs(46).as_nanos() as i64);
    let active = RegistrationDb::filter_by_active(
        db.find_producers("topic", "orders", ""),
        inactivity,
        lifetime,
    );
    assert_eq!(active.len(), 1);
}

#[test]
fn test_tombstone_unknown_producer_is_noop() {
    let db = RegistrationDb::new();
    let p = peer("127.0.0.1:49012");
    db.add_producer(Registration::new("topic", "orders", ""), Producer::new(p.clone()));
    p.touch(unix_nanos());

    db.tombstone_topic_producer("orders", "other.example:9999", unix_nanos());
    db.tombstone_topic_producer("missing-topic", "host.example:4151", unix_nanos());

    assert_eq!(p.tombstoned_at(), 0);
}

#[test]
fn test_remove_producer_reports_remaining() {
    let db = RegistrationDb::new();
    let p1 = peer("127.0.0.1:49013");
    let p2 = peer("127.0.0.1:49014");
    let key = Registration::new("topic", "orders", "");

    db.add_producer(key.clone(), Producer::new(p1.clone()));
    db.add_producer(key.clone(), Producer::new(p2.clone()));

    let (removed, left) = db.remove_producer(&key, &p1.id);
    assert!(removed);
    assert_eq!(left, 1);
}
