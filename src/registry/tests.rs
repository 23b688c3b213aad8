//! Session registry tests

use std::thread;

use pretty_assertions::assert_eq;

use super::*;

fn registry() -> (SessionRegistry, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    (SessionRegistry::new(metrics.clone()), metrics)
}

fn topics(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

#[test]
fn test_enter_is_idempotent() {
    let (registry, metrics) = registry();

    assert!(registry.enter("c1", "alice"));
    assert!(!registry.enter("c1", "alice"));

    assert_eq!(registry.len(), 1);
    assert_eq!(metrics.sessions_current.get(), 1);
}

#[test]
fn test_duplicate_enter_keeps_first_session() {
    let (registry, _) = registry();

    registry.enter("c1", "alice");
    registry.publish("c1", "t");
    registry.enter("c1", "mallory");

    let session = registry.get("c1").unwrap();
    assert_eq!(session.username, "alice");
    assert_eq!(session.publications.get("t"), Some(&1));
}

#[test]
fn test_leave_unknown_does_not_touch_gauge() {
    let (registry, metrics) = registry();
    registry.enter("c1", "alice");

    assert!(!registry.leave("ghost"));
    assert_eq!(metrics.sessions_current.get(), 1);

    assert!(registry.leave("c1"));
    assert!(!registry.leave("c1"));
    assert_eq!(metrics.sessions_current.get(), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_subscribe_deduplicates_but_counts_attempts() {
    let (registry, metrics) = registry();
    registry.enter("c1", "alice");

    registry.subscribe("c1", &topics(&["a/#", "b/+"]));
    registry.subscribe("c1", &topics(&["a/#"]));
    registry.subscribe("c1", &topics(&["c", "a/#"]));

    let session = registry.get("c1").unwrap();
    assert_eq!(session.subscriptions, topics(&["a/#", "b/+", "c"]));
    assert_eq!(metrics.subscribe_total.with_label_values(&["a/#"]).get(), 3);
    assert_eq!(metrics.subscribe_total.with_label_values(&["c"]).get(), 1);
}

#[test]
fn test_publish_counts_per_topic() {
    let (registry, metrics) = registry();
    registry.enter("c1", "alice");

    for _ in 0..5 {
        registry.publish("c1", "sensors/temp");
    }
    registry.publish("c1", "sensors/hum");

    let session = registry.get("c1").unwrap();
    assert_eq!(session.publications.get("sensors/temp"), Some(&5));
    assert_eq!(session.publications.get("sensors/hum"), Some(&1));
    assert_eq!(
        metrics
            .publish_total
            .with_label_values(&["sensors/temp"])
            .get(),
        5
    );
}

#[test]
fn test_unknown_client_is_ignored() {
    let (registry, metrics) = registry();

    registry.subscribe("ghost", &topics(&["a"]));
    registry.publish("ghost", "a");

    assert!(registry.export().is_empty());
    assert_eq!(metrics.subscribe_total.with_label_values(&["a"]).get(), 0);
    assert_eq!(metrics.publish_total.with_label_values(&["a"]).get(), 0);
}

#[test]
fn test_activity_updates_last_activity() {
    let (registry, _) = registry();
    registry.enter("c1", "alice");
    let before = registry.get("c1").unwrap();

    thread::sleep(std::time::Duration::from_millis(5));
    registry.publish("c1", "t");

    let after = registry.get("c1").unwrap();
    assert_eq!(after.connected_at, before.connected_at);
    assert!(after.last_activity_at > before.last_activity_at);
}

#[test]
fn test_export_reflects_only_connected_clients() {
    let (registry, _) = registry();

    registry.enter("c2", "bob");
    registry.enter("c1", "alice");
    registry.enter("c3", "carol");
    registry.subscribe("c1", &topics(&["x/#"]));
    registry.publish("c1", "x/1");
    registry.publish("c1", "x/1");
    registry.publish("c3", "y");
    registry.leave("c3");

    let exported = registry.export();
    let ids: Vec<&str> = exported.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);

    let alice = &exported[0];
    assert_eq!(alice.username, "alice");
    assert_eq!(alice.subscriptions, topics(&["x/#"]));
    assert_eq!(
        alice.publications,
        BTreeMap::from([("x/1".to_string(), 2)])
    );

    let bob = &exported[1];
    assert!(bob.subscriptions.is_empty());
    assert!(bob.publications.is_empty());
}

#[test]
fn test_export_json_shape() {
    let (registry, _) = registry();
    registry.enter("c1", "alice");
    registry.subscribe("c1", &topics(&["a"]));
    registry.publish("c1", "a");

    let json: serde_json::Value = serde_json::from_slice(&registry.export_json().unwrap()).unwrap();
    let entry = &json[0];

    assert_eq!(entry["id"], "c1");
    assert_eq!(entry["username"], "alice");
    assert_eq!(entry["subscriptions"], serde_json::json!(["a"]));
    assert_eq!(entry["publications"], serde_json::json!({"a": 1}));
    assert!(entry["connected_at"].is_string());
    assert!(entry["last_activity_at"].is_string());
}

#[test]
fn test_concurrent_mutation() {
    let (registry, metrics) = registry();
    let registry = Arc::new(registry);
    let threads = 8;
    let publishes = 250;

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let registry = registry.clone();
            thread::spawn(move || {
                let own = format!("c{}", i);
                registry.enter(&own, "user");
                registry.enter("shared", "user");
                for _ in 0..publishes {
                    registry.publish(&own, "t");
                    registry.publish("shared", "t");
                }
                registry.subscribe("shared", &[format!("s/{}", i % 2)]);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), threads + 1);
    assert_eq!(metrics.sessions_current.get(), (threads + 1) as i64);

    let shared = registry.get("shared").unwrap();
    assert_eq!(
        shared.publications.get("t"),
        Some(&((threads * publishes) as u64))
    );
    assert_eq!(shared.subscriptions.len(), 2);

    for i in 0..threads {
        let own = registry.get(&format!("c{}", i)).unwrap();
        assert_eq!(own.publications.get("t"), Some(&(publishes as u64)));
    }
}
