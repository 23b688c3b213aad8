//! Hooks module tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

struct PassThrough;

#[async_trait]
impl Hooks for PassThrough {}

#[derive(Default)]
struct CountingHooks {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

#[async_trait]
impl Hooks for CountingHooks {
    async fn on_connect_authenticate(
        &self,
        _client_id: &str,
        username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> bool {
        self.connects.fetch_add(1, Ordering::SeqCst);
        username == Some("allowed")
    }

    async fn on_disconnect(&self, _client_id: &str, _error: Option<&str>, _will_expire: bool) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_default_methods_allow_all() {
    let hooks = PassThrough;

    assert!(
        hooks
            .on_connect_authenticate("client1", Some("user"), Some(b"pass"))
            .await
    );
    assert!(hooks.on_acl_check("client1", "a/b", true).await);
    assert!(hooks.on_acl_check("client1", "a/b", false).await);

    let payload = Bytes::from_static(b"hello");
    let out = hooks
        .on_publish("client1", "a/b", payload.clone())
        .await
        .unwrap();
    assert_eq!(out, payload);
}

#[tokio::test]
async fn test_arc_wrapper_delegates() {
    let inner = Arc::new(CountingHooks::default());
    let hooks: Arc<dyn Hooks> = inner.clone();

    assert!(
        hooks
            .on_connect_authenticate("c1", Some("allowed"), None)
            .await
    );
    assert!(!hooks.on_connect_authenticate("c2", Some("other"), None).await);
    hooks.on_disconnect("c1", None, true).await;

    assert_eq!(inner.connects.load(Ordering::SeqCst), 2);
    assert_eq!(inner.disconnects.load(Ordering::SeqCst), 1);
}

struct SizeLimit(usize);

#[async_trait]
impl Hooks for SizeLimit {
    async fn on_publish(&self, _client_id: &str, _topic: &str, payload: Bytes) -> HookResult<Bytes> {
        if payload.len() > self.0 {
            return Err(HookError::Rejected(format!("{} bytes", payload.len())));
        }
        Ok(payload)
    }
}

#[tokio::test]
async fn test_rejection_propagates_through_arc() {
    let hooks: Arc<dyn Hooks> = Arc::new(SizeLimit(4));

    let small = Bytes::from_static(b"ok");
    assert_eq!(hooks.on_publish("c1", "t", small.clone()).await.unwrap(), small);

    let err = hooks
        .on_publish("c1", "t", Bytes::from_static(b"too large"))
        .await
        .unwrap_err();
    assert!(matches!(err, HookError::Rejected(ref msg) if msg == "9 bytes"));
}

#[test]
fn test_hook_error_display() {
    let rejected = HookError::Rejected("payload too large".to_string());
    assert_eq!(format!("{}", rejected), "Rejected: payload too large");
}
