use std::sync::Arc;

use notification_hub::config::HubConfig;
use notification_hub::{global, Hub};
use serial_test::serial;

async fn start() -> Arc<Hub> {
    Arc::new(Hub::builder(HubConfig::default()).start().await.unwrap())
}

#[tokio::test]
#[serial]
async fn test_close_releases_global_slot() {
    let hub = start().await;
    global::install(hub.clone());
    assert!(global::get().is_some_and(|installed| Arc::ptr_eq(&installed, &hub)));

    hub.close().await.unwrap();
    assert!(global::get().is_none());

    // A fresh hub can take the slot
    let fresh = start().await;
    assert!(global::install(fresh.clone()).is_none());
    assert!(global::get().is_some_and(|installed| Arc::ptr_eq(&installed, &fresh)));

    fresh.close().await.unwrap();
    assert!(global::get().is_none());
}

#[tokio::test]
#[serial]
async fn test_closing_other_hub_keeps_installed_one() {
    let installed = start().await;
    let other = start().await;
    global::install(installed.clone());

    other.close().await.unwrap();
    assert!(global::get().is_some_and(|hub| Arc::ptr_eq(&hub, &installed)));

    installed.close().await.unwrap();
    assert!(global::get().is_none());
}
