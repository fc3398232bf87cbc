//! Shared fixtures for unit tests.

use docctl_objects::MemoryObjectStore;
use docctl_registry::MemoryDatabase;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::Engine;

/// Engine over empty in-memory stores where `root` holds the `admin` role.
pub(crate) async fn admin_engine() -> Engine {
    admin_engine_with_objects().await.0
}

/// Like [`admin_engine`], also returning a handle on the object store.
pub(crate) async fn admin_engine_with_objects() -> (Engine, MemoryObjectStore) {
    let objects = MemoryObjectStore::new();
    let engine = Engine::start(
        EngineConfig::default(),
        Arc::new(MemoryDatabase::new()),
        Arc::new(objects.clone()),
    )
    .await
    .unwrap();
    engine.bootstrap_admin("admin", &["root"]).await.unwrap();
    (engine, objects)
}
