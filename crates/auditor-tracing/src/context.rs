//! Ambient key/value context consulted by [`TracingSink`](crate::TracingSink)
//! for fields an event leaves empty.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

/// Context key holding the acting user.
pub const ACTOR_KEY: &str = "actor";
/// Context key holding the session identifier.
pub const SESSION_KEY: &str = "session";
/// Context key holding the origin address.
pub const ORIGIN_KEY: &str = "origin";

/// Read-only view of diagnostic context values.
pub trait AmbientContext: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// A context with no values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl AmbientContext for NoContext {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Context shared by everything holding a reference to it.
#[derive(Debug, Default)]
pub struct StaticContext {
    values: RwLock<HashMap<String, String>>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.write().remove(key)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AmbientContext for StaticContext {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

tokio::task_local! {
    static TASK_VALUES: HashMap<String, String>;
}

/// Context scoped to the current Tokio task, installed with [`scope`].
///
/// Outside a scope every lookup returns `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext;

impl AmbientContext for TaskContext {
    fn get(&self, key: &str) -> Option<String> {
        TASK_VALUES
            .try_with(|values| values.get(key).cloned())
            .ok()
            .flatten()
    }
}

/// Run `future` with `values` visible through [`TaskContext`].
pub async fn scope<F>(values: HashMap<String, String>, future: F) -> F::Output
where
    F: Future,
{
    TASK_VALUES.scope(values, future).await
}
