//! In-process realtime record store.
//!
//! The whole tree lives behind a `tokio::sync::watch` channel: each write
//! publishes a new root and every live query re-resolves its own location,
//! emitting only when its result changed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use log::debug;
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use super::{DbPath, Query, RecordStore, Snapshot, SnapshotStream, StoreError};

pub struct MemoryStore {
    tree: watch::Sender<Arc<Value>>,
    keys: Mutex<PushKeys>,
    denied: Mutex<Vec<DbPath>>,
}

/// Last issued push-key time, so keys stay ordered within one millisecond.
#[derive(Default)]
struct PushKeys {
    last_millis: i64,
    counter: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tree, _) = watch::channel(Arc::new(Value::Object(Map::new())));
        Self {
            tree,
            keys: Mutex::new(PushKeys::default()),
            denied: Mutex::new(Vec::new()),
        }
    }

    /// Rejects every later write at or below `prefix`, the way the hosted
    /// store's security rules would.
    pub fn deny_writes(&self, prefix: &DbPath) {
        if let Ok(mut denied) = self.denied.lock() {
            denied.push(prefix.clone());
        }
    }

    fn check_writable(&self, path: &DbPath) -> Result<(), StoreError> {
        let denied = self
            .denied
            .lock()
            .map_err(|_| StoreError::Unavailable("rules lock poisoned".into()))?;
        if denied.iter().any(|prefix| path.starts_with(prefix)) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn write(&self, path: &DbPath, value: Value) {
        self.tree.send_modify(|root| {
            let root = Arc::make_mut(root);
            write_at(root, path.segments(), value);
            prune(root);
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, path: &DbPath) -> Result<Snapshot, StoreError> {
        let root = self.tree.borrow().clone();
        Ok(Snapshot::new(path.clone(), read_at(&root, path.segments()).cloned()))
    }

    async fn set(&self, path: &DbPath, value: Value) -> Result<(), StoreError> {
        self.check_writable(path)?;
        self.write(path, value);
        Ok(())
    }

    async fn update(&self, path: &DbPath, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check_writable(path)?;
        let children = fields
            .into_iter()
            .map(|(key, value)| path.child(&key).map(|child| (child, value)))
            .collect::<Result<Vec<_>, _>>()?;
        self.tree.send_modify(|root| {
            let root = Arc::make_mut(root);
            for (child, value) in children {
                write_at(root, child.segments(), value);
            }
            prune(root);
        });
        Ok(())
    }

    async fn remove(&self, path: &DbPath) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    async fn transaction(
        &self,
        path: &DbPath,
        apply: &mut (dyn for<'v> FnMut(Option<&'v Value>) -> Option<Value> + Send),
    ) -> Result<bool, StoreError> {
        self.check_writable(path)?;
        // The sender's write lock is held for the whole closure.
        let committed = self.tree.send_if_modified(|root| {
            let Some(next) = apply(read_at(&**root, path.segments())) else {
                return false;
            };
            let root = Arc::make_mut(root);
            write_at(root, path.segments(), next);
            prune(root);
            true
        });
        if !committed {
            debug!("transaction at {} aborted", path);
        }
        Ok(committed)
    }

    fn push(&self, path: &DbPath) -> DbPath {
        let key = match self.keys.lock() {
            Ok(mut keys) => {
                let now = Utc::now().timestamp_millis().max(keys.last_millis);
                if now == keys.last_millis {
                    keys.counter += 1;
                } else {
                    keys.last_millis = now;
                    keys.counter = 0;
                }
                push_key(now, keys.counter)
            }
            Err(_) => push_key(Utc::now().timestamp_millis(), 0),
        };
        let mut segments = path.segments().to_vec();
        segments.push(key);
        DbPath { segments }
    }

    fn watch(&self, path: &DbPath, query: Option<Query>) -> SnapshotStream {
        let rx = self.tree.subscribe();
        let path = path.clone();
        let state = LiveQuery {
            rx,
            path,
            query,
            last: None,
        };
        futures::stream::unfold(state, |mut state| async move {
            let snapshot = state.next_change().await?;
            Some((Ok(snapshot), state))
        })
        .boxed()
    }
}

struct LiveQuery {
    rx: watch::Receiver<Arc<Value>>,
    path: DbPath,
    query: Option<Query>,
    /// The result last emitted; `None` before the first emission.
    last: Option<Option<Value>>,
}

impl LiveQuery {
    fn resolve(&mut self) -> Option<Value> {
        let root = self.rx.borrow_and_update().clone();
        let value = read_at(&root, self.path.segments());
        match &self.query {
            Some(query) => query.apply(value),
            None => value.cloned(),
        }
    }

    async fn next_change(&mut self) -> Option<Snapshot> {
        if self.last.is_some() {
            self.rx.changed().await.ok()?;
        }
        loop {
            let current = self.resolve();
            if self.last.as_ref() != Some(&current) {
                debug!("live query {} emitting", self.path);
                self.last = Some(current.clone());
                return Some(Snapshot::new(self.path.clone(), current));
            }
            self.rx.changed().await.ok()?;
        }
    }
}

fn push_key(millis: i64, counter: u32) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("-{:012x}{:04x}{}", millis, counter, &random[..8])
}

fn read_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    if is_empty(node) {
        None
    } else {
        Some(node)
    }
}

fn write_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = if value.is_object() {
            value
        } else {
            Value::Object(Map::new())
        };
        return;
    };
    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else { return };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        if is_empty(&value) {
            map.remove(last);
        } else {
            map.insert(last.clone(), value);
        }
    }
}

/// Drops nulls and empty objects left behind by removals.
fn prune(node: &mut Value) {
    if let Value::Object(map) = node {
        for child in map.values_mut() {
            prune(child);
        }
        map.retain(|_, child| !is_empty(child));
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
