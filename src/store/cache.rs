//! In-memory typed object cache with secondary indexes
//!
//! The cache is the read side of the operator: resolvers, designators and
//! finalizers only ever read from here, never from the API server. Every
//! operation takes the lock for the duration of a map access and releases it
//! before returning, so callers can never hold it across a remote call.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kube::ResourceExt;
use tokio::sync::watch;

use crate::error::{OperatorError, Result};

/// Identity of an object in the cache: optional namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Pure function from an object to the index values it should be found under
pub type IndexFn<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

struct Index<K> {
    extract: IndexFn<K>,
    entries: BTreeMap<String, BTreeSet<ObjectKey>>,
}

impl<K> Index<K> {
    fn insert(&mut self, key: &ObjectKey, obj: &K) {
        for value in (self.extract)(obj) {
            self.entries.entry(value).or_default().insert(key.clone());
        }
    }

    fn remove(&mut self, key: &ObjectKey, obj: &K) {
        for value in (self.extract)(obj) {
            if let Some(keys) = self.entries.get_mut(&value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.entries.remove(&value);
                }
            }
        }
    }
}

struct Inner<K> {
    objects: BTreeMap<ObjectKey, Arc<K>>,
    indexes: HashMap<String, Index<K>>,
}

/// Typed cache of one kind.
pub struct ObjectCache<K> {
    inner: RwLock<Inner<K>>,
    ready: watch::Sender<bool>,
}

impl<K> Default for ObjectCache<K> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                objects: BTreeMap::new(),
                indexes: HashMap::new(),
            }),
            ready: watch::Sender::new(false),
        }
    }
}

impl<K> ObjectCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secondary index. Must happen before the cache is populated.
    pub fn register_index(&self, index_key: impl Into<String>, extract: IndexFn<K>) -> Result<()> {
        let index_key = index_key.into();
        if self.is_ready() {
            return Err(OperatorError::Configuration(format!(
                "index {index_key} registered after the cache started serving reads"
            )));
        }
        let mut inner = self.write();
        if inner.indexes.contains_key(&index_key) {
            return Err(OperatorError::Configuration(format!(
                "index {index_key} registered twice"
            )));
        }
        let mut index = Index {
            extract,
            entries: BTreeMap::new(),
        };
        for (key, obj) in &inner.objects {
            index.insert(key, obj);
        }
        inner.indexes.insert(index_key, index);
        Ok(())
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.read().objects.get(key).cloned()
    }

    /// Every cached object, ordered by key
    pub fn list(&self) -> Vec<Arc<K>> {
        self.read().objects.values().cloned().collect()
    }

    /// Objects whose index `index_key` contains `value`
    pub fn by_index(&self, index_key: &str, value: &str) -> Result<Vec<Arc<K>>> {
        let inner = self.read();
        let index = inner.indexes.get(index_key).ok_or_else(|| {
            OperatorError::Configuration(format!("index {index_key} is not registered"))
        })?;
        Ok(index
            .entries
            .get(value)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.objects.get(key).cloned())
            .collect())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Mark the cache as populated. Called once the initial list has been applied.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    /// Wait until the initial list has been applied.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as the cache, so this only errors on drop.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<K>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: ResourceExt> ObjectCache<K> {
    /// Insert or replace an object.
    pub fn apply(&self, obj: K) {
        let key = ObjectKey::of(&obj);
        let obj = Arc::new(obj);
        let mut inner = self.write();
        let Inner { objects, indexes } = &mut *inner;
        if let Some(previous) = objects.insert(key.clone(), obj.clone()) {
            for index in indexes.values_mut() {
                index.remove(&key, &previous);
            }
        }
        for index in indexes.values_mut() {
            index.insert(&key, &obj);
        }
    }

    pub fn delete(&self, obj: &K) {
        let key = ObjectKey::of(obj);
        let mut inner = self.write();
        let Inner { objects, indexes } = &mut *inner;
        if let Some(previous) = objects.remove(&key) {
            for index in indexes.values_mut() {
                index.remove(&key, &previous);
            }
        }
    }

    /// Swap in a complete listing, rebuilding every index.
    pub fn replace(&self, objs: Vec<K>) {
        let objects: BTreeMap<ObjectKey, Arc<K>> = objs
            .into_iter()
            .map(|obj| (ObjectKey::of(&obj), Arc::new(obj)))
            .collect();
        let mut inner = self.write();
        for index in inner.indexes.values_mut() {
            index.entries.clear();
            for (key, obj) in &objects {
                index.insert(key, obj);
            }
        }
        inner.objects = objects;
    }
}
