//! Process-wide atom interning (spec §3, ATOM).
//!
//! Atom names are interned once and referred to everywhere else by a stable
//! `AtomId`. Writers take `table.lock()`; readers who only need to resolve
//! an already-known id read through a snapshotted `Arc<Vec<String>>`, the
//! same "swap the table pointer" idiom spec §9 prescribes for the predicate
//! hash table (see `cdb.rs`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

struct Inner {
    names: Arc<Vec<String>>,
    index: HashMap<String, AtomId>,
}

/// The atom table. Cheap to clone: it's an `Arc` around a mutex-protected
/// interning map plus a lock-free-readable name vector.
pub struct AtomTable {
    inner: Mutex<Inner>,
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomTable {
    pub fn new() -> Self {
        AtomTable {
            inner: Mutex::new(Inner {
                names: Arc::new(Vec::new()),
                index: HashMap::new(),
            }),
        }
    }

    /// Interns `name`, returning its stable id. Repeated calls with the same
    /// name return the same id.
    pub fn intern(&self, name: &str) -> AtomId {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.index.get(name) {
            return *id;
        }
        let id = AtomId(inner.names.len() as u32);
        // Clone-on-write: build the new vector, then swap the Arc so any
        // reader holding a previous snapshot keeps seeing a consistent view.
        let mut names = (*inner.names).clone();
        names.push(name.to_string());
        inner.names = Arc::new(names);
        inner.index.insert(name.to_string(), id);
        id
    }

    /// A point-in-time snapshot of the name table, safe to read without
    /// holding the lock.
    pub fn snapshot(&self) -> Arc<Vec<String>> {
        self.inner.lock().unwrap().names.clone()
    }

    pub fn resolve(&self, id: AtomId) -> Option<String> {
        self.snapshot().get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
