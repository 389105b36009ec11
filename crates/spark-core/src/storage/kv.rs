//! Key-value persistence seam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{DatabaseError, Result};

/// String key-value storage used for the countdown record and captured items.
pub trait KvStore: Send {
    /// Get a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|_| DatabaseError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| DatabaseError::Poisoned)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}
