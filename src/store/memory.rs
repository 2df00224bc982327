use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::store::{Result, Store, StoreError};

/// In-process [`Store`]; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    columns: RwLock<BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `column`.
    pub fn len(&self, column: &str) -> usize {
        self.columns
            .read()
            .map(|cols| cols.get(column).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn put(&self, column: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut cols = self.columns.write().map_err(|_| StoreError::LockPoisoned)?;
        cols.entry(column.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, column: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cols = self.columns.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(cols.get(column).and_then(|rows| rows.get(key)).cloned())
    }

    fn delete(&self, column: &str, key: &[u8]) -> Result<()> {
        let mut cols = self.columns.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(rows) = cols.get_mut(column) {
            rows.remove(key);
        }
        Ok(())
    }

    fn list(
        &self,
        column: &str,
        prefix: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let rows: Vec<(Vec<u8>, Vec<u8>)> = {
            let cols = self.columns.read().map_err(|_| StoreError::LockPoisoned)?;
            cols.get(column)
                .map(|rows| {
                    rows.iter()
                        .filter(|(k, _)| k.starts_with(prefix))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (key, value) in &rows {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }
}
