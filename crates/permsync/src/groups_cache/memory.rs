use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheStore, Result};

/// In-process [`CacheStore`]. Expired entries are dropped on read.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) if *expires_at > now => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
