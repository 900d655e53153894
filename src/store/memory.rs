//! 进程内键值存储（可选 TTL）

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeyValueStore;

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// 内存存储：`RwLock<HashMap>`，每个操作在单把写锁内完成，保证单 key 原子性
pub struct InMemoryStore<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<V> InMemoryStore<V> {
    /// 不过期的存储
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    /// 条目在写入 `ttl` 之后视为过期
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// 按可选秒数创建
    pub fn with_ttl_secs(ttl_secs: Option<u64>) -> Self {
        match ttl_secs {
            Some(secs) => Self::with_ttl(Duration::from_secs(secs)),
            None => Self::new(),
        }
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ttl
            .map(|ttl| entry.stored_at.elapsed() > ttl)
            .unwrap_or(false)
    }

    /// 未过期条目数
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !self.is_expired(e))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> KeyValueStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| !self.is_expired(e))
            .map(|e| e.value.clone())
    }

    async fn set(&self, key: &str, value: V) {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    async fn take(&self, key: &str) -> Option<V> {
        let entry = self.entries.write().await.remove(key)?;
        if self.is_expired(&entry) {
            None
        } else {
            Some(entry.value)
        }
    }

    async fn cleanup_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !self.is_expired(e));
        before - entries.len()
    }
}
