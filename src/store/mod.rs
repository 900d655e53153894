//! 存储层：按 key 原子读写的键值存储抽象
//!
//! 会话状态、挂起记录、预提交的审批决策都经由 `KeyValueStore` 存取，key 为 session/thread id。
//! 只要求单 key 原子性（get / set / take），不需要跨会话加锁；默认实现为进程内 `InMemoryStore`，
//! 可替换为外部存储以支持多进程部署。

pub mod interrupt;
pub mod memory;

use async_trait::async_trait;

pub use interrupt::{ActionRequest, Decision, PendingInterrupt};
pub use memory::InMemoryStore;

/// 键值存储接口
#[async_trait]
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// 读取（已过期的条目视为不存在）
    async fn get(&self, key: &str) -> Option<V>;

    /// 写入，覆盖已有值
    async fn set(&self, key: &str, value: V);

    /// 原子地取出并删除；并发调用时至多一个调用方拿到值
    async fn take(&self, key: &str) -> Option<V>;

    /// 是否存在未过期条目
    async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// 清理过期条目，返回清理数量
    async fn cleanup_expired(&self) -> usize {
        0
    }
}
