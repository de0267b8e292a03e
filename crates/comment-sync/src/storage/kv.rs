//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - 单命名空间（sled Tree）的键值存储
//! - 值以 JSON 序列化，单键写入天然原子
//! - 写入后显式 flush，保证进程退出前落盘

use std::path::Path;
use sled::Tree;
use serde::{Deserialize, Serialize};
use crate::error::{Result, SyncError};

/// 默认命名空间
pub const DEFAULT_TREE: &str = "comment_sync";

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    tree: Tree,
}

impl KvStore {
    /// 创建新的 KV 存储实例（`<base_path>/kv`）
    pub async fn new(base_path: &Path) -> Result<Self> {
        Self::with_tree(base_path, DEFAULT_TREE).await
    }

    /// 使用指定命名空间创建 KV 存储实例
    pub async fn with_tree(base_path: &Path, tree_name: &str) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path).await
            .map_err(|e| SyncError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 上一轮进程可能刚释放锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 200;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            SyncError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let tree = db.open_tree(tree_name)
            .map_err(|e| SyncError::KvStore(format!("打开 Tree 失败: {}", e)))?;

        tracing::debug!("KV 存储已打开: {} (tree={})", kv_path.display(), tree_name);

        Ok(Self { tree })
    }

    /// 设置键值对（覆盖写入并落盘）
    pub async fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| SyncError::Serialization(format!("序列化值失败: {}", e)))?;

        self.tree.insert(key, value_bytes)
            .map_err(|e| SyncError::KvStore(format!("设置键值对失败: {}", e)))?;
        self.flush().await
    }

    /// 获取键值对
    pub async fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let result = self.tree.get(key)
            .map_err(|e| SyncError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| SyncError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对
    pub async fn delete<K>(&self, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        let removed = self.tree.remove(key)
            .map_err(|e| SyncError::KvStore(format!("删除键值对失败: {}", e)))?;
        self.flush().await?;
        Ok(removed.is_some())
    }

    async fn flush(&self) -> Result<()> {
        self.tree.flush_async().await
            .map_err(|e| SyncError::KvStore(format!("落盘失败: {}", e)))?;
        Ok(())
    }
}

/// 常用的键
pub mod keys {
    /// 视频目录缓存
    pub const VIDEO_CATALOG: &str = "video_catalog";
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use serde_json::json;

    #[tokio::test]
    async fn test_kv_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::new(temp_dir.path()).await.unwrap();

        let test_data = json!({
            "name": "test",
            "value": 123
        });

        store.set("test_key", &test_data).await.unwrap();
        let retrieved: serde_json::Value = store.get("test_key").await.unwrap().unwrap();
        assert_eq!(retrieved, test_data);

        let missing: Option<serde_json::Value> = store.get("non_existent_key").await.unwrap();
        assert!(missing.is_none());

        assert!(store.delete("test_key").await.unwrap());
        assert!(!store.delete("test_key").await.unwrap());
        let deleted: Option<serde_json::Value> = store.get("test_key").await.unwrap();
        assert!(deleted.is_none());
    }

    #[tokio::test]
    async fn test_kv_store_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = KvStore::new(temp_dir.path()).await.unwrap();
            store.set("k", &vec!["a", "b"]).await.unwrap();
        }
        let store = KvStore::new(temp_dir.path()).await.unwrap();
        let value: Vec<String> = store.get("k").await.unwrap().unwrap();
        assert_eq!(value, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_trees_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::new(temp_dir.path()).await.unwrap();
        store.set("k", &1).await.unwrap();
        drop(store);

        let other = KvStore::with_tree(temp_dir.path(), "other").await.unwrap();
        let value: Option<i32> = other.get("k").await.unwrap();
        assert!(value.is_none());
    }
}
