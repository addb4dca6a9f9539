//! ClassLockManager - manager 単位の排他ロック
//!
//! SKU 同期のように「同じ manager × 同じ呼び出し元」で直列化したい処理に使います。
//! 取得した `ClassLockGuard` を drop すると必ず解放されるので、早期 return でも漏れません。

use crate::domain::{CumulusError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

pub struct ClassLockManager {
    locks: LockTable,
    timeout: Duration,
}

/// 保持している間だけロックが有効
pub struct ClassLockGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
}

impl ClassLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ClassLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        release(&self.locks, &self.key);
        tracing::debug!(key = %self.key, "released class lock");
    }
}

/// 誰も参照していないエントリを表から外す
fn release(locks: &LockTable, key: &str) {
    let Ok(mut locks) = locks.lock() else {
        return;
    };
    if locks.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
        locks.remove(key);
    }
}

impl ClassLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(StdMutex::new(HashMap::new())),
            timeout,
        }
    }

    /// `keyword` + `scope`（呼び出し元のプロジェクトなど）でロックを取る
    ///
    /// timeout までに取れなければ `CumulusError::LockContention`。
    pub async fn lock(&self, keyword: &str, scope: &str) -> Result<ClassLockGuard> {
        let key = format!("{keyword}:{scope}");
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| CumulusError::internal("class lock table poisoned"))?;
            locks.entry(key.clone()).or_default().clone()
        };

        match tokio::time::timeout(self.timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(key = %key, "acquired class lock");
                Ok(ClassLockGuard {
                    key,
                    guard: Some(guard),
                    locks: self.locks.clone(),
                })
            }
            Err(_) => {
                release(&self.locks, &key);
                Err(CumulusError::LockContention(format!(
                    "{key} not acquired within {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }
}
