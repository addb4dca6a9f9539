//! SyncResult - 同期 1 回分の集計
//!
//! 個々の add/update/delete の失敗は記録するだけで、同期全体は止めません。
//! 集計前に止まった場合（lock 取得失敗、カタログ取得失敗）だけ `fatal` が入ります。

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub add_cnt: usize,
    pub add_err_cnt: usize,
    pub update_cnt: usize,
    pub update_err_cnt: usize,
    pub del_cnt: usize,
    pub del_err_cnt: usize,
    pub errors: Vec<String>,
    pub fatal: Option<String>,
}

impl SyncResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self) {
        self.add_cnt += 1;
    }

    pub fn add_error(&mut self, err: impl fmt::Display) {
        self.add_err_cnt += 1;
        self.errors.push(err.to_string());
    }

    pub fn update(&mut self) {
        self.update_cnt += 1;
    }

    pub fn update_error(&mut self, err: impl fmt::Display) {
        self.update_err_cnt += 1;
        self.errors.push(err.to_string());
    }

    pub fn delete(&mut self) {
        self.del_cnt += 1;
    }

    pub fn delete_error(&mut self, err: impl fmt::Display) {
        self.del_err_cnt += 1;
        self.errors.push(err.to_string());
    }

    pub fn error(&mut self, err: impl fmt::Display) {
        self.fatal = Some(err.to_string());
    }

    pub fn is_error(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn is_partial_error(&self) -> bool {
        self.add_err_cnt + self.update_err_cnt + self.del_err_cnt > 0
    }

    /// 何か変更があったか（キャッシュ無効化の判断に使う）
    pub fn changed(&self) -> bool {
        self.add_cnt + self.update_cnt + self.del_cnt > 0
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} failed {} updated {} failed {} added {} failed {}",
            self.del_cnt,
            self.del_err_cnt,
            self.update_cnt,
            self.update_err_cnt,
            self.add_cnt,
            self.add_err_cnt
        )?;
        if let Some(fatal) = &self.fatal {
            write!(f, " error: {fatal}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_errors_are_not_fatal() {
        let mut result = SyncResult::new();
        result.add();
        result.update_error("row locked");
        result.delete();

        assert!(!result.is_error());
        assert!(result.is_partial_error());
        assert!(result.changed());
        assert_eq!(result.errors, vec!["row locked".to_string()]);
        assert_eq!(
            result.to_string(),
            "removed 1 failed 0 updated 0 failed 1 added 1 failed 0"
        );
    }

    #[test]
    fn fatal_error_is_displayed() {
        let mut result = SyncResult::new();
        result.error("lock contention: serversku");
        assert!(result.is_error());
        assert!(!result.changed());
        assert!(result.to_string().ends_with("error: lock contention: serversku"));
    }
}
