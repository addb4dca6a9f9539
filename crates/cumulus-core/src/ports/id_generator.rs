//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + ランダム部分で ULID を作る（単調増加）

use crate::domain::ids::{Id, IdMarker};
use crate::ports::Clock;
use std::sync::Mutex;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn next_ulid(&self) -> Ulid;
}

impl dyn IdGenerator {
    /// 型付き ID を生成
    ///
    /// ```ignore
    /// let sku_id: SkuId = ids.generate();
    /// ```
    pub fn generate<T: IdMarker>(&self) -> Id<T> {
        Id::from_ulid(self.next_ulid())
    }
}

/// 同じミリ秒内でも単調増加する（Model Store の一覧 = 作成順）
pub struct UlidGenerator<C> {
    clock: C,
    last: Mutex<Ulid>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(Ulid::nil()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let fresh = Ulid::from_parts(timestamp_ms, rand::random());
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = if fresh > *last {
            fresh
        } else {
            last.increment().unwrap_or(fresh)
        };
        *last = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{SkuId, TaskId};
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
        let a: TaskId = ids.generate();
        let b: TaskId = ids.generate();
        assert_ne!(a, b);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(FixedClock::new(fixed_time)));

        let a: SkuId = ids.generate();
        let b: SkuId = ids.generate();
        assert_ne!(a, b);
        assert_eq!(a.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(b.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert!(a.to_string().starts_with("sku-"));
        assert!(b > a);
    }

    #[test]
    fn ids_are_monotonic_within_a_millisecond() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(FixedClock::new(fixed_time));
        let generated: Vec<Ulid> = (0..100).map(|_| ids.next_ulid()).collect();
        assert!(generated.windows(2).all(|w| w[0] < w[1]));
    }
}
