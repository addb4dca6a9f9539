//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryModelStore**: Model Store
//! - **InMemoryDeliveryQueue**: 配送キュー
//! - **ClassLockManager**: manager 単位の排他ロック
//! - **HashCache**: TTL 付きキャッシュ
//! - **TracingEventSink / MemoryEventSink**: 監査ログ
//! - **StaticSkuCatalog**: SKU カタログ
//! - **TracingSchedulerClient**: スケジューラ通知
//! - **Simulated***: 呼び出しを記録するクラウドドライバ（デモ・テスト用）

pub mod catalog;
pub mod class_lock;
pub mod event_sink;
pub mod hash_cache;
pub mod inmem_delivery;
pub mod inmem_store;
pub mod scheduler;
pub mod simulated;

pub use self::catalog::StaticSkuCatalog;
pub use self::class_lock::{ClassLockGuard, ClassLockManager};
pub use self::event_sink::{MemoryEventSink, TracingEventSink};
pub use self::hash_cache::HashCache;
pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_store::InMemoryModelStore;
pub use self::scheduler::TracingSchedulerClient;
pub use self::simulated::{
    DriverBehavior, EipMode, RecordingSchedulerClient, RemoteDeleteMode, SimulatedEipProvider,
    SimulatedGuestDriver, SimulatedProviderDriver,
};
