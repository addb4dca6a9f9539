//! cumulus-core
//!
//! マルチクラウド IaaS 管理の中核部分。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, errors, task record, sku, guest/eip/region, events, sync_result）
//! - **ports**: 抽象化レイヤー（ModelStore, DeliveryQueue, cloud adapters, SchedulerClient, EventSink, Clock, IdGenerator）
//! - **impls**: 開発・テスト用の実装（InMemoryModelStore, InMemoryDeliveryQueue, ClassLockManager, HashCache, ...）
//! - **typed**: 型付き Task API（Task trait, task_stages! macro, TaskRegistry）
//! - **app**: タスクエンジン（EngineBuilder, TaskEngine, TaskContext, WorkerGroup）
//! - **compare**: 集合の差分計算（Set Reconciler）
//! - **sku**: ServerSku の管理・同期・instance spec 集計
//! - **tasks**: 具体的なタスク実装（guest stop, eip dissociate, sku delete/cache, ...）
//! - **services**: タスクから使う依存のまとめ
//! - **config**: 設定

pub mod app;
pub mod compare;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod services;
pub mod sku;
pub mod tasks;
pub mod typed;

#[cfg(test)]
pub(crate) mod testkit;
