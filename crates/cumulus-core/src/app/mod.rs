//! App - タスクエンジン層
//!
//! ports を組み合わせて、タスク状態機械を動かします。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: タスク登録とワイヤリング（起動時検証）
//! - **TaskEngine**: タスクの作成・配送・stage 実行・親への継続
//! - **TaskContext / TaskCallback**: stage callback から見たタスク
//! - **WorkerGroup**: キューを読んで execute を回すワーカー
//! - **TaskCounts**: 集計ビュー

pub mod builder;
pub mod context;
pub mod engine;
pub mod status;
pub mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::context::{TaskCallback, TaskContext};
pub use self::engine::TaskEngine;
pub use self::status::TaskCounts;
pub use self::worker_loop::WorkerGroup;
