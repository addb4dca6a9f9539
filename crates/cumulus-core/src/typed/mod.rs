//! Typed - 型付き Task API
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait + `task_stages!` の stage 列挙型 - 型安全
//! - **内部（Dyn）**: `DynTask` trait - object-safe, type erasure

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynTask, TypedTask};
pub use self::registry::{RegistryError, TaskRegistry};
pub use self::task::{StageName, Task};
