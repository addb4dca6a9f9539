//! Task trait - 型付きタスクの定義
//!
//! # 学習ポイント
//! - Associated Constants (`const KIND`, `const INIT`)
//! - Associated Type (`type Stage`) + `task_stages!` による stage 表
//!
//! stage 名から callback への対応は `on_stage` の `match` そのもの。
//! 命名規約やリフレクションには頼らず、未処理の stage はコンパイル時に検出されます。

use crate::app::TaskContext;
use crate::domain::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// stage の列挙型が実装する trait（`task_stages!` が生成する）
pub trait StageName: Copy + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }
}

/// stage の列挙型と、その永続化名を宣言する
///
/// ```ignore
/// task_stages! {
///     pub enum GuestStopStage {
///         Init => "OnInit",
///         OnMasterStopTaskComplete => "OnMasterStopTaskComplete",
///     }
/// }
/// ```
#[macro_export]
macro_rules! task_stages {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $stage:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::typed::StageName for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $stage),+
                }
            }
        }
    };
}

/// Task は kind・stage 表・callback をまとめたもの
///
/// # callback の規約
/// 各 callback は最後に次のいずれかを行う:
/// - `ctx.set_stage(..)` して外部（driver の callback や子タスク）からの dispatch を待つ
/// - `ctx.continue_with(..)` で次の stage を即座に配送する
/// - `ctx.set_stage_complete(..)` / `ctx.set_stage_failed(..)` で終了する
///
/// `Err` を返した場合、エンジンがタスクを Failed にします（リトライはしない）。
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// タスク種別（TaskRecord::kind に保存される）
    const KIND: &'static str;

    type Stage: StageName;

    /// schedule_run で最初に呼ばれる stage
    const INIT: Self::Stage;

    async fn on_stage(&self, stage: Self::Stage, ctx: &mut TaskContext, data: Value) -> Result<()>;

    /// stage の失敗通知（driver の callback.fail や子タスクの失敗）
    async fn on_stage_failed(
        &self,
        _stage: Self::Stage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        ctx.set_stage_failed(reason)
    }
}
