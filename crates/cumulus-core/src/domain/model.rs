//! Model - Model Store に保存されるエンティティの共通 trait

use super::ids::{Id, IdMarker};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Model は Model Store で管理されるエンティティ
///
/// `KEYWORD` はログ・エラー・監査ログで使う種別名（"serversku", "guest" など）。
/// `Serialize` は update-with-lock の diff 計算に使います。
pub trait Model: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Marker: IdMarker;

    const KEYWORD: &'static str;

    fn id(&self) -> Id<Self::Marker>;

    fn name(&self) -> &str;
}
