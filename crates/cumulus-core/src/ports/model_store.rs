//! ModelStore port - 永続化レイヤーの抽象化
//!
//! ORM そのものは範囲外で、ここでは必要最小限の操作だけを定義します。
//! - fetch by id / filter
//! - update-with-lock（行単位の read-modify-write を原子的に行う）
//! - insert / mark-deleted

use crate::domain::{CumulusError, Id, Model, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// query / count に渡すフィルタ
pub type Filter<'a, M> = &'a (dyn Fn(&M) -> bool + Send + Sync);

/// update_with_lock に渡す変更
pub type Mutation<'a, M> = Box<dyn FnOnce(&mut M) + Send + 'a>;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// update 前後のフィールド差分
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub changes: Vec<FieldChange>,
}

impl Diff {
    /// serde でオブジェクトに変換してトップレベルのフィールドを比較
    pub fn between<M: Serialize>(before: &M, after: &M) -> Result<Self> {
        let before = serde_json::to_value(before)?;
        let after = serde_json::to_value(after)?;
        let (Value::Object(before), Value::Object(after)) = (before, after) else {
            return Err(CumulusError::internal("diff requires object-shaped models"));
        };
        let changes = after
            .iter()
            .filter_map(|(field, new)| {
                let old = before.get(field).cloned().unwrap_or(Value::Null);
                (old != *new).then(|| FieldChange {
                    field: field.clone(),
                    before: old,
                    after: new.clone(),
                })
            })
            .collect();
        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.field.as_str()).collect()
    }
}

#[async_trait]
pub trait ModelStore<M: Model>: Send + Sync {
    async fn fetch_by_id(&self, id: Id<M::Marker>) -> Result<Option<M>>;

    /// 削除済みを除いて、id 順に返す
    async fn query(&self, filter: Filter<'_, M>) -> Result<Vec<M>>;

    async fn insert(&self, model: M) -> Result<M>;

    /// 行ロックを取ったまま mutation を適用し、更新後の値と差分を返す
    async fn update_with_lock(&self, id: Id<M::Marker>, mutation: Mutation<'_, M>)
    -> Result<(M, Diff)>;

    async fn mark_deleted(&self, id: Id<M::Marker>) -> Result<()>;

    /// fetch_by_id の NotFound 版
    async fn get(&self, id: Id<M::Marker>) -> Result<M> {
        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| CumulusError::not_found(M::KEYWORD, id))
    }

    async fn count(&self, filter: Filter<'_, M>) -> Result<usize> {
        Ok(self.query(filter).await?.len())
    }

    async fn all(&self) -> Result<Vec<M>> {
        self.query(&|_| true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        zone: Option<&'static str>,
        cpu: u32,
    }

    #[test]
    fn diff_lists_changed_fields_only() {
        let before = Row { name: "a", zone: None, cpu: 1 };
        let after = Row { name: "a", zone: Some("z1"), cpu: 2 };
        let diff = Diff::between(&before, &after).unwrap();
        let mut fields = diff.fields();
        fields.sort();
        assert_eq!(fields, vec!["cpu", "zone"]);
    }

    #[test]
    fn identical_values_have_empty_diff() {
        let row = Row { name: "a", zone: None, cpu: 1 };
        assert!(Diff::between(&row, &row).unwrap().is_empty());
    }
}
