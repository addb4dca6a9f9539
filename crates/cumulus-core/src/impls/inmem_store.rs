//! InMemoryModelStore - 開発・テスト用の Model Store
//!
//! # 実装詳細
//! - `BTreeMap<Id, Row>` を tokio の Mutex で保護（id 順 = ULID の作成順）
//! - update_with_lock は Mutex を握ったまま read-modify-write するので行単位で原子的
//! - mark_deleted は論理削除（deleted フラグ）

use crate::domain::{CumulusError, Id, Model, Result};
use crate::ports::{Diff, Filter, ModelStore, Mutation};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

struct Row<M> {
    model: M,
    deleted: bool,
}

pub struct InMemoryModelStore<M: Model> {
    rows: Mutex<BTreeMap<Id<M::Marker>, Row<M>>>,
}

impl<M: Model> InMemoryModelStore<M> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    /// 削除済みも含めた件数（テスト用）
    pub async fn len_including_deleted(&self) -> usize {
        self.rows.lock().await.len()
    }
}

impl<M: Model> Default for InMemoryModelStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Model> ModelStore<M> for InMemoryModelStore<M> {
    async fn fetch_by_id(&self, id: Id<M::Marker>) -> Result<Option<M>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(&id)
            .filter(|row| !row.deleted)
            .map(|row| row.model.clone()))
    }

    async fn query(&self, filter: Filter<'_, M>) -> Result<Vec<M>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|row| !row.deleted && filter(&row.model))
            .map(|row| row.model.clone())
            .collect())
    }

    async fn insert(&self, model: M) -> Result<M> {
        let mut rows = self.rows.lock().await;
        let id = model.id();
        if rows.contains_key(&id) {
            return Err(CumulusError::internal(format!(
                "{} {id} already exists",
                M::KEYWORD
            )));
        }
        rows.insert(
            id,
            Row {
                model: model.clone(),
                deleted: false,
            },
        );
        Ok(model)
    }

    async fn update_with_lock(
        &self,
        id: Id<M::Marker>,
        mutation: Mutation<'_, M>,
    ) -> Result<(M, Diff)> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&id)
            .filter(|row| !row.deleted)
            .ok_or_else(|| CumulusError::not_found(M::KEYWORD, id))?;

        let mut updated = row.model.clone();
        mutation(&mut updated);
        if updated.id() != id {
            return Err(CumulusError::internal(format!(
                "{} {id}: update must not change the id",
                M::KEYWORD
            )));
        }
        let diff = Diff::between(&row.model, &updated)?;
        row.model = updated.clone();
        Ok((updated, diff))
    }

    async fn mark_deleted(&self, id: Id<M::Marker>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&id) {
            Some(row) if !row.deleted => {
                row.deleted = true;
                Ok(())
            }
            _ => Err(CumulusError::not_found(M::KEYWORD, id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Host, HostId};
    use std::sync::Arc;
    use ulid::Ulid;

    fn host(name: &str) -> Host {
        Host {
            id: HostId::from_ulid(Ulid::new()),
            name: name.to_string(),
            zone_id: None,
        }
    }

    #[tokio::test]
    async fn insert_then_fetch() {
        let store = InMemoryModelStore::<Host>::new();
        let h = store.insert(host("h1")).await.unwrap();
        assert_eq!(store.fetch_by_id(h.id).await.unwrap(), Some(h.clone()));
        assert_eq!(store.get(h.id).await.unwrap().name, "h1");
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryModelStore::<Host>::new();
        let h = store.insert(host("h1")).await.unwrap();
        assert!(store.insert(h).await.is_err());
    }

    #[tokio::test]
    async fn update_with_lock_returns_diff() {
        let store = InMemoryModelStore::<Host>::new();
        let h = store.insert(host("h1")).await.unwrap();

        let (updated, diff) = store
            .update_with_lock(
                h.id,
                Box::new(|h: &mut Host| h.zone_id = Some("zone-a".into())),
            )
            .await
            .unwrap();
        assert_eq!(updated.zone_id.as_deref(), Some("zone-a"));
        assert_eq!(diff.fields(), vec!["zone_id"]);

        let (_, diff) = store
            .update_with_lock(
                h.id,
                Box::new(|h: &mut Host| h.zone_id = Some("zone-a".into())),
            )
            .await
            .unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn deleted_rows_are_invisible() {
        let store = InMemoryModelStore::<Host>::new();
        let h = store.insert(host("h1")).await.unwrap();
        store.mark_deleted(h.id).await.unwrap();

        assert_eq!(store.fetch_by_id(h.id).await.unwrap(), None);
        assert!(store.get(h.id).await.unwrap_err().is_not_found());
        assert!(store.all().await.unwrap().is_empty());
        assert_eq!(store.len_including_deleted().await, 1);
        assert!(store.mark_deleted(h.id).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryModelStore::<Host>::new());
        let h = store.insert(host("0")).await.unwrap();

        let mut joins = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            joins.push(tokio::spawn(async move {
                store
                    .update_with_lock(
                        h.id,
                        Box::new(|h: &mut Host| {
                            let n: u32 = h.name.parse().unwrap();
                            h.name = (n + 1).to_string();
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for j in joins {
            j.await.unwrap();
        }
        assert_eq!(store.get(h.id).await.unwrap().name, "16");
    }

    #[tokio::test]
    async fn query_filters_and_counts() {
        let store = InMemoryModelStore::<Host>::new();
        let mut a = host("a");
        a.zone_id = Some("z1".into());
        store.insert(a).await.unwrap();
        store.insert(host("b")).await.unwrap();

        let in_zone = store
            .query(&|h: &Host| h.zone_id.as_deref() == Some("z1"))
            .await
            .unwrap();
        assert_eq!(in_zone.len(), 1);
        assert_eq!(store.count(&|_: &Host| true).await.unwrap(), 2);
    }
}
