//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type で型付けしています。
//! `SkuId` と `GuestId` は実行時には同じ 16 bytes ですが、コンパイル時には混同できません。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順に並ぶので、Model Store の一覧も作成順になる
//! - **分散生成可能**: 調整なしで複数ノードで生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"sku-", "task-"）を提供します。
pub trait IdMarker:
    fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static
{
    /// Display で使うプレフィックス（例: "sku-", "task-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Display 形式（"sku-01H..."）と素の ULID の両方を受け付ける
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

macro_rules! id_markers {
    ($($(#[$meta:meta])* $marker:ident => $alias:ident, $prefix:literal;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub enum $marker {}

            impl IdMarker for $marker {
                fn prefix() -> &'static str {
                    $prefix
                }
            }

            pub type $alias = Id<$marker>;
        )*
    };
}

id_markers! {
    /// Task のマーカー型
    Task => TaskId, "task-";
    /// ServerSku のマーカー型
    Sku => SkuId, "sku-";
    Guest => GuestId, "guest-";
    Host => HostId, "host-";
    Eip => EipId, "eip-";
    Region => RegionId, "region-";
    Provider => ProviderId, "provider-";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid = Ulid::new();
        let sku = SkuId::from_ulid(ulid);
        let guest = GuestId::from_ulid(ulid);

        assert_eq!(sku.as_ulid(), guest.as_ulid());
        assert!(sku.to_string().starts_with("sku-"));
        assert!(guest.to_string().starts_with("guest-"));
        // let _: SkuId = guest; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::from_parts(1_000, 7));
        let id2 = TaskId::from_ulid(Ulid::from_parts(2_000, 1));
        assert!(id1 < id2);
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let id = RegionId::from_ulid(Ulid::new());
        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, format!("\"{}\"", id.as_ulid()));

        let back: RegionId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_accepts_prefixed_and_raw_forms() {
        let id = EipId::from_ulid(Ulid::new());
        assert_eq!(id.to_string().parse::<EipId>().unwrap(), id);
        assert_eq!(id.as_ulid().to_string().parse::<EipId>().unwrap(), id);
        assert!("eip-not-a-ulid".parse::<EipId>().is_err());
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<SkuId>(), size_of::<Ulid>());
        assert_eq!(size_of::<TaskId>(), 16);
    }
}
