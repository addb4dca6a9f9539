//! ServerSku の管理・同期・instance specs 集計

pub mod manager;
pub mod specs;
pub mod sync;

pub use self::manager::{ServerSkuDetails, ServerSkuManager, SkuCreateInput, SkuUpdateInput};
pub use self::specs::{
    INSTANCE_SPECS_CACHE_PREFIX, InstanceSpecQuery, InstanceSpecs, interval_mem, round, round_mem,
};
pub use self::sync::sku_from_catalog;
