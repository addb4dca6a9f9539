//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。永続化・クラウド API・スケジューラ・監査ログなど
//! 外部の協調者への入り口を trait として定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod cloud;
pub mod delivery_queue;
pub mod event_sink;
pub mod id_generator;
pub mod model_store;
pub mod scheduler;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cloud::{
    CatalogSku, CloudEip, CloudProviderDriver, CloudSku, EipProvider, GuestDriver, SkuCatalog,
};
pub use self::delivery_queue::{DeliveryQueue, QueueError};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::model_store::{Diff, FieldChange, Filter, Mutation, ModelStore};
pub use self::scheduler::SchedulerClient;
