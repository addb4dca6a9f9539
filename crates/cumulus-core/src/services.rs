//! Services - タスクと SKU manager が使う依存のまとめ
//!
//! ストア・クラウドアダプタ・スケジューラ・監査ログ・キャッシュ・設定を 1 か所に持ち、
//! `Arc<Services>` として各タスクに渡します。

use crate::app::BuildError;
use crate::config::Config;
use crate::domain::{
    Action, Cloudprovider, Cloudregion, CumulusError, DomainEvent, EipId, EipStatus, Elasticip,
    Guest, GuestId, GuestStatus, Host, Model, Result, ServerSku, SkuId, SkuStatus, UserCred,
};
use crate::impls::{
    ClassLockManager, HashCache, InMemoryModelStore, TracingEventSink, TracingSchedulerClient,
};
use crate::ports::{
    CloudProviderDriver, EipProvider, EventSink, GuestDriver, IdGenerator, ModelStore,
    SchedulerClient, SystemClock, UlidGenerator,
};
use std::collections::HashMap;
use std::sync::Arc;

/// エンティティごとの Model Store
#[derive(Clone)]
pub struct Stores {
    pub skus: Arc<dyn ModelStore<ServerSku>>,
    pub guests: Arc<dyn ModelStore<Guest>>,
    pub hosts: Arc<dyn ModelStore<Host>>,
    pub eips: Arc<dyn ModelStore<Elasticip>>,
    pub regions: Arc<dyn ModelStore<Cloudregion>>,
    pub providers: Arc<dyn ModelStore<Cloudprovider>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            skus: Arc::new(InMemoryModelStore::<ServerSku>::new()),
            guests: Arc::new(InMemoryModelStore::<Guest>::new()),
            hosts: Arc::new(InMemoryModelStore::<Host>::new()),
            eips: Arc::new(InMemoryModelStore::<Elasticip>::new()),
            regions: Arc::new(InMemoryModelStore::<Cloudregion>::new()),
            providers: Arc::new(InMemoryModelStore::<Cloudprovider>::new()),
        }
    }
}

pub struct Services {
    pub stores: Stores,
    /// hypervisor → driver
    guest_drivers: HashMap<String, Arc<dyn GuestDriver>>,
    /// provider → driver
    provider_drivers: HashMap<String, Arc<dyn CloudProviderDriver>>,
    pub eip_provider: Arc<dyn EipProvider>,
    pub scheduler: Arc<dyn SchedulerClient>,
    pub events: Arc<dyn EventSink>,
    pub ids: Arc<dyn IdGenerator>,
    pub cache: HashCache,
    pub class_locks: ClassLockManager,
    pub config: Config,
}

impl Services {
    pub fn builder(config: Config) -> ServicesBuilder {
        ServicesBuilder::new(config)
    }

    pub fn guest_driver(&self, hypervisor: &str) -> Result<Arc<dyn GuestDriver>> {
        self.guest_drivers.get(hypervisor).cloned().ok_or_else(|| {
            CumulusError::internal(format!("no guest driver for hypervisor {hypervisor}"))
        })
    }

    pub fn provider_driver(&self, provider: &str) -> Option<Arc<dyn CloudProviderDriver>> {
        self.provider_drivers.get(provider).cloned()
    }

    pub async fn ops_log<M: Model>(
        &self,
        model: &M,
        action: Action,
        notes: impl Into<String>,
        cred: &UserCred,
    ) {
        self.events
            .emit(DomainEvent::ops_log(model, action, notes, cred))
            .await;
    }

    pub async fn action_log<M: Model>(
        &self,
        model: &M,
        action: Action,
        notes: impl Into<String>,
        cred: &UserCred,
        success: bool,
    ) {
        self.events
            .emit(DomainEvent::action_log(model, action, notes, cred, success))
            .await;
    }

    pub async fn set_guest_status(
        &self,
        id: GuestId,
        status: GuestStatus,
        reason: Option<&str>,
    ) -> Result<Guest> {
        let reason = reason.map(str::to_string);
        let (guest, diff) = self
            .stores
            .guests
            .update_with_lock(
                id,
                Box::new(move |g: &mut Guest| {
                    g.status = status;
                    g.status_reason = reason;
                }),
            )
            .await?;
        if !diff.is_empty() {
            tracing::debug!(guest_id = %id, status = status.as_str(), "guest status changed");
        }
        Ok(guest)
    }

    pub async fn set_eip_status(
        &self,
        id: EipId,
        status: EipStatus,
        reason: Option<&str>,
    ) -> Result<Elasticip> {
        let reason = reason.map(str::to_string);
        let (eip, _) = self
            .stores
            .eips
            .update_with_lock(
                id,
                Box::new(move |e: &mut Elasticip| {
                    e.status = status;
                    e.status_reason = reason;
                }),
            )
            .await?;
        tracing::debug!(eip_id = %id, status = status.as_str(), "eip status changed");
        Ok(eip)
    }

    pub async fn set_sku_status(
        &self,
        id: SkuId,
        status: SkuStatus,
        reason: Option<&str>,
    ) -> Result<ServerSku> {
        let reason = reason.map(str::to_string);
        let (sku, _) = self
            .stores
            .skus
            .update_with_lock(
                id,
                Box::new(move |s: &mut ServerSku| {
                    s.status = status;
                    s.status_reason = reason;
                }),
            )
            .await?;
        tracing::debug!(sku_id = %id, status = status.as_str(), "sku status changed");
        Ok(sku)
    }
}

pub struct ServicesBuilder {
    config: Config,
    stores: Option<Stores>,
    guest_drivers: HashMap<String, Arc<dyn GuestDriver>>,
    provider_drivers: HashMap<String, Arc<dyn CloudProviderDriver>>,
    eip_provider: Option<Arc<dyn EipProvider>>,
    scheduler: Option<Arc<dyn SchedulerClient>>,
    events: Option<Arc<dyn EventSink>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl ServicesBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: None,
            guest_drivers: HashMap::new(),
            provider_drivers: HashMap::new(),
            eip_provider: None,
            scheduler: None,
            events: None,
            ids: None,
        }
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_guest_driver(
        mut self,
        hypervisor: impl Into<String>,
        driver: Arc<dyn GuestDriver>,
    ) -> Self {
        self.guest_drivers.insert(hypervisor.into(), driver);
        self
    }

    pub fn with_provider_driver(
        mut self,
        provider: impl Into<String>,
        driver: Arc<dyn CloudProviderDriver>,
    ) -> Self {
        self.provider_drivers.insert(provider.into(), driver);
        self
    }

    pub fn with_eip_provider(mut self, eip_provider: Arc<dyn EipProvider>) -> Self {
        self.eip_provider = Some(eip_provider);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerClient>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// EIP provider だけは必須。その他はインメモリ / tracing 実装で埋める
    pub fn build(self) -> std::result::Result<Arc<Services>, BuildError> {
        let eip_provider = self
            .eip_provider
            .ok_or(BuildError::MissingComponent("eip_provider"))?;
        let cache = HashCache::new(self.config.cache.capacity, self.config.cache.ttl());
        let class_locks = ClassLockManager::new(self.config.sku.lock_timeout());

        Ok(Arc::new(Services {
            stores: self.stores.unwrap_or_else(Stores::in_memory),
            guest_drivers: self.guest_drivers,
            provider_drivers: self.provider_drivers,
            eip_provider,
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TracingSchedulerClient)),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            ids: self
                .ids
                .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock))),
            cache,
            class_locks,
            config: self.config,
        }))
    }
}
