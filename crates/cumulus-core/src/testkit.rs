//! テスト用の環境とフィクスチャ

use crate::app::{EngineBuilder, TaskEngine};
use crate::config::Config;
use crate::domain::{
    Cloudprovider, Cloudregion, EipId, Elasticip, Guest, GuestId, Host, HostId, ProviderId,
    RegionId, ServerSku, SkuId, UserCred,
};
use crate::impls::MemoryEventSink;
use crate::ports::{CatalogSku, IdGenerator, SystemClock, UlidGenerator};
use crate::services::Services;
use crate::sku::ServerSkuManager;
use crate::tasks::register_all;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use ulid::Ulid;

pub use crate::impls::{
    DriverBehavior, EipMode, RecordingSchedulerClient, RemoteDeleteMode, SimulatedEipProvider,
    SimulatedGuestDriver, SimulatedProviderDriver,
};

pub const HYPERVISOR: &str = "kvm";

const IDLE: Duration = Duration::from_millis(20);

/// フィクスチャの id も作成順に並ぶように
static IDS: LazyLock<UlidGenerator<SystemClock>> =
    LazyLock::new(|| UlidGenerator::new(SystemClock));

fn next_ulid() -> Ulid {
    IDS.next_ulid()
}

/// 全タスクを登録したエンジンと、記録型のドライバ一式
pub struct TestEnv {
    pub services: Arc<Services>,
    pub engine: TaskEngine,
    pub cred: UserCred,
    pub events: Arc<MemoryEventSink>,
    pub guest_driver: Arc<SimulatedGuestDriver>,
    pub eip_provider: Arc<SimulatedEipProvider>,
    pub provider_driver: Arc<SimulatedProviderDriver>,
    pub scheduler: Arc<RecordingSchedulerClient>,
}

impl TestEnv {
    pub fn new() -> Self {
        let config = Config::default();
        let events = Arc::new(MemoryEventSink::new());
        let guest_driver = Arc::new(SimulatedGuestDriver::new());
        let eip_provider = Arc::new(SimulatedEipProvider::new());
        let provider_driver = Arc::new(SimulatedProviderDriver::new());
        let scheduler = Arc::new(RecordingSchedulerClient::new());

        let mut builder = Services::builder(config.clone())
            .with_guest_driver(HYPERVISOR, guest_driver.clone())
            .with_eip_provider(eip_provider.clone())
            .with_scheduler(scheduler.clone())
            .with_events(events.clone());
        for provider in &config.sku.private_cloud_providers {
            builder = builder.with_provider_driver(provider.clone(), provider_driver.clone());
        }
        let services = builder.build().unwrap();
        let engine = register_all(EngineBuilder::new(), &services)
            .unwrap()
            .build()
            .unwrap();

        Self {
            services,
            engine,
            cred: UserCred::new("alice", "demo"),
            events,
            guest_driver,
            eip_provider,
            provider_driver,
            scheduler,
        }
    }

    pub fn sku_manager(&self) -> ServerSkuManager {
        ServerSkuManager::new(self.services.clone())
    }

    pub async fn run_until_idle(&self) {
        self.engine.run_until_idle(IDLE).await.unwrap();
    }

    pub async fn default_region(&self) -> Cloudregion {
        self.sku_manager().ensure_default_region().await.unwrap()
    }

    pub async fn insert_region(
        &self,
        name: &str,
        provider: &str,
        external_id: &str,
        manager_id: Option<ProviderId>,
    ) -> Cloudregion {
        let region = Cloudregion {
            id: RegionId::from_ulid(next_ulid()),
            name: name.to_string(),
            provider: provider.to_string(),
            external_id: external_id.to_string(),
            manager_id,
        };
        self.services.stores.regions.insert(region).await.unwrap()
    }

    pub async fn insert_provider(
        &self,
        name: &str,
        provider: &str,
        enabled: bool,
    ) -> Cloudprovider {
        let provider = Cloudprovider {
            id: ProviderId::from_ulid(next_ulid()),
            name: name.to_string(),
            provider: provider.to_string(),
            enabled,
        };
        self.services.stores.providers.insert(provider).await.unwrap()
    }

    pub async fn insert_host(&self, name: &str, zone_id: Option<&str>) -> Host {
        let host = Host {
            id: HostId::from_ulid(next_ulid()),
            name: name.to_string(),
            zone_id: zone_id.map(str::to_string),
        };
        self.services.stores.hosts.insert(host).await.unwrap()
    }

    pub async fn insert_guest(&self, name: &str, host_id: Option<HostId>) -> Guest {
        let mut guest = Guest::new(GuestId::from_ulid(next_ulid()), name, HYPERVISOR);
        guest.host_id = host_id;
        self.services.stores.guests.insert(guest).await.unwrap()
    }

    pub async fn replace_guest(&self, guest: Guest) {
        self.services
            .stores
            .guests
            .update_with_lock(guest.id, Box::new(move |g: &mut Guest| *g = guest))
            .await
            .unwrap();
    }

    pub async fn insert_eip(&self, name: &str, associate_id: Option<GuestId>) -> Elasticip {
        let mut eip = Elasticip::new(EipId::from_ulid(next_ulid()), name);
        eip.external_id = Some(format!("eip-ext-{name}"));
        eip.associate_id = associate_id;
        self.services.stores.eips.insert(eip).await.unwrap()
    }

    pub async fn replace_eip(&self, eip: Elasticip) {
        self.services
            .stores
            .eips
            .update_with_lock(eip.id, Box::new(move |e: &mut Elasticip| *e = eip))
            .await
            .unwrap();
    }
}

/// 名前は形から決まる（`<provider>.c<cpu>m<mem>`）
pub fn sku(provider: &str, region_id: RegionId, cpu: u32, memory_mb: u32) -> ServerSku {
    ServerSku::new(
        SkuId::from_ulid(next_ulid()),
        format!("{}.c{cpu}m{memory_mb}", provider.to_lowercase()),
        provider,
        region_id,
        cpu,
        memory_mb,
    )
}

pub fn catalog_sku(name: &str, external_id: Option<&str>, cpu: u32, memory_mb: u32) -> CatalogSku {
    CatalogSku {
        name: name.to_string(),
        external_id: external_id.map(str::to_string),
        zone_id: None,
        cpu_core_count: cpu,
        memory_size_mb: memory_mb,
        prepaid_status: Default::default(),
        postpaid_status: Default::default(),
        instance_type_family: String::new(),
        instance_type_category: String::new(),
        spec: Default::default(),
    }
}

/// エンジン単体のテストに使う最小のタスク
pub mod fixtures {
    use crate::app::{EngineBuilder, TaskContext, TaskEngine};
    use crate::domain::{CumulusError, Result};
    use crate::typed::Task;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    crate::task_stages! {
        pub enum SingleStage {
            Init => "init",
        }
    }

    crate::task_stages! {
        pub enum TwoStage {
            Init => "init",
            OnSecond => "on_second",
        }
    }

    crate::task_stages! {
        pub enum ParentStage {
            Init => "init",
            OnChildComplete => "on_child_complete",
        }
    }

    /// すぐに `{"echo": true}` で完了
    pub struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        const KIND: &'static str = "EchoTask";
        type Stage = SingleStage;
        const INIT: SingleStage = SingleStage::Init;

        async fn on_stage(
            &self,
            _stage: SingleStage,
            ctx: &mut TaskContext,
            _data: Value,
        ) -> Result<()> {
            ctx.set_stage_complete(json!({"echo": true}))
        }
    }

    /// params.n + 1 を次の stage に渡して完了
    pub struct TwoStageTask;

    #[async_trait]
    impl Task for TwoStageTask {
        const KIND: &'static str = "TwoStageTask";
        type Stage = TwoStage;
        const INIT: TwoStage = TwoStage::Init;

        async fn on_stage(
            &self,
            stage: TwoStage,
            ctx: &mut TaskContext,
            data: Value,
        ) -> Result<()> {
            match stage {
                TwoStage::Init => {
                    let n = ctx.params().get("n").and_then(Value::as_u64).unwrap_or(0);
                    ctx.continue_with(TwoStage::OnSecond, json!({"n": n + 1}))
                }
                TwoStage::OnSecond => ctx.set_stage_complete(data),
            }
        }
    }

    pub struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        const KIND: &'static str = "FailingTask";
        type Stage = SingleStage;
        const INIT: SingleStage = SingleStage::Init;

        async fn on_stage(
            &self,
            _stage: SingleStage,
            _ctx: &mut TaskContext,
            _data: Value,
        ) -> Result<()> {
            Err(CumulusError::internal("always fails"))
        }
    }

    /// params.child の子タスクを起動し、その結果で完了する
    pub struct ParentTask;

    #[async_trait]
    impl Task for ParentTask {
        const KIND: &'static str = "ParentTask";
        type Stage = ParentStage;
        const INIT: ParentStage = ParentStage::Init;

        async fn on_stage(
            &self,
            stage: ParentStage,
            ctx: &mut TaskContext,
            data: Value,
        ) -> Result<()> {
            match stage {
                ParentStage::Init => {
                    let child = ctx
                        .params()
                        .get("child")
                        .and_then(Value::as_str)
                        .unwrap_or(EchoTask::KIND)
                        .to_string();
                    ctx.set_stage(ParentStage::OnChildComplete)?;
                    ctx.spawn_subtask(&child, ctx.target(), json!({})).await?;
                    Ok(())
                }
                ParentStage::OnChildComplete => {
                    ctx.set_stage_complete(json!({"child_result": data}))
                }
            }
        }

        async fn on_stage_failed(
            &self,
            _stage: ParentStage,
            ctx: &mut TaskContext,
            reason: String,
        ) -> Result<()> {
            ctx.set_stage_failed(format!("child failed: {reason}"))
        }
    }

    pub fn engine_with_fixtures() -> TaskEngine {
        EngineBuilder::new()
            .register(EchoTask)
            .and_then(|b| b.register(TwoStageTask))
            .and_then(|b| b.register(FailingTask))
            .and_then(|b| b.register(ParentTask))
            .unwrap()
            .expect_tasks(&[
                EchoTask::KIND,
                TwoStageTask::KIND,
                FailingTask::KIND,
                ParentTask::KIND,
            ])
            .build()
            .unwrap()
    }
}
