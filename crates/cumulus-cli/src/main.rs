use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use cumulus_core::app::{EngineBuilder, TaskEngine, WorkerGroup};
use cumulus_core::config::Config;
use cumulus_core::domain::sku::{PROVIDER_ALIYUN, PROVIDER_OPENSTACK};
use cumulus_core::domain::{Cloudregion, Elasticip, Guest, Host, ShutdownBehavior, TaskId, UserCred};
use cumulus_core::impls::{
    SimulatedEipProvider, SimulatedGuestDriver, SimulatedProviderDriver, StaticSkuCatalog,
};
use cumulus_core::services::Services;
use cumulus_core::sku::{InstanceSpecQuery, ServerSkuManager};
use cumulus_core::tasks::{register_all, start_eip_dissociate_task, start_guest_stop_task};
use tracing_subscriber::EnvFilter;

const HYPERVISOR: &str = "kvm";

/// cn-hangzhou の公開カタログ（抜粋）
const CATALOG: &str = r#"{
  "cn-hangzhou": [
    {"name": "ecs.g6.large", "external_id": "ecs.g6.large", "zone_id": "cn-hangzhou-h",
     "cpu_core_count": 2, "memory_size_mb": 8192, "instance_type_family": "g6",
     "instance_type_category": "general_purpose", "sys_disk_type": "cloud_essd"},
    {"name": "ecs.c6.xlarge", "external_id": "ecs.c6.xlarge", "zone_id": "cn-hangzhou-h",
     "cpu_core_count": 4, "memory_size_mb": 8192, "instance_type_family": "c6",
     "instance_type_category": "compute_optimized"},
    {"name": "ecs.r6.large", "external_id": "ecs.r6.large", "zone_id": "cn-hangzhou-i",
     "cpu_core_count": 2, "memory_size_mb": 16384, "instance_type_family": "r6",
     "instance_type_category": "memory_optimized", "postpaid_status": "soldout"}
  ]
}"#;

async fn report(engine: &TaskEngine, task_id: TaskId) -> Result<(), Box<dyn Error>> {
    let record = engine.wait_terminal(task_id, Duration::from_secs(5)).await?;
    println!(
        "{} {}: state={} stages={:?} message={:?}",
        record.kind,
        record.target,
        record.state.as_str(),
        record.stages,
        record.message
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // (A) Services とエンジン
    let services = Services::builder(config.clone())
        .with_guest_driver(HYPERVISOR, Arc::new(SimulatedGuestDriver::new()))
        .with_eip_provider(Arc::new(SimulatedEipProvider::new()))
        .with_provider_driver(PROVIDER_OPENSTACK, Arc::new(SimulatedProviderDriver::new()))
        .build()?;
    let engine = register_all(EngineBuilder::new(), &services)?.build()?;
    let workers = WorkerGroup::spawn(
        config.engine.workers,
        engine.clone(),
        config.engine.poll_interval(),
    );
    tracing::info!(workers = config.engine.workers, "engine started");
    let cred = UserCred::system();

    // (B) ローカル SKU の初期化と公開カタログの同期
    let manager = ServerSkuManager::new(services.clone());
    manager.initialize_data().await?;

    let region = services
        .stores
        .regions
        .insert(Cloudregion {
            id: services.ids.generate(),
            name: "cn-hangzhou".into(),
            provider: PROVIDER_ALIYUN.into(),
            external_id: "cn-hangzhou".into(),
            manager_id: None,
        })
        .await?;
    let catalog = StaticSkuCatalog::from_json(CATALOG)?;
    let result = manager.sync_server_skus(&cred, &region, &catalog).await;
    println!("sku sync {}: {result}", region.name);

    let specs = manager
        .get_property_instance_specs(InstanceSpecQuery {
            provider: PROVIDER_ALIYUN.into(),
            ..Default::default()
        })
        .await?;
    println!("instance specs: {}", serde_json::to_string(&specs)?);
    for row in manager.fetch_sku_details(region.id).await? {
        println!(
            "  {} cpu={} mem={}MB guests={}",
            row.sku.name,
            row.sku.cpu_core_count,
            row.sku.memory_size_mb,
            row.total_guest_count
        );
    }

    // (C) VM の停止（terminate なので自動削除まで進む）
    let host = services
        .stores
        .hosts
        .insert(Host {
            id: services.ids.generate(),
            name: "host-01".into(),
            zone_id: None,
        })
        .await?;
    let mut guest = Guest::new(services.ids.generate(), "web-01", HYPERVISOR);
    guest.host_id = Some(host.id);
    guest.instance_type = "ecs.g1.c2m4".into();
    guest.disable_delete = false;
    guest.shutdown_behavior = ShutdownBehavior::Terminate;
    let spot = services.stores.guests.insert(guest).await?;
    let stop = start_guest_stop_task(&engine, cred.clone(), spot.id).await?;
    report(&engine, stop).await?;

    // (D) EIP の付け外し（外した後に解放）
    let mut guest = Guest::new(services.ids.generate(), "db-01", HYPERVISOR);
    guest.host_id = Some(host.id);
    let vm = services.stores.guests.insert(guest).await?;
    let mut eip = Elasticip::new(services.ids.generate(), "eip-01");
    eip.external_id = Some("eip-2ze0a1".into());
    eip.associate_id = Some(vm.id);
    let eip = services.stores.eips.insert(eip).await?;
    let dissociate = start_eip_dissociate_task(&engine, cred.clone(), eip.id, true).await?;
    report(&engine, dissociate).await?;

    // 連鎖したタスクの完了を待つ
    for _ in 0..50 {
        if engine.counts().await?.running == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for record in engine.task_store().all().await? {
        println!("  {} {} -> {}", record.kind, record.target, record.state.as_str());
    }
    println!("counts: {:?}", engine.counts().await?);

    workers.shutdown_and_join().await;
    Ok(())
}
