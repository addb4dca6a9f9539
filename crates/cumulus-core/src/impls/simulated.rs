//! Simulated cloud adapters - 実機なしでタスクを動かすためのドライバ
//!
//! 呼び出しを記録し、振る舞い（成功 / 失敗 / NotFound）を実行時に切り替えられます。
//! デモ用 CLI とテストの両方で使います。

use crate::app::TaskCallback;
use crate::domain::{
    Cloudprovider, Cloudregion, CumulusError, Elasticip, Guest, GuestId, GuestStatus, Host,
    HostId, Result, ServerSku,
};
use crate::ports::{CloudEip, CloudProviderDriver, EipProvider, GuestDriver, SchedulerClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// host 上の操作の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverBehavior {
    /// 依頼を受け付け、すぐに callback.complete
    Complete,
    /// 依頼そのものを拒否（戻り値 Err）
    RejectRequest(String),
    /// 依頼は受け付けるが callback.fail
    FailAsync(String),
}

pub struct SimulatedGuestDriver {
    behavior: Mutex<DriverBehavior>,
    /// None なら request_sync_status がエラー
    sync_status: Mutex<Option<GuestStatus>>,
    stop_requests: Mutex<Vec<(GuestId, HostId)>>,
    undeploy_requests: Mutex<Vec<GuestId>>,
}

impl Default for SimulatedGuestDriver {
    fn default() -> Self {
        Self {
            behavior: Mutex::new(DriverBehavior::Complete),
            sync_status: Mutex::new(Some(GuestStatus::Running)),
            stop_requests: Mutex::new(Vec::new()),
            undeploy_requests: Mutex::new(Vec::new()),
        }
    }
}

impl SimulatedGuestDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_behavior(&self, behavior: DriverBehavior) {
        *self.behavior.lock().await = behavior;
    }

    pub async fn set_sync_status(&self, status: Option<GuestStatus>) {
        *self.sync_status.lock().await = status;
    }

    pub async fn stop_requests(&self) -> Vec<(GuestId, HostId)> {
        self.stop_requests.lock().await.clone()
    }

    pub async fn undeploy_requests(&self) -> Vec<GuestId> {
        self.undeploy_requests.lock().await.clone()
    }

    async fn respond(&self, callback: TaskCallback) -> Result<()> {
        let behavior = self.behavior.lock().await.clone();
        match behavior {
            DriverBehavior::Complete => callback.complete(Value::Null).await,
            DriverBehavior::RejectRequest(reason) => Err(CumulusError::remote(reason)),
            DriverBehavior::FailAsync(reason) => callback.fail(reason).await,
        }
    }
}

#[async_trait]
impl GuestDriver for SimulatedGuestDriver {
    async fn request_stop_on_host(
        &self,
        guest: &Guest,
        host: &Host,
        callback: TaskCallback,
    ) -> Result<()> {
        self.stop_requests.lock().await.push((guest.id, host.id));
        tracing::debug!(guest = %guest.name, host = %host.name, "simulated stop");
        self.respond(callback).await
    }

    async fn request_undeploy_guest_on_host(
        &self,
        guest: &Guest,
        host: &Host,
        callback: TaskCallback,
    ) -> Result<()> {
        self.undeploy_requests.lock().await.push(guest.id);
        tracing::debug!(guest = %guest.name, host = %host.name, "simulated undeploy");
        self.respond(callback).await
    }

    async fn request_sync_status(&self, guest: &Guest) -> Result<GuestStatus> {
        self.sync_status
            .lock()
            .await
            .ok_or_else(|| {
                CumulusError::remote(format!("failed to query status of {}", guest.name))
            })
    }
}

/// リモート EIP の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EipMode {
    Associated,
    Unassociated,
    NotFound,
    LookupError,
    DissociateError,
    DeleteError,
}

#[derive(Debug, Default)]
struct EipCalls {
    dissociate: AtomicUsize,
    delete: AtomicUsize,
}

pub struct SimulatedEipProvider {
    mode: Mutex<EipMode>,
    calls: Arc<EipCalls>,
}

impl Default for SimulatedEipProvider {
    fn default() -> Self {
        Self {
            mode: Mutex::new(EipMode::Associated),
            calls: Arc::new(EipCalls::default()),
        }
    }
}

impl SimulatedEipProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_mode(&self, mode: EipMode) {
        *self.mode.lock().await = mode;
    }

    pub fn dissociate_calls(&self) -> usize {
        self.calls.dissociate.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EipProvider for SimulatedEipProvider {
    async fn get_ieip(&self, eip: &Elasticip) -> Result<Arc<dyn CloudEip>> {
        let mode = *self.mode.lock().await;
        match mode {
            EipMode::NotFound => Err(CumulusError::not_found("eip", eip.id)),
            EipMode::LookupError => Err(CumulusError::remote("api throttled")),
            _ => Ok(Arc::new(SimulatedCloudEip {
                external_id: eip
                    .external_id
                    .clone()
                    .unwrap_or_else(|| eip.id.to_string()),
                mode,
                calls: self.calls.clone(),
            })),
        }
    }
}

struct SimulatedCloudEip {
    external_id: String,
    mode: EipMode,
    calls: Arc<EipCalls>,
}

#[async_trait]
impl CloudEip for SimulatedCloudEip {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn association_external_id(&self) -> Option<String> {
        match self.mode {
            EipMode::Unassociated => None,
            _ => Some(format!("i-{}", self.external_id)),
        }
    }

    async fn dissociate(&self) -> Result<()> {
        if self.mode == EipMode::DissociateError {
            return Err(CumulusError::remote("eip is locked"));
        }
        self.calls.dissociate.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.mode == EipMode::DeleteError {
            return Err(CumulusError::remote("eip is in use"));
        }
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// フレーバー削除の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDeleteMode {
    Ok,
    NotFound,
    Error,
}

pub struct SimulatedProviderDriver {
    delete_mode: Mutex<RemoteDeleteMode>,
    fail_create: Mutex<bool>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<(String, String)>>,
}

impl Default for SimulatedProviderDriver {
    fn default() -> Self {
        Self {
            delete_mode: Mutex::new(RemoteDeleteMode::Ok),
            fail_create: Mutex::new(false),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

impl SimulatedProviderDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_delete_mode(&self, mode: RemoteDeleteMode) {
        *self.delete_mode.lock().await = mode;
    }

    pub async fn fail_create(&self, fail: bool) {
        *self.fail_create.lock().await = fail;
    }

    /// 作成したフレーバーの external id
    pub async fn created(&self) -> Vec<String> {
        self.created.lock().await.clone()
    }

    /// (provider name, sku name)
    pub async fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl CloudProviderDriver for SimulatedProviderDriver {
    async fn create_sku(
        &self,
        provider: &Cloudprovider,
        region: &Cloudregion,
        sku: &ServerSku,
    ) -> Result<String> {
        if *self.fail_create.lock().await {
            return Err(CumulusError::remote(format!(
                "quota exceeded on {}",
                provider.name
            )));
        }
        let external_id = format!("{}/{}/{}", provider.name, region.name, sku.name);
        self.created.lock().await.push(external_id.clone());
        Ok(external_id)
    }

    async fn delete_sku(&self, provider: &Cloudprovider, sku: &ServerSku) -> Result<()> {
        match *self.delete_mode.lock().await {
            RemoteDeleteMode::Ok => {
                self.deleted
                    .lock()
                    .await
                    .push((provider.name.clone(), sku.name.clone()));
                Ok(())
            }
            RemoteDeleteMode::NotFound => Err(CumulusError::not_found("flavor", &sku.name)),
            RemoteDeleteMode::Error => Err(CumulusError::remote("flavor is in use")),
        }
    }
}

/// 通知を記録するだけのスケジューラ
#[derive(Debug, Default)]
pub struct RecordingSchedulerClient {
    cleared_hosts: Mutex<Vec<HostId>>,
    sku_syncs: AtomicUsize,
}

impl RecordingSchedulerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cleared_hosts(&self) -> Vec<HostId> {
        self.cleared_hosts.lock().await.clone()
    }

    pub fn sku_syncs(&self) -> usize {
        self.sku_syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulerClient for RecordingSchedulerClient {
    async fn clear_host_sched_desc_cache(&self, host_id: HostId) -> Result<()> {
        self.cleared_hosts.lock().await.push(host_id);
        Ok(())
    }

    async fn sync_skus(&self, _wait: bool) -> Result<()> {
        self.sku_syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
