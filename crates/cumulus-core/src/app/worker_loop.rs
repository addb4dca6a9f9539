//! WorkerGroup - キューを読んで TaskEngine::execute を回すワーカー群

use super::engine::TaskEngine;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Worker group handle.
/// - `request_shutdown()` で新しい envelope の取り出しを止める
/// - 実行中の stage callback は最後まで走らせる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, engine: TaskEngine, poll_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let engine = engine.clone();
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, engine, poll_interval, &mut rx).await;
            }));
        }
        tracing::info!(workers = n, "worker group started");

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker panicked");
            }
        }
        tracing::info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: TaskEngine,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let queue = engine.queue();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let popped = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            popped = queue.pop(poll_interval) => popped,
        };

        let envelope = match popped {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(err) => {
                tracing::error!(worker_id, error = %err, "queue pop failed");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        let task_id = envelope.task_id;
        if let Err(err) = engine.execute(envelope).await {
            tracing::error!(worker_id, %task_id, error = %err, "execute failed");
        }
    }
}
