//! Fans feed events out to worker shards.
//!
//! A token always lands on the same shard, and each shard owns its own
//! `PositionManager`, so ticks for one token are applied in arrival order by
//! a single writer while different tokens proceed in parallel. All shards
//! share one portfolio guard, so loss limits and slots are portfolio-wide.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineSettings;
use crate::domain::{Decision, FeedEvent};
use crate::manager::PositionManager;
use crate::risk::{PortfolioGuard, SharedGuard};
use crate::strategy::build_model;

pub struct Router {
    shards: Vec<mpsc::Sender<FeedEvent>>,
    handles: Vec<JoinHandle<PositionManager>>,
    guard: SharedGuard,
}

pub fn shard_for(token_id: &str, shards: usize) -> usize {
    let mut h = DefaultHasher::new();
    token_id.hash(&mut h);
    (h.finish() % shards.max(1) as u64) as usize
}

impl Router {
    pub fn spawn(
        settings: EngineSettings,
        shards: usize,
        capacity: usize,
        decisions: mpsc::Sender<Decision>,
    ) -> Result<Self> {
        if shards == 0 {
            return Err(anyhow!("router needs at least one shard"));
        }
        let guard = PortfolioGuard::shared(settings.risk.clone());
        let mut senders = Vec::with_capacity(shards);
        let mut handles = Vec::with_capacity(shards);

        for id in 0..shards {
            let model = build_model(settings.momentum_model, settings.momentum_period);
            let manager = PositionManager::with_guard(settings.clone(), model, guard.clone())?;

            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_shard(id, manager, rx, decisions.clone())));
        }

        info!(shards, capacity, "router.start");
        Ok(Self {
            shards: senders,
            handles,
            guard,
        })
    }

    pub async fn dispatch(&self, event: FeedEvent) -> Result<()> {
        let idx = shard_for(event.token_id(), self.shards.len());
        self.shards[idx]
            .send(event)
            .await
            .map_err(|_| anyhow!("shard {idx} stopped"))
    }

    pub fn guard(&self) -> PortfolioGuard {
        self.guard.lock().clone()
    }

    /// Closes the inputs and waits for every shard to drain.
    pub async fn shutdown(self) -> Result<Vec<PositionManager>> {
        drop(self.shards);
        let mut managers = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            managers.push(handle.await?);
        }
        info!(shards = managers.len(), "router.stopped");
        Ok(managers)
    }
}

async fn run_shard(
    id: usize,
    mut manager: PositionManager,
    mut rx: mpsc::Receiver<FeedEvent>,
    decisions: mpsc::Sender<Decision>,
) -> PositionManager {
    while let Some(event) = rx.recv().await {
        let out = match event {
            FeedEvent::Entry(req) => match manager.open(&req) {
                Ok(d) => vec![d],
                Err(e) => {
                    warn!(shard = id, token = %req.token_id, error = %e, "router.entry_rejected");
                    Vec::new()
                }
            },
            FeedEvent::Tick(tick) => manager.on_tick(&tick),
        };
        for d in out {
            if decisions.send(d).await.is_err() {
                warn!(shard = id, "router.decisions_closed");
                return manager;
            }
        }
    }
    manager
}
