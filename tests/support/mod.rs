//! Shared test doubles and builders for the integration suite.

// Each integration test binary compiles this module separately and uses a
// different subset of helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration as ChronoDuration, Utc};
use dca_core::cache::{CacheProvider, MemoryCache, PlanCacheInvalidator};
use dca_core::database::TransactionOptions;
use dca_core::events::{
    NotificationError, NotificationPublisher, NotificationSink, PlanNotification,
};
use dca_core::ledger::{LedgerClient, LedgerError, LedgerReceipt, PurchaseOrder};
use dca_core::locking::{DistributedLockManager, InMemoryLockStore};
use dca_core::models::{NewPlan, Plan, PlanStatus, RecurrenceInterval};
use dca_core::pricing::{AssetPair, CachedPriceOracle, PriceFeed, PricingError};
use dca_core::repository::{InMemoryPlanRepository, PlanProgress, PlanRepository, PlanTransaction};
use dca_core::{ExecutionEngine, ExecutionEngineConfig};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn decimal(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

/// Feed that always answers with a fixed price.
pub struct StaticPriceFeed {
    pub price: BigDecimal,
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn fetch_price(&self, _pair: &AssetPair) -> Result<BigDecimal, PricingError> {
        Ok(self.price.clone())
    }

    fn feed_name(&self) -> &'static str {
        "static"
    }
}

/// Feed that fails a fixed number of times before answering.
pub struct FlakyPriceFeed {
    pub failures_remaining: AtomicI32,
    pub price: BigDecimal,
}

impl FlakyPriceFeed {
    pub fn new(failures: i32, price: BigDecimal) -> Self {
        Self {
            failures_remaining: AtomicI32::new(failures),
            price,
        }
    }
}

#[async_trait]
impl PriceFeed for FlakyPriceFeed {
    async fn fetch_price(&self, _pair: &AssetPair) -> Result<BigDecimal, PricingError> {
        if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            Err(PricingError::FeedError("feed offline".to_string()))
        } else {
            Ok(self.price.clone())
        }
    }

    fn feed_name(&self) -> &'static str {
        "flaky"
    }
}

/// Ledger that accepts every order and remembers it.
#[derive(Default)]
pub struct RecordingLedger {
    pub orders: Mutex<Vec<PurchaseOrder>>,
    counter: AtomicU64,
}

#[async_trait]
impl LedgerClient for RecordingLedger {
    async fn submit_purchase(&self, order: &PurchaseOrder) -> Result<LedgerReceipt, LedgerError> {
        self.orders.lock().push(order.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(LedgerReceipt {
            tx_id: format!("tx-{n}"),
            submitted_at: Utc::now(),
        })
    }

    fn client_name(&self) -> &'static str {
        "recording"
    }
}

/// Ledger that rejects every order.
pub struct FailingLedger;

#[async_trait]
impl LedgerClient for FailingLedger {
    async fn submit_purchase(&self, _order: &PurchaseOrder) -> Result<LedgerReceipt, LedgerError> {
        Err(LedgerError::Unavailable("settlement offline".to_string()))
    }

    fn client_name(&self) -> &'static str {
        "failing"
    }
}

/// Ledger that panics for one specific plan and accepts all others, for
/// testing the per-plan failure boundary.
pub struct SelectivePanickingLedger {
    pub panic_plan: Uuid,
    pub inner: RecordingLedger,
}

#[async_trait]
impl LedgerClient for SelectivePanickingLedger {
    async fn submit_purchase(&self, order: &PurchaseOrder) -> Result<LedgerReceipt, LedgerError> {
        if order.plan_id == self.panic_plan {
            panic!("ledger client bug for plan {}", order.plan_id);
        }
        self.inner.submit_purchase(order).await
    }

    fn client_name(&self) -> &'static str {
        "selective-panicking"
    }
}

/// Sink that forwards every notification into a channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<PlanNotification>,
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, notification: &PlanNotification) -> Result<(), NotificationError> {
        self.sender
            .send(notification.clone())
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))
    }

    fn sink_name(&self) -> &'static str {
        "channel"
    }
}

pub fn channel_publisher() -> (
    NotificationPublisher,
    mpsc::UnboundedReceiver<PlanNotification>,
) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        NotificationPublisher::new(Arc::new(ChannelSink { sender })),
        receiver,
    )
}

/// Assemble an engine over the in-memory stack.
pub fn build_engine(
    repository: Arc<InMemoryPlanRepository>,
    locks: DistributedLockManager,
    feed: Arc<dyn PriceFeed>,
    ledger: Arc<dyn LedgerClient>,
) -> (
    Arc<ExecutionEngine<InMemoryPlanRepository>>,
    mpsc::UnboundedReceiver<PlanNotification>,
) {
    let cache = Arc::new(CacheProvider::Memory(MemoryCache::new()));
    let oracle = Arc::new(CachedPriceOracle::new(
        feed,
        Arc::clone(&cache),
        Duration::from_secs(60),
    ));
    let (publisher, receiver) = channel_publisher();
    let engine = ExecutionEngine::with_config(
        repository,
        locks,
        oracle,
        ledger,
        publisher,
        PlanCacheInvalidator::new(cache),
        ExecutionEngineConfig::default(),
    );
    (Arc::new(engine), receiver)
}

pub fn in_memory_locks() -> DistributedLockManager {
    DistributedLockManager::new(Arc::new(InMemoryLockStore::new()))
}

/// Create a plan that is already due, optionally with completed executions.
pub async fn seed_plan(
    repository: &InMemoryPlanRepository,
    executions_completed: i32,
    total_executions: i32,
) -> Plan {
    let due = Utc::now() - ChronoDuration::minutes(5);
    let plan = repository
        .create_plan(NewPlan {
            owner_id: Uuid::new_v4(),
            deposit_asset: "USDC".to_string(),
            target_asset: "BTC".to_string(),
            amount_per_execution: 100_000_000,
            deposit_scale: 6,
            total_executions,
            interval: RecurrenceInterval::Weekly,
            next_execution_at: due,
            ledger_account: None,
        })
        .await
        .unwrap();

    if executions_completed > 0 {
        set_progress(repository, plan.plan_id, executions_completed, PlanStatus::Active).await;
    }
    repository.find_plan(plan.plan_id).await.unwrap().unwrap()
}

/// Force a plan's progress fields, keeping it due.
pub async fn set_progress(
    repository: &InMemoryPlanRepository,
    plan_id: Uuid,
    executions_completed: i32,
    status: PlanStatus,
) {
    set_progress_at(
        repository,
        plan_id,
        executions_completed,
        status,
        Utc::now() - ChronoDuration::minutes(5),
    )
    .await;
}

/// Force a plan's progress fields with an explicit due time.
pub async fn set_progress_at(
    repository: &InMemoryPlanRepository,
    plan_id: Uuid,
    executions_completed: i32,
    status: PlanStatus,
    next_execution_at: chrono::DateTime<Utc>,
) {
    let mut txn = repository
        .begin(&TransactionOptions::default())
        .await
        .unwrap();
    txn.update_plan_progress(
        plan_id,
        PlanProgress {
            executions_completed,
            next_execution_at,
            status,
        },
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();
}
