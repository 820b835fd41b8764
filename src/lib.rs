#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DCA Core Rust
//!
//! Distributed execution core for recurring purchase plans: scan what's
//! due, lock it, execute exactly one step per due interval, and leave an
//! append-style audit trail — safely across any number of concurrently
//! running service instances, with no central orchestrator.
//!
//! ## Architecture
//!
//! Every instance runs the same tick loop. A cluster-wide scan lock picks
//! one instance per tick; that instance scans for due plans and drives the
//! execution engine over them sequentially. Each plan's step runs under
//! its own distributed lock and inside one serializable transaction, with
//! the `(plan_id, execution_number)` unique record as the idempotency
//! anchor.
//!
//! ## Key Guarantees
//!
//! - **Exactly-once per due interval**: duplicate ticks and crash retries
//!   replay the stored outcome instead of double-charging
//! - **Cross-instance mutual exclusion**: leases with owner-token
//!   compare-and-delete release, failing closed on backend errors
//! - **Contained failures**: one plan's bad tick never blocks the batch;
//!   transient pricing/ledger failures retry on the plan's own cadence
//! - **Integer money**: smallest-unit amounts in, floor-rounded decimal
//!   conversion out; no binary floating point anywhere near a balance
//!
//! ## Module Organization
//!
//! - [`models`] - plans and execution records
//! - [`repository`] - persistence contract, PostgreSQL + in-memory stores
//! - [`locking`] - distributed lease manager over Redis
//! - [`pricing`] - price oracle with cached fallback
//! - [`ledger`] - opaque settlement interface
//! - [`execution`] - the transactional, idempotent execution engine
//! - [`scheduler`] - due-plan scanner and tick orchestrator
//! - [`cache`] / [`events`] - post-commit invalidation and notifications

pub mod cache;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod execution;
pub mod ledger;
pub mod locking;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod repository;
pub mod scheduler;

pub use config::DcaConfig;
pub use error::{DcaError, Result};
pub use execution::{ExecutionEngine, ExecutionEngineConfig, ExecutionOutcome};
pub use locking::DistributedLockManager;
pub use models::{ExecutionRecord, ExecutionStatus, Plan, PlanStatus, RecurrenceInterval};
pub use repository::{InMemoryPlanRepository, PgPlanRepository, PlanRepository};
pub use scheduler::{DuePlanScanner, SchedulerOrchestrator};
