//! # Health Sync
//!
//! Client-side synchronization of on-device health metrics to a remote
//! ingestion API.
//!
//! Samples are read from a local health data store over a date window,
//! normalized into one canonical record schema, split into bounded
//! batches, and uploaded with bounded per-batch retry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ HealthStore  │──▶│    Fetch     │──▶│    Batch     │──▶│  /ingest   │
//! │ 15 queries   │   │ convert+merge│   │   uploader   │   │  endpoint  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └────────────┘
//!         ▲                                     ▲
//!         └──────────── SyncCoordinator ────────┘
//!                 (credential, authorization, status)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hsync types                    # list tracked data types and units
//! hsync authorize                # fetch a token, request permission
//! hsync sync --days 7            # upload the last week
//! hsync sync --dry-run           # fetch only, print per-type counts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Raw samples, canonical data points, sync results |
//! | [`metrics`] | Tracked metric catalogue and query plan |
//! | [`units`] | Units of measure and quantity conversion |
//! | [`convert`] | Raw sample → canonical data point |
//! | [`store`] | Local health store trait and JSON export store |
//! | [`fetch`] | Concurrent per-type fetch and merge |
//! | [`retry`] | Upload retry policy |
//! | [`upload`] | Batched upload with retry and aggregation |
//! | [`credential`] | Upload token sources |
//! | [`coordinator`] | Sync state machine and observable status |
//! | [`progress`] | CLI status reporting |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error taxonomy |

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod retry;
pub mod store;
pub mod units;
pub mod upload;
