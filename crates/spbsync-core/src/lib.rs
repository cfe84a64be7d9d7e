//! SPB Sync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `FormRecord`, `FormDraft`, `SpbDocument`, `SyncStats`
//! - **Legacy layout** - the key family used by the first storage generation
//! - **Port definitions** - Traits for adapters: `IFormRepository`,
//!   `IKeyValueStore`, `IConnectivityMonitor`, `ISubmissionClient`,
//!   `ISpbSource`, `ISpbCache`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement; the sync
//! engine in `spbsync-sync` drives them.

pub mod config;
pub mod domain;
pub mod ports;
