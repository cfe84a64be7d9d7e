//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IFormRepository`] - Durable form record storage (SQLite or legacy KV)
//! - [`IKeyValueStore`] - String-keyed persisted map, plus [`legacy_layout`]
//!   helpers for the first-generation record layout
//! - [`IConnectivityMonitor`] - Reachability and change notifications
//! - [`ISubmissionClient`] - Remote adjust and already-processed check
//! - [`ISpbSource`] / [`ISpbCache`] - SPB document list and its local copy

pub mod connectivity;
pub mod form_repository;
pub mod key_value_store;
pub mod legacy_layout;
pub mod submission;

pub use connectivity::{ConnectivityState, IConnectivityMonitor, Transport};
pub use form_repository::IFormRepository;
pub use key_value_store::IKeyValueStore;
pub use submission::{AdjustRequest, ISpbCache, ISpbSource, ISubmissionClient, SubmissionError};
