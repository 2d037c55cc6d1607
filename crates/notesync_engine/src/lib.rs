//! # notesync engine
//!
//! Keeps notes consistent between a local store and a remote server that can
//! only be polled.
//!
//! This crate provides:
//! - A per-key remote poller with timer-driven ticks and no overlapping fetches
//! - A reconciler that merges local and remote updates by version
//! - A registry guaranteeing one poller per key, with optional eviction
//! - Fire-and-forget remote writes, one in flight per key
//! - HTTP transport abstraction and an in-memory mock remote
//!
//! ## Architecture
//!
//! ```text
//!   LocalStore cell ──────────────┐
//!                                 ├─► Reconciler ──► merged cell (SyncedNote)
//!   Poller ── remote cell ────────┘        │
//!                                          └─► LocalStore::upsert_if_newer(remote)
//! ```
//!
//! ## Key Invariants
//!
//! - Version is the only conflict authority; a strictly higher version wins
//! - Remote copies are applied without a version bump; user saves bump by one
//! - Readers of the merged view never see the version go down
//! - At most one poller and one in-flight fetch per key
//! - Remote failures never fail a local save and never stop a poller

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod outbound;
mod poller;
mod reconciler;
mod registry;
mod transport;

pub use config::{
    EvictionPolicy, SyncConfig, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use engine::NoteSync;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use notesync_store::{LocalStore, Note, NoteStore};
pub use poller::{PollerHandle, PollerStats};
pub use reconciler::{should_accept, Reconciler, SyncedNote};
pub use registry::{PollerRegistry, SyncEntry};
pub use transport::{MockTransport, NoteTransport};
