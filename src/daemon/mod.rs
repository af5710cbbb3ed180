#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Discovery, singleton start and line-delimited JSON queries for the
//! per-project code-intelligence daemon.

mod client;
mod endpoint;
mod lock;

pub use client::{DaemonClient, DaemonSettings, DaemonStatusReport, QueryOutcome, INDEXING_MARKER};
pub use endpoint::{project_hash, tcp_port, DaemonAddress, DaemonEndpoint, TCP_PORT_BASE};
pub use lock::StartLock;
