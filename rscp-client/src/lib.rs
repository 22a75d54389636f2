//! # rscp-client
//!
//! Client library for RSCP power stations.
//!
//! This crate provides:
//! - The chained block cipher session with Rijndael-256 and AES-256 primitives
//! - A stream reassembler turning TCP reads into validated frames
//! - Request builders for authentication, live power and history queries
//! - Response routing into a pluggable report sink
//! - The authenticate-then-request session loop over an async transport

pub mod cipher;
pub mod connection;
pub mod error;
pub mod reassembler;
pub mod report;
pub mod request;
pub mod rijndael;
pub mod router;
pub mod session;

#[cfg(test)]
mod test_support;

pub use cipher::{Aes256Cbc, BlockCipher, ChainedCipher};
pub use connection::{ConnectionConfig, StreamTransport, Transport};
pub use error::ClientError;
pub use reassembler::{Reassembler, ReceiveState};
pub use report::{BatteryReading, CollectedReport, HistoryRecord, PowerKind, ReportSink};
pub use request::{DataRequest, HistoryKind, HistoryRange};
pub use rijndael::Rijndael256Cbc;
pub use router::Router;
pub use session::{Credentials, RunSummary, Session, SessionOptions, SessionState};
