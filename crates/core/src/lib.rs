//! pomelo-core – Gemeinsame Typen, Fehler und Synchronisationsbausteine
//!
//! Dieses Crate stellt die Bausteine bereit, die alle anderen Pomelo-Crates
//! teilen: ID-Typen, den zentralen Fehler-Enum, den `CountDownLatch`, die
//! RPC-Grenze und den expliziten Anwendungskontext.

pub mod context;
pub mod error;
pub mod latch;
pub mod push;
pub mod rpc;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use context::AppContext;
pub use error::{PomeloError, PomeloResult};
pub use latch::{CountDownLatch, LatchAusloeser};
pub use push::{PushArt, PushOptions};
pub use rpc::{DisconnectedRpc, InProcessRpc, RemoteDispatch, RpcInvoker, RpcMessage};
pub use types::{ServerId, ServerInfo, SessionId};
