//! pomelo-session – Client-Sessions
//!
//! - `session`: kanonische Session eines Sockets und die Socket-Schnittstelle
//! - `service`: `SessionService` mit sid- und uid-Index
//! - `context`: `FrontendSession`/`BackendSession` fuer Filter und Handler
//! - `remote`:  `sessionRemote`-RPC-Dienst des Frontends

pub mod context;
pub mod remote;
pub mod service;
pub mod session;

pub use context::{BackendSession, FrontendSession, SessionContext, SessionRef, SESSION_REMOTE};
pub use remote::SessionRemote;
pub use service::{SessionEreignis, SessionService};
pub use session::{
    ExportedSession, KanalSocket, Session, SessionSocket, SessionZustand, SocketBefehl,
};
