//! pomelo-dispatch – Routing und Verarbeitung von Client-Nachrichten
//!
//! Dieses Crate implementiert:
//! - `RouteRecord`: Zerlegung von `serverTyp.handler.methode`
//! - `FilterService`: Before-/After-Ketten
//! - `HandlerService`: Registry der Geschaeftsfunktionen
//! - `Server`: globaler und lokaler Dispatch-Pfad inkl. Weiterleitung
//! - `ServerRouter`: Auswahl des Zielservers
//! - `MsgRemote`: Empfang weitergeleiteter Nachrichten

pub mod filter;
pub mod handler;
pub mod remote;
pub mod route;
pub mod router;
pub mod server;

#[cfg(test)]
mod tests;

pub use filter::{AfterFilter, BeforeFilter, FilterService};
pub use handler::{ArgsHandler, Handler, HandlerService};
pub use remote::MsgRemote;
pub use route::{ClientMessage, RouteRecord};
pub use router::{HashRoute, RouteFunktion, ServerRouter};
pub use server::{ErrorHandler, Server, ServerZustand, MSG_REMOTE};
