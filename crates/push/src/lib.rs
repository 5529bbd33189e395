//! pomelo-push – Zustellung kodierter Pakete an Sessions
//!
//! - `scheduler`: `Scheduler`-Trait und Broadcast-Filter
//! - `direct`:    sofortiges Schreiben
//! - `buffer`:    Warteschlangen pro Session mit periodischem Batch-Flush
//! - `component`: Einzel- oder Auswahlbetrieb mehrerer Scheduler

pub mod buffer;
pub mod component;
pub mod direct;
pub mod scheduler;

pub use buffer::{BufferPushScheduler, STANDARD_FLUSH_INTERVALL};
pub use component::{PushSchedulerComponent, SchedulerSelektor};
pub use direct::DirectPushScheduler;
pub use scheduler::{BroadcastFilter, Scheduler};
