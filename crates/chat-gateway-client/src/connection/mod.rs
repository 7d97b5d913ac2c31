//! Connection lifecycle
//!
//! State machine, resumable session data, reconnect backoff and the fault
//! signal shared by the per-connection tasks.

mod backoff;
mod fault;
mod session;
mod state;

pub use backoff::Backoff;
pub(crate) use fault::Fault;
pub use session::{SequenceCheck, SessionState};
pub use state::ConnectionState;
