//! Sandboxed JavaScript execution
//!
//! - `protocol` - JSON-line envelopes exchanged across the boundary
//! - `guest` - the isolated side, an embedded interpreter per run
//! - `executor` - the host side, correlating replies with pending calls
//!
//! # Architecture
//!
//! ```text
//! ToolDispatcher(run_code) → SandboxExecutor.execute(code)
//!                  ↓
//!           {"type":"run"} line → guest thread / sandbox_guest process
//!                  ↓
//!           fresh boa Context → console capture → return value or error
//!                  ↓
//!           {"type":"result"} line → listener → pending[id] resolved once
//! ```

pub mod executor;
pub mod guest;
pub mod protocol;

pub use executor::{SandboxError, SandboxExecutor};
pub use guest::GuestLimits;
pub use protocol::{Envelope, ExecutionOutcome, LogEntry};
