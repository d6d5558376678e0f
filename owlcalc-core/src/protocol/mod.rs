//! Cross-task compute protocol
//!
//! Two single-slot mailboxes connect the caller tasks with the compute task:
//!
//! ```text
//!  caller                      compute task                 engine
//!    │  submit ──► [Request] ──► wait_request                  │
//!    │                              │ ── compute ───────────►  │
//!    │  await_result ◄─ [Response] ◄ complete                  │
//!    │                                                         │
//!  poller  poll ◄── [OutputMessage] ◄──────────────── emit ────┘
//!          done ──► (slot free) ───────────────────────►
//! ```
//!
//! Request ownership is held by a [`PendingCall`] guard from `submit` until
//! the result is collected or the guard is dropped. The output slot is
//! ack-gated: the engine may not overwrite it until the poller calls `done`.

pub mod output;
pub mod request;

pub use output::{EmitError, Emitter, OutputChannel, OutputMessage};
pub use request::{CalcChannel, CallError, PendingCall, Request, Response};
