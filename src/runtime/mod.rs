//! Runtime: everything that runs after a script has been compiled —
//! loading programs, running the async-action dispatch loop, and the
//! attach/watchpoint controllers that wire compiled programs to live
//! kernel/process state.

pub mod attach;
pub mod dispatcher;
pub mod handlers;
#[cfg(feature = "runtime")]
pub mod helpers;
pub mod histogram;
#[cfg(feature = "runtime")]
pub mod program;
pub mod ring_buffer;
pub mod trace_context;
#[cfg(feature = "watchpoint")]
pub mod watchpoint;
