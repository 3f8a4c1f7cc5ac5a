//! Observability plumbing shared between the binaries: initialization logic
//! for logging and metrics plus the process-level panic hook.

pub mod metrics;
pub mod panic_hook;
pub mod tracing;
