//! Sandbox module - ephemeral hardened execution environments
//!
//! One Docker container per request: created hardened, source injected as a
//! tar archive, compile and run phases executed with independent timeouts,
//! torn down unconditionally.

mod docker;
mod executor;
mod lifecycle;
pub mod stream;
pub mod substrate;

pub use docker::DockerSubstrate;
pub use executor::{Compiler, ExecutionOutcome, ExecutionRequest, PhaseResult, PhasedExecutor};
pub use lifecycle::{Sandbox, SETTLE_DELAY};
pub use substrate::{ExecHandle, OutputStream, SandboxHandle, SecurityPolicy, Substrate};
