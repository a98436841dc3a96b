//! Capability-limited execution of user-submitted programs.
//!
//! Code is an opaque string plus a declared capability set. The only channel
//! between a program and the host is its arguments, its result and the
//! host calls it is allowed to make. Every run is wall-clock bounded by
//! [`SandboxExecutor`], and any failure is reported as "no valid result"
//! rather than an error.

pub mod error;
pub mod executor;
pub mod process;
pub mod runner;

pub use error::{Result, SandboxError};
pub use executor::{
    parse_cost, CostOutcome, ExecutionOutcome, ExecutionStats, ExecutorConfig, SandboxExecutor,
};
pub use process::{ProcessRunner, ProcessRunnerConfig, PYTHON_HARNESS};
pub use runner::{Capability, ExecutionRequest, HostFunctions, NoHost, ProgramRunner};
