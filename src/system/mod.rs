//! System module: external process invocation.

pub mod process;

pub use process::{OutputMode, ProcessOutcome, ProcessRunner, ProcessSpec, TokioProcessRunner};
