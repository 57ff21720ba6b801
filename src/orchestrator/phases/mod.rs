//! Workflow stages, one module per mutating or gating step.
//!
//! - `preconditions` - balance, program account and keypair gate
//! - `build` - external build tool, artifact location and digest
//! - `publish` - chain CLI submission plus mandatory read-back
//!
//! Each stage takes its collaborators explicitly so it can be tested alone.

pub mod build;
pub mod preconditions;
pub mod publish;

pub use build::{locate_artifact, run_build};
pub use preconditions::check_preconditions;
pub use publish::{run_publish, PublishOutcome, PublishOutput};
