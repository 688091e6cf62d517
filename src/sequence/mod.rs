//! Pull sequences
//!
//! The contract every merge stage consumes and produces: an explicit
//! `has_more`/`get`/`advance`/`close` pull interface with deterministic
//! single-step advancement and idempotent release.

mod drain;
mod guard;
mod pull;

pub use drain::{close_after_failure, close_logged, drain, Batches};
pub use guard::ReleaseGuard;
pub use pull::{ConcatSequence, PullSequence, VecSequence};

pub(crate) use pull::exhausted;
