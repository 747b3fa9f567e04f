//! Cancellable pull-to-push bridge for nested, blocking event sources.
//!
//! A single producer task pulls from a [`PullSource`], runs every item through
//! a transformation callback and pushes the outputs onto a bounded channel.
//! Pulled items may themselves be sources; those are drained on an explicit
//! stack inside the same task before the outer pull resumes. Every source the
//! bridge takes ownership of is closed exactly once, whatever ends the run.
mod bridge;
mod cancellation;
mod source;

pub use bridge::{
    spawn_bridge, BridgeHandle, BridgeOptions, BridgeOutcome, TransformError,
    DEFAULT_BRIDGE_CAPACITY,
};
pub use cancellation::CancellationToken;
pub use source::{BoxedSource, ClosingSource, Pull, PullError, PullSource, Pulled, VecSource};
