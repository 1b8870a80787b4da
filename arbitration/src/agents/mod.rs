//! Debate participants.
//!
//! The three agents share one capability ([`OpinionSource`]) and differ
//! only in their [`AgentRole`], which carries the disposition thresholds.

pub mod policy;
pub mod source;

pub use policy::{AgentRole, PolicySignal};
pub use source::{
    Assessment, OpinionBackend, OpinionSource, PolicyAgent, SharedOpinionSource, SourceError,
    DEFAULT_SOURCE_TIMEOUT,
};
