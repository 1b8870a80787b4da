//! Arbitration Library
//!
//! Answers whether a query should be acted on by running it through:
//! - an adversarial input gate that can refuse outright
//! - a four-round debate between Utility, Accuracy and Safety agents
//! - advisory plausibility checks on the agents' confidence claims
//! - a deterministic, veto-aware decision cascade
//!
//! # Rounds
//!
//! 1. Initial Analysis: each agent decides independently
//! 2. Challenge Round: every agent challenges every other agent
//! 3. Revision: each agent revises against the challenges it received
//! 4. Final Voting: revised decisions become votes for the cascade
//!
//! The outcome is always one of ACT, WARN or REFUSE. Every step of the
//! debate is reported to an [`AuditSink`].
//!
//! # Usage
//!
//! ```ignore
//! let engine = ArbitrationEngine::with_backend(backend, AuditLog::new().shared(), EngineConfig::from_env())?;
//! let outcome = engine.evaluate("Should we roll out the cache change?").await?;
//! println!("{}: {}", outcome.decision.disposition, outcome.decision.reasoning);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod audit;
pub mod cascade;
pub mod config;
pub mod decision;
pub mod engine;
pub mod gate;
pub mod plausibility;
pub mod protocol;

pub use agents::{
    AgentRole, Assessment, OpinionBackend, OpinionSource, PolicyAgent, SharedOpinionSource,
    SourceError,
};
pub use audit::{
    AuditEvent, AuditLog, AuditRecord, AuditSink, DebateTranscript, SessionRecorder,
    SharedAuditSink, TracingAuditSink,
};
pub use cascade::{CascadeError, CascadeRule, DecisionCascade, VoteSet};
pub use config::EngineConfig;
pub use decision::{Decision, Disposition, FinalDecision, FinalDisposition};
pub use engine::{ArbitrationEngine, ArbitrationOutcome, EngineError, EngineResult};
pub use gate::{GateVerdict, InputGate, Recommendation, ThreatCategory};
pub use plausibility::PlausibilityReport;
pub use protocol::{
    DebatePhase, DebateSession, Deliberation, DeliberationProtocol, ProtocolError,
    ProtocolResult,
};
