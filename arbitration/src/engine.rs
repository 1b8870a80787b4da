//! Arbitration engine — gate, deliberation, plausibility, cascade.
//!
//! A blocked query is answered with the gate's refusal and never reaches
//! an opinion source or the audit sink. Every query that passes the gate
//! runs the full four-round protocol, then the cascade reduces the final
//! votes to one decision.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{OpinionBackend, PolicyAgent, SharedOpinionSource};
use crate::audit::{DebateTranscript, SessionRecorder, SharedAuditSink};
use crate::cascade::{CascadeError, DecisionCascade, VoteSet};
use crate::config::EngineConfig;
use crate::decision::FinalDecision;
use crate::gate::{GateVerdict, InputGate};
use crate::plausibility::PlausibilityReport;
use crate::protocol::{DeliberationProtocol, ProtocolError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of arbitrating one query.
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrationOutcome {
    pub decision: FinalDecision,
    pub gate: GateVerdict,
    /// `None` when the gate blocked the query.
    pub transcript: Option<DebateTranscript>,
    /// `None` when blocked or when plausibility checks are disabled.
    pub plausibility: Option<PlausibilityReport>,
}

impl ArbitrationOutcome {
    pub fn was_blocked(&self) -> bool {
        !self.gate.is_valid
    }

    pub fn debate_id(&self) -> Option<&str> {
        self.transcript.as_ref().map(|t| t.debate_id.as_str())
    }
}

/// Top-level entry point: one query in, one final decision out.
pub struct ArbitrationEngine {
    gate: InputGate,
    protocol: DeliberationProtocol,
    sink: SharedAuditSink,
    config: EngineConfig,
}

impl std::fmt::Debug for ArbitrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrationEngine")
            .field("protocol", &self.protocol)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ArbitrationEngine {
    /// Engine over an explicit, ordered set of sources.
    ///
    /// `config.source_timeout` is not applied here: caller-supplied sources
    /// must bound their own calls, as [`PolicyAgent`] does. Only
    /// `parallel_phases` and `run_plausibility` take effect.
    pub fn new(
        sources: Vec<SharedOpinionSource>,
        sink: SharedAuditSink,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let protocol = DeliberationProtocol::new(sources)?.with_parallel(config.parallel_phases);
        Ok(Self {
            gate: InputGate::new(),
            protocol,
            sink,
            config,
        })
    }

    /// Engine over the standard Utility/Accuracy/Safety panel.
    pub fn with_backend(
        backend: Arc<dyn OpinionBackend>,
        sink: SharedAuditSink,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let sources = PolicyAgent::standard_panel(backend, config.source_timeout);
        Self::new(sources, sink, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source_names(&self) -> Vec<String> {
        self.protocol.names()
    }

    pub async fn evaluate(&self, query: &str) -> EngineResult<ArbitrationOutcome> {
        self.evaluate_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Arbitrate a query; cancellation yields an error and no final decision.
    pub async fn evaluate_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<ArbitrationOutcome> {
        let verdict = self.gate.validate(query);
        if !verdict.is_valid {
            warn!(
                risk_score = verdict.risk_score,
                issues = ?verdict.issue_messages(),
                "Query blocked by input gate"
            );
            return Ok(ArbitrationOutcome {
                decision: verdict.refusal(),
                gate: verdict,
                transcript: None,
                plausibility: None,
            });
        }

        let mut recorder = SessionRecorder::open(Arc::clone(&self.sink), query);
        let deliberation = self
            .protocol
            .run_with_cancel(query, &mut recorder, cancel)
            .await?;

        let plausibility = self
            .config
            .run_plausibility
            .then(|| PlausibilityReport::assess(query, &deliberation.votes, &deliberation.names));

        let votes = VoteSet::new(deliberation.votes, deliberation.names)?;
        let decision = DecisionCascade::evaluate(&votes);
        let transcript = recorder.finish(&decision);

        info!(
            debate_id = %transcript.debate_id,
            decision = %decision.disposition,
            rule = decision.rule_applied().unwrap_or_default(),
            "Arbitration complete"
        );

        Ok(ArbitrationOutcome {
            decision,
            gate: verdict,
            transcript: Some(transcript),
            plausibility,
        })
    }
}
