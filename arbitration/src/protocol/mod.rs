//! Four-round deliberation protocol.
//!
//! Runs initial analysis, the pairwise challenge round, revision and final
//! voting over a fixed, ordered set of opinion sources. Phases are strictly
//! sequential. Independent calls inside a phase may run concurrently, but
//! results are always reassembled in source order before the next phase
//! starts, and audit records for a phase are only emitted once its fan-out
//! has completed.

pub mod state;

use std::collections::HashSet;
use std::future::Future;

use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::SharedOpinionSource;
use crate::audit::{AuditEvent, ChallengeEntry, DecisionEntry, RevisionEntry, SessionRecorder};
use crate::decision::Decision;

pub use state::{DebatePhase, DebateSession, DebateTransition, TransitionError};

/// Errors that abort a deliberation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("no opinion sources configured")]
    NoSources,

    #[error("duplicate opinion source name: {0}")]
    DuplicateSource(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("no initial decision recorded for source: {0}")]
    MissingDecision(String),

    #[error("deliberation cancelled during {phase}")]
    Cancelled { phase: DebatePhase },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Completed deliberation: final votes aligned with source names.
#[derive(Debug, Clone)]
pub struct Deliberation {
    pub votes: Vec<Decision>,
    pub names: Vec<String>,
    pub session: DebateSession,
}

/// Drives the four rounds over an ordered set of sources.
pub struct DeliberationProtocol {
    sources: Vec<SharedOpinionSource>,
    parallel: bool,
}

impl std::fmt::Debug for DeliberationProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliberationProtocol")
            .field("sources", &self.names())
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl DeliberationProtocol {
    /// Source order is fixed here and used for every phase and for voting.
    pub fn new(sources: Vec<SharedOpinionSource>) -> ProtocolResult<Self> {
        if sources.is_empty() {
            return Err(ProtocolError::NoSources);
        }
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.name().to_string()) {
                return Err(ProtocolError::DuplicateSource(source.name().to_string()));
            }
        }
        Ok(Self {
            sources,
            parallel: true,
        })
    }

    /// Run independent calls within a phase one at a time instead of concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub async fn run(
        &self,
        query: &str,
        recorder: &mut SessionRecorder,
    ) -> ProtocolResult<Deliberation> {
        self.run_with_cancel(query, recorder, &CancellationToken::new())
            .await
    }

    /// Run all four rounds, aborting as soon as `cancel` fires.
    ///
    /// A cancelled phase emits no audit records; records from earlier
    /// phases stay in the sink.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        recorder: &mut SessionRecorder,
        cancel: &CancellationToken,
    ) -> ProtocolResult<Deliberation> {
        let mut session = DebateSession::new(recorder.debate_id(), query, self.names());

        for source in &self.sources {
            source.reset();
        }

        self.initial_round(&mut session, recorder, cancel).await?;
        self.challenge_round(&mut session, recorder, cancel).await?;
        self.revision_round(&mut session, recorder, cancel).await?;
        let votes = self.final_round(&mut session, recorder)?;

        session.transition(DebatePhase::Complete, "votes collected")?;
        info!(
            debate_id = %session.id,
            votes = votes.len(),
            challenges = session.challenge_count(),
            "Deliberation complete"
        );

        Ok(Deliberation {
            votes,
            names: session.participants.clone(),
            session,
        })
    }

    async fn initial_round(
        &self,
        session: &mut DebateSession,
        recorder: &mut SessionRecorder,
        cancel: &CancellationToken,
    ) -> ProtocolResult<()> {
        self.enter(session, DebatePhase::InitialAnalysis)?;
        let query = session.query.clone();

        let calls = self.sources.iter().map(|s| s.analyze(&query)).collect();
        let Some(decisions) = self.gather(calls, cancel).await else {
            return Err(abort(session));
        };

        for (source, decision) in self.sources.iter().zip(decisions) {
            recorder.record(AuditEvent::InitialDecision(DecisionEntry::new(
                source.name(),
                &decision,
            )));
            session.initial.insert(source.name().to_string(), decision);
        }
        Ok(())
    }

    /// Every source challenges every other source, challenger-major.
    async fn challenge_round(
        &self,
        session: &mut DebateSession,
        recorder: &mut SessionRecorder,
        cancel: &CancellationToken,
    ) -> ProtocolResult<()> {
        self.enter(session, DebatePhase::Challenge)?;
        let query = session.query.clone();

        // Challenges target pre-revision reasoning only.
        let reasoning: Vec<String> = self
            .sources
            .iter()
            .map(|s| {
                session
                    .initial
                    .get(s.name())
                    .map(|d| d.reasoning.clone())
                    .unwrap_or_default()
            })
            .collect();

        let pairs: Vec<(usize, usize)> = (0..self.sources.len())
            .flat_map(|i| (0..self.sources.len()).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .collect();

        let calls = pairs
            .iter()
            .map(|&(challenger, challenged)| {
                self.sources[challenger].challenge(&query, &reasoning[challenged])
            })
            .collect();
        let Some(texts) = self.gather(calls, cancel).await else {
            return Err(abort(session));
        };

        for (&(challenger, challenged), text) in pairs.iter().zip(texts) {
            let challenger = self.sources[challenger].name();
            let challenged = self.sources[challenged].name();
            session
                .challenges
                .entry(challenged.to_string())
                .or_default()
                .push(format!("[{}]: {}", challenger, text));
            recorder.record(AuditEvent::Challenge(ChallengeEntry {
                challenger: challenger.to_string(),
                challenged_agent: challenged.to_string(),
                challenge: text,
            }));
        }
        debug!(debate_id = %session.id, count = pairs.len(), "Challenges issued");
        Ok(())
    }

    async fn revision_round(
        &self,
        session: &mut DebateSession,
        recorder: &mut SessionRecorder,
        cancel: &CancellationToken,
    ) -> ProtocolResult<()> {
        self.enter(session, DebatePhase::Revision)?;
        let query = session.query.clone();

        let mut originals = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let original = session
                .initial
                .get(source.name())
                .cloned()
                .or_else(|| source.last_decision())
                .ok_or_else(|| ProtocolError::MissingDecision(source.name().to_string()))?;
            originals.push((original, session.aggregated_challenges(source.name())));
        }

        let calls = self
            .sources
            .iter()
            .zip(&originals)
            .map(|(s, (original, challenges))| s.revise(&query, original, challenges))
            .collect();
        let Some(revised) = self.gather(calls, cancel).await else {
            return Err(abort(session));
        };

        for ((source, (original, _)), decision) in
            self.sources.iter().zip(&originals).zip(revised)
        {
            recorder.record(AuditEvent::Revision(RevisionEntry::new(
                source.name(),
                original,
                &decision,
            )));
            session.revised.insert(source.name().to_string(), decision);
        }
        Ok(())
    }

    fn final_round(
        &self,
        session: &mut DebateSession,
        recorder: &mut SessionRecorder,
    ) -> ProtocolResult<Vec<Decision>> {
        self.enter(session, DebatePhase::FinalVoting)?;

        let votes = session.final_votes();
        for (name, vote) in session.participants.iter().zip(&votes) {
            recorder.record(AuditEvent::FinalVote(DecisionEntry::new(name, vote)));
        }
        Ok(votes)
    }

    fn enter(&self, session: &mut DebateSession, phase: DebatePhase) -> ProtocolResult<()> {
        session.transition(phase, "previous round complete")?;
        if let Some((round, name)) = phase.round() {
            info!(debate_id = %session.id, round, name, "Entering round");
        }
        Ok(())
    }

    /// Await a phase's calls in order, or `None` if cancelled first.
    async fn gather<F, T>(&self, calls: Vec<F>, cancel: &CancellationToken) -> Option<Vec<T>>
    where
        F: Future<Output = T>,
    {
        let parallel = self.parallel;
        let work = async move {
            if parallel {
                join_all(calls).await
            } else {
                let mut out = Vec::with_capacity(calls.len());
                for call in calls {
                    out.push(call.await);
                }
                out
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            out = work => Some(out),
        }
    }
}

fn abort(session: &mut DebateSession) -> ProtocolError {
    let phase = session.phase;
    if let Err(e) = session.transition(DebatePhase::Aborted, "cancelled") {
        warn!(debate_id = %session.id, error = %e, "Abort transition rejected");
    }
    warn!(debate_id = %session.id, %phase, "Deliberation cancelled");
    ProtocolError::Cancelled { phase }
}
