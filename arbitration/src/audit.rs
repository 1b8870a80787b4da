//! Debate audit trail.
//!
//! Every per-agent step of a debate is reported as an [`AuditRecord`] to an
//! explicitly passed [`AuditSink`]. Sinks are append-only and cannot
//! influence control flow. [`AuditLog`] keeps records in memory and
//! broadcasts them as they arrive, so a streaming transport can forward
//! them in protocol order; [`TracingAuditSink`] writes them to `tracing`.
//!
//! A [`SessionRecorder`] is the per-debate handle: it opens the session
//! with `debate_started`, stamps every record with the debate id, and
//! closes it with `final_decision` followed by a flush.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::decision::{Decision, Disposition, FinalDecision, FinalDisposition};

/// Channel capacity for live record subscribers.
const CHANNEL_CAPACITY: usize = 256;

/// Debate opened for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateStarted {
    pub query: String,
}

/// An agent's decision as recorded in round 1 or round 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub agent: String,
    pub confidence: f64,
    pub risk: f64,
    pub decision: Disposition,
    pub reasoning: String,
}

impl DecisionEntry {
    pub fn new(agent: &str, decision: &Decision) -> Self {
        Self {
            agent: agent.to_string(),
            confidence: decision.confidence,
            risk: decision.risk,
            decision: decision.disposition,
            reasoning: decision.reasoning.clone(),
        }
    }
}

/// One agent challenging another's initial reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeEntry {
    pub challenger: String,
    pub challenged_agent: String,
    pub challenge: String,
}

/// Before/after pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionChanges {
    pub confidence: Change<f64>,
    pub risk: Change<f64>,
    pub decision: Change<Disposition>,
}

/// An agent's revision after reading its challenges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub agent: String,
    pub changes: RevisionChanges,
    pub reason: String,
}

impl RevisionEntry {
    pub fn new(agent: &str, original: &Decision, revised: &Decision) -> Self {
        Self {
            agent: agent.to_string(),
            changes: RevisionChanges {
                confidence: Change {
                    old: original.confidence,
                    new: revised.confidence,
                },
                risk: Change {
                    old: original.risk,
                    new: revised.risk,
                },
                decision: Change {
                    old: original.disposition,
                    new: revised.disposition,
                },
            },
            reason: revised.reasoning.clone(),
        }
    }

    pub fn changed_disposition(&self) -> bool {
        self.changes.decision.old != self.changes.decision.new
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    /// 0 when the rule that fired does not compute agreement.
    pub agreement_percentage: f64,
    /// 0 when the rule that fired does not compute risk.
    pub max_risk: f64,
    pub veto_applied: bool,
}

/// The system decision that closed a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecisionEntry {
    pub decision: FinalDisposition,
    pub reasoning: String,
    pub rule_applied: String,
    pub metrics: FinalMetrics,
}

impl FinalDecisionEntry {
    pub fn new(decision: &FinalDecision) -> Self {
        Self {
            decision: decision.disposition,
            reasoning: decision.reasoning.clone(),
            rule_applied: decision.rule_applied().unwrap_or_default().to_string(),
            metrics: FinalMetrics {
                agreement_percentage: decision.metric("agreement_percentage").unwrap_or(0.0),
                max_risk: decision.metric("max_risk").unwrap_or(0.0),
                veto_applied: decision.veto_applied(),
            },
        }
    }
}

/// Audit event kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    DebateStarted(DebateStarted),
    InitialDecision(DecisionEntry),
    Challenge(ChallengeEntry),
    Revision(RevisionEntry),
    FinalVote(DecisionEntry),
    FinalDecision(FinalDecisionEntry),
}

impl AuditEvent {
    /// Event kind as it appears in serialized records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DebateStarted(_) => "debate_started",
            Self::InitialDecision(_) => "initial_decision",
            Self::Challenge(_) => "challenge",
            Self::Revision(_) => "revision",
            Self::FinalVote(_) => "final_vote",
            Self::FinalDecision(_) => "final_decision",
        }
    }
}

/// An audit event stamped with its debate and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub debate_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);

    /// Called once when a debate's final decision has been appended.
    fn flush(&self, _debate_id: &str) {}
}

/// Shared handle to an audit sink.
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// In-memory audit log with live fan-out to subscribers.
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
    sender: broadcast::Sender<AuditRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            records: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Receive records as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.sender.subscribe()
    }

    /// Every record, in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records belonging to one debate, in append order.
    pub fn session_records(&self, debate_id: &str) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.debate_id == debate_id)
            .cloned()
            .collect()
    }

    /// Reconstruct one debate from its records.
    pub fn transcript(&self, debate_id: &str) -> DebateTranscript {
        DebateTranscript::from_records(debate_id, &self.session_records(debate_id))
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditLog {
    fn append(&self, record: AuditRecord) {
        let kind = record.event.kind();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());

        // No receivers is fine; the record is already stored.
        match self.sender.send(record) {
            Ok(count) => debug!(kind, receivers = count, "Audit record appended"),
            Err(_) => debug!(kind, "Audit record appended (no receivers)"),
        }
    }
}

/// Writes audit records to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, record: AuditRecord) {
        let debate_id = record.debate_id.as_str();
        match &record.event {
            AuditEvent::DebateStarted(e) => {
                info!(debate_id, query = %e.query, "Debate started")
            }
            AuditEvent::InitialDecision(e) => info!(
                debate_id,
                agent = %e.agent,
                confidence = e.confidence,
                risk = e.risk,
                decision = %e.decision,
                "Initial decision"
            ),
            AuditEvent::Challenge(e) => info!(
                debate_id,
                challenger = %e.challenger,
                challenged = %e.challenged_agent,
                "Challenge issued"
            ),
            AuditEvent::Revision(e) => info!(
                debate_id,
                agent = %e.agent,
                old = %e.changes.decision.old,
                new = %e.changes.decision.new,
                confidence = e.changes.confidence.new,
                risk = e.changes.risk.new,
                "Revision"
            ),
            AuditEvent::FinalVote(e) => info!(
                debate_id,
                agent = %e.agent,
                decision = %e.decision,
                "Final vote"
            ),
            AuditEvent::FinalDecision(e) => info!(
                debate_id,
                decision = %e.decision,
                rule = %e.rule_applied,
                agreement = e.metrics.agreement_percentage,
                max_risk = e.metrics.max_risk,
                veto = e.metrics.veto_applied,
                "Final decision"
            ),
        }
    }
}

/// Per-debate recording handle.
///
/// Keeps its own copy of what it emitted so the caller can return a
/// transcript regardless of which sink is configured.
pub struct SessionRecorder {
    sink: SharedAuditSink,
    debate_id: String,
    emitted: Vec<AuditRecord>,
}

impl SessionRecorder {
    /// Open a debate session and emit `debate_started`.
    pub fn open(sink: SharedAuditSink, query: &str) -> Self {
        let debate_id = format!("debate_{}", uuid::Uuid::new_v4().simple());
        let mut recorder = Self {
            sink,
            debate_id,
            emitted: Vec::new(),
        };
        recorder.record(AuditEvent::DebateStarted(DebateStarted {
            query: query.to_string(),
        }));
        recorder
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    pub fn record(&mut self, event: AuditEvent) {
        let record = AuditRecord {
            debate_id: self.debate_id.clone(),
            timestamp: Utc::now(),
            event,
        };
        self.emitted.push(record.clone());
        self.sink.append(record);
    }

    pub fn emitted(&self) -> &[AuditRecord] {
        &self.emitted
    }

    /// Emit `final_decision`, flush the sink, and return the transcript.
    pub fn finish(mut self, decision: &FinalDecision) -> DebateTranscript {
        self.record(AuditEvent::FinalDecision(FinalDecisionEntry::new(decision)));
        self.sink.flush(&self.debate_id);
        DebateTranscript::from_records(&self.debate_id, &self.emitted)
    }
}

/// One debate reconstructed from its audit records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateTranscript {
    pub debate_id: String,
    pub query: Option<String>,
    pub initial_decisions: Vec<DecisionEntry>,
    pub challenges: Vec<ChallengeEntry>,
    pub revisions: Vec<RevisionEntry>,
    pub final_votes: Vec<DecisionEntry>,
    pub final_decision: Option<FinalDecisionEntry>,
    pub total_events: usize,
}

/// One numbered round of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptRound {
    pub number: u8,
    pub name: &'static str,
    pub events: Vec<AuditEvent>,
}

impl DebateTranscript {
    pub fn from_records(debate_id: &str, records: &[AuditRecord]) -> Self {
        let mut transcript = Self {
            debate_id: debate_id.to_string(),
            ..Self::default()
        };

        for record in records.iter().filter(|r| r.debate_id == debate_id) {
            transcript.total_events += 1;
            match &record.event {
                AuditEvent::DebateStarted(e) => transcript.query = Some(e.query.clone()),
                AuditEvent::InitialDecision(e) => transcript.initial_decisions.push(e.clone()),
                AuditEvent::Challenge(e) => transcript.challenges.push(e.clone()),
                AuditEvent::Revision(e) => transcript.revisions.push(e.clone()),
                AuditEvent::FinalVote(e) => transcript.final_votes.push(e.clone()),
                AuditEvent::FinalDecision(e) => transcript.final_decision = Some(e.clone()),
            }
        }

        transcript
    }

    /// Challenges addressed to one agent, in the order they were issued.
    pub fn challenges_for(&self, agent: &str) -> Vec<&ChallengeEntry> {
        self.challenges
            .iter()
            .filter(|c| c.challenged_agent == agent)
            .collect()
    }

    /// The four debate rounds, numbered and named.
    pub fn rounds(&self) -> Vec<TranscriptRound> {
        let round = |number, name, events| TranscriptRound {
            number,
            name,
            events,
        };
        vec![
            round(
                1,
                "Initial Analysis",
                self.initial_decisions
                    .iter()
                    .cloned()
                    .map(AuditEvent::InitialDecision)
                    .collect(),
            ),
            round(
                2,
                "Challenge Round",
                self.challenges
                    .iter()
                    .cloned()
                    .map(AuditEvent::Challenge)
                    .collect(),
            ),
            round(
                3,
                "Revision",
                self.revisions
                    .iter()
                    .cloned()
                    .map(AuditEvent::Revision)
                    .collect(),
            ),
            round(
                4,
                "Final Voting",
                self.final_votes
                    .iter()
                    .cloned()
                    .map(AuditEvent::FinalVote)
                    .collect(),
            ),
        ]
    }

    /// Whether the transcript contains any deliberation-phase event.
    pub fn has_deliberation(&self) -> bool {
        !(self.initial_decisions.is_empty()
            && self.challenges.is_empty()
            && self.revisions.is_empty()
            && self.final_votes.is_empty())
    }
}
