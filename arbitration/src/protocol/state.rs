//! Deliberation state machine — phases, transitions, and session data.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;

/// Phase of a deliberation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebatePhase {
    /// Session created but not started.
    Idle,
    /// Round 1: independent analysis.
    InitialAnalysis,
    /// Round 2: every ordered pair of sources.
    Challenge,
    /// Round 3: each source revises against its challenges.
    Revision,
    /// Round 4: revised decisions collected as votes.
    FinalVoting,
    /// Votes are ready for the cascade.
    Complete,
    /// Cancelled before completion.
    Aborted,
}

impl DebatePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Idle => &[Self::InitialAnalysis, Self::Aborted],
            Self::InitialAnalysis => &[Self::Challenge, Self::Aborted],
            Self::Challenge => &[Self::Revision, Self::Aborted],
            Self::Revision => &[Self::FinalVoting, Self::Aborted],
            Self::FinalVoting => &[Self::Complete, Self::Aborted],
            Self::Complete | Self::Aborted => &[],
        }
    }

    /// Round number and human-readable name, for the four debate rounds.
    pub fn round(self) -> Option<(u8, &'static str)> {
        match self {
            Self::InitialAnalysis => Some((1, "Initial Analysis")),
            Self::Challenge => Some((2, "Challenge Round")),
            Self::Revision => Some((3, "Revision")),
            Self::FinalVoting => Some((4, "Final Voting")),
            Self::Idle | Self::Complete | Self::Aborted => None,
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::InitialAnalysis => write!(f, "initial_analysis"),
            Self::Challenge => write!(f, "challenge"),
            Self::Revision => write!(f, "revision"),
            Self::FinalVoting => write!(f, "final_voting"),
            Self::Complete => write!(f, "complete"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// Everything one deliberation produced, keyed by source name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    /// Debate id shared with the audit trail.
    pub id: String,
    pub query: String,
    pub phase: DebatePhase,
    /// Source names in protocol order.
    pub participants: Vec<String>,
    pub initial: HashMap<String, Decision>,
    /// Labeled challenges addressed to each source, in issue order.
    pub challenges: HashMap<String, Vec<String>>,
    pub revised: HashMap<String, Decision>,
    pub transitions: Vec<DebateTransition>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(id: &str, query: &str, participants: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            query: query.to_string(),
            phase: DebatePhase::Idle,
            participants,
            initial: HashMap::new(),
            challenges: HashMap::new(),
            revised: HashMap::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }

        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Aggregated challenge text for one source, or empty if none.
    pub fn aggregated_challenges(&self, name: &str) -> String {
        self.challenges
            .get(name)
            .map(|c| c.join("\n"))
            .unwrap_or_default()
    }

    pub fn challenge_count(&self) -> usize {
        self.challenges.values().map(Vec::len).sum()
    }

    /// Revised decisions in participant order.
    pub fn final_votes(&self) -> Vec<Decision> {
        self.participants
            .iter()
            .filter_map(|name| self.revised.get(name).cloned())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == DebatePhase::Complete
    }
}
