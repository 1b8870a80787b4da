//! Opinion sources consumed by the debate protocol.
//!
//! How an agent actually reasons (prompting, remote model calls, reply
//! parsing) lives behind [`OpinionBackend`]. [`PolicyAgent`] wraps a backend
//! with a role's disposition policy, a per-call timeout, and the local
//! recovery rules: a failed analysis becomes a conservative fallback
//! decision, a failed revision keeps the original decision, and a failed
//! challenge becomes a placeholder note. Nothing escapes as an error.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::policy::AgentRole;
use crate::decision::Decision;

/// Failure reported by an opinion backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("malformed output: {0}")]
    Malformed(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Raw signals produced by a backend before a policy is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub confidence: f64,
    pub risk: f64,
    pub reasoning: String,
}

impl Assessment {
    pub fn new(confidence: f64, risk: f64, reasoning: impl Into<String>) -> Self {
        Self {
            confidence,
            risk,
            reasoning: reasoning.into(),
        }
    }

    /// Reject assessments that do not describe a structurally valid decision.
    pub fn validated(self) -> Result<Self, SourceError> {
        for (label, value) in [("confidence", self.confidence), ("risk", self.risk)] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(SourceError::Malformed(format!(
                    "{} out of range: {}",
                    label, value
                )));
            }
        }
        if self.reasoning.trim().is_empty() {
            return Err(SourceError::Malformed("empty reasoning".to_string()));
        }
        Ok(self)
    }
}

/// Whatever produces raw judgments for an agent role.
#[async_trait]
pub trait OpinionBackend: Send + Sync {
    /// Initial, independent assessment of the query.
    async fn assess(&self, role: AgentRole, query: &str) -> Result<Assessment, SourceError>;

    /// Free-text challenge against another agent's reasoning.
    async fn challenge(
        &self,
        role: AgentRole,
        query: &str,
        other_reasoning: &str,
    ) -> Result<String, SourceError>;

    /// Revised assessment after reading the challenges addressed to this role.
    async fn reassess(
        &self,
        role: AgentRole,
        query: &str,
        original: &Decision,
        challenges: &str,
    ) -> Result<Assessment, SourceError>;
}

/// A debate participant as seen by the protocol.
///
/// Every operation is infallible from the caller's point of view; sources
/// recover locally from backend failures.
#[async_trait]
pub trait OpinionSource: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, query: &str) -> Decision;

    async fn challenge(&self, query: &str, other_reasoning: &str) -> String;

    async fn revise(&self, query: &str, original: &Decision, challenges: &str) -> Decision;

    /// Most recent decision this source produced, if any.
    fn last_decision(&self) -> Option<Decision>;

    /// Forget per-query state before a new session starts.
    fn reset(&self) {}
}

/// Shared handle to an opinion source.
pub type SharedOpinionSource = Arc<dyn OpinionSource>;

/// Default per-call timeout for backend calls.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(60);

/// An opinion source that applies a role's disposition policy to a backend.
pub struct PolicyAgent {
    role: AgentRole,
    name: String,
    backend: Arc<dyn OpinionBackend>,
    timeout: Duration,
    last: Mutex<Option<Decision>>,
}

impl PolicyAgent {
    pub fn new(role: AgentRole, backend: Arc<dyn OpinionBackend>) -> Self {
        Self {
            role,
            name: role.display_name().to_string(),
            backend,
            timeout: DEFAULT_SOURCE_TIMEOUT,
            last: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Build the standard Utility/Accuracy/Safety trio over one backend.
    pub fn standard_panel(
        backend: Arc<dyn OpinionBackend>,
        timeout: Duration,
    ) -> Vec<SharedOpinionSource> {
        AgentRole::ALL
            .into_iter()
            .map(|role| {
                Arc::new(PolicyAgent::new(role, Arc::clone(&backend)).with_timeout(timeout))
                    as SharedOpinionSource
            })
            .collect()
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    fn decide(&self, assessment: Assessment) -> Decision {
        let disposition = self
            .role
            .disposition_for(assessment.confidence, assessment.risk);
        Decision::new(
            assessment.confidence,
            assessment.risk,
            disposition,
            assessment.reasoning,
        )
    }

    fn fallback(&self, error: &SourceError) -> Decision {
        let (confidence, risk) = self.role.fallback_signals();
        Decision::new(
            confidence,
            risk,
            self.role.disposition_for(confidence, risk),
            format!("Analysis failed: {}", error),
        )
    }

    fn remember(&self, decision: &Decision) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(decision.clone());
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, SourceError>
    where
        T: Send,
        F: Future<Output = Result<T, SourceError>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl OpinionSource for PolicyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, query: &str) -> Decision {
        let outcome = self
            .bounded(self.backend.assess(self.role, query))
            .await
            .and_then(Assessment::validated);

        let decision = match outcome {
            Ok(assessment) => self.decide(assessment),
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Analysis failed, using conservative fallback");
                self.fallback(&e)
            }
        };

        debug!(agent = %self.name, decision = %decision.summary_line(), "Analysis complete");
        self.remember(&decision);
        decision
    }

    async fn challenge(&self, query: &str, other_reasoning: &str) -> String {
        match self
            .bounded(self.backend.challenge(self.role, query, other_reasoning))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Challenge failed");
                format!("(no challenge available: {})", e)
            }
        }
    }

    async fn revise(&self, query: &str, original: &Decision, challenges: &str) -> Decision {
        let outcome = self
            .bounded(
                self.backend
                    .reassess(self.role, query, original, challenges),
            )
            .await
            .and_then(Assessment::validated);

        let decision = match outcome {
            Ok(assessment) => self.decide(assessment),
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Revision failed, keeping original decision");
                original.clone()
            }
        };

        self.remember(&decision);
        decision
    }

    fn last_decision(&self) -> Option<Decision> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
