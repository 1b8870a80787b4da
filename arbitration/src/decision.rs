//! Decision value objects — per-agent votes and the system-level verdict.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Disposition an individual agent attaches to its decision.
///
/// `Veto` is only ever produced by the safety-oriented agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Disposition {
    Act,
    Warn,
    Refuse,
    Veto,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Act => "ACT",
            Self::Warn => "WARN",
            Self::Refuse => "REFUSE",
            Self::Veto => "VETO",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent's judgment of a query.
///
/// Produced fresh at analysis time and again at revision time; never mutated
/// after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Confidence in `[0, 100]`.
    pub confidence: f64,
    /// Estimated risk in `[0, 100]`.
    pub risk: f64,
    pub disposition: Disposition,
    pub reasoning: String,
}

impl Decision {
    /// Build a decision, clamping both signals into `[0, 100]`.
    ///
    /// A NaN signal is treated as 0.
    pub fn new(
        confidence: f64,
        risk: f64,
        disposition: Disposition,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            confidence: clamp_signal(confidence),
            risk: clamp_signal(risk),
            disposition,
            reasoning: reasoning.into(),
        }
    }

    /// Compact one-line rendering for logs.
    pub fn summary_line(&self) -> String {
        format!(
            "{} (confidence={:.1}, risk={:.1})",
            self.disposition, self.confidence, self.risk
        )
    }
}

pub(crate) fn clamp_signal(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// System-level disposition. There is no veto here: a veto always
/// surfaces as `Refuse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalDisposition {
    Act,
    Warn,
    Refuse,
}

impl FinalDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Act => "ACT",
            Self::Warn => "WARN",
            Self::Refuse => "REFUSE",
        }
    }
}

impl std::fmt::Display for FinalDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a final decision. Ordered so that serialization is
/// stable across repeated evaluations.
pub type DecisionMetadata = BTreeMap<String, serde_json::Value>;

/// The one decision the system returns for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub disposition: FinalDisposition,
    pub reasoning: String,
    /// Always contains `rule_applied`.
    pub metadata: DecisionMetadata,
}

impl FinalDecision {
    pub fn new(disposition: FinalDisposition, reasoning: impl Into<String>, rule: &str) -> Self {
        let mut metadata = DecisionMetadata::new();
        metadata.insert("rule_applied".to_string(), rule.into());
        Self {
            disposition,
            reasoning: reasoning.into(),
            metadata,
        }
    }

    /// Add a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Name of the rule that produced this decision.
    pub fn rule_applied(&self) -> Option<&str> {
        self.metadata.get("rule_applied").and_then(|v| v.as_str())
    }

    /// Numeric metadata lookup.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }

    /// Whether a safety veto produced this decision.
    pub fn veto_applied(&self) -> bool {
        self.metadata.contains_key("veto_agent")
    }
}
