//! Agent roles and their disposition policies.
//!
//! Each role maps one numeric signal onto a disposition through a fixed
//! threshold table:
//!
//! | Role     | Signal     | ACT   | WARN   | REFUSE / VETO |
//! |----------|------------|-------|--------|---------------|
//! | Utility  | confidence | ≥ 60  | 40–59  | < 40 REFUSE   |
//! | Accuracy | confidence | ≥ 85  | 60–84  | < 60 REFUSE   |
//! | Safety   | risk       | < 30  | 30–49  | ≥ 50 VETO     |

use serde::{Deserialize, Serialize};

use crate::decision::{clamp_signal, Disposition};

/// Which signal a policy reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySignal {
    Confidence,
    Risk,
}

/// The three analytical roles taking part in a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Action-oriented; low bar to act.
    Utility,
    /// Skeptical; high bar to act.
    Accuracy,
    /// Risk-focused; holds the veto.
    Safety,
}

impl AgentRole {
    /// All roles in the fixed debate order.
    pub const ALL: [AgentRole; 3] = [Self::Utility, Self::Accuracy, Self::Safety];

    /// Display name used in transcripts and final decisions.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Utility => "Utility Agent",
            Self::Accuracy => "Accuracy Agent",
            Self::Safety => "Safety Agent",
        }
    }

    pub fn signal(self) -> PolicySignal {
        match self {
            Self::Utility | Self::Accuracy => PolicySignal::Confidence,
            Self::Safety => PolicySignal::Risk,
        }
    }

    /// Map a decision's signals onto this role's disposition.
    ///
    /// Pure and total: out-of-range or NaN inputs are clamped first.
    pub fn disposition_for(self, confidence: f64, risk: f64) -> Disposition {
        match self {
            Self::Utility => confidence_band(clamp_signal(confidence), 60.0, 40.0),
            Self::Accuracy => confidence_band(clamp_signal(confidence), 85.0, 60.0),
            Self::Safety => {
                let risk = clamp_signal(risk);
                if risk >= 50.0 {
                    Disposition::Veto
                } else if risk >= 30.0 {
                    Disposition::Warn
                } else {
                    Disposition::Act
                }
            }
        }
    }

    /// Conservative `(confidence, risk)` substituted when an analysis
    /// cannot be obtained.
    pub fn fallback_signals(self) -> (f64, f64) {
        match self {
            Self::Utility => (50.0, 50.0),
            Self::Accuracy => (50.0, 70.0),
            Self::Safety => (30.0, 75.0),
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utility => write!(f, "utility"),
            Self::Accuracy => write!(f, "accuracy"),
            Self::Safety => write!(f, "safety"),
        }
    }
}

fn confidence_band(confidence: f64, act_at: f64, warn_at: f64) -> Disposition {
    if confidence >= act_at {
        Disposition::Act
    } else if confidence >= warn_at {
        Disposition::Warn
    } else {
        Disposition::Refuse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utility_boundaries() {
        let r = AgentRole::Utility;
        assert_eq!(r.disposition_for(60.0, 99.0), Disposition::Act);
        assert_eq!(r.disposition_for(59.9, 0.0), Disposition::Warn);
        assert_eq!(r.disposition_for(40.0, 0.0), Disposition::Warn);
        assert_eq!(r.disposition_for(39.9, 0.0), Disposition::Refuse);
        assert_eq!(r.disposition_for(0.0, 0.0), Disposition::Refuse);
        assert_eq!(r.disposition_for(100.0, 0.0), Disposition::Act);
    }

    #[test]
    fn test_accuracy_boundaries() {
        let r = AgentRole::Accuracy;
        assert_eq!(r.disposition_for(85.0, 0.0), Disposition::Act);
        assert_eq!(r.disposition_for(84.9, 0.0), Disposition::Warn);
        assert_eq!(r.disposition_for(60.0, 0.0), Disposition::Warn);
        assert_eq!(r.disposition_for(59.9, 0.0), Disposition::Refuse);
    }

    #[test]
    fn test_safety_reads_risk_only() {
        let r = AgentRole::Safety;
        assert_eq!(r.disposition_for(0.0, 29.9), Disposition::Act);
        assert_eq!(r.disposition_for(0.0, 30.0), Disposition::Warn);
        assert_eq!(r.disposition_for(100.0, 49.9), Disposition::Warn);
        assert_eq!(r.disposition_for(100.0, 50.0), Disposition::Veto);
        assert_eq!(r.disposition_for(100.0, 100.0), Disposition::Veto);
    }

    #[test]
    fn test_policy_is_total_over_signal_range() {
        for role in AgentRole::ALL {
            for step in 0..=1000 {
                let v = step as f64 / 10.0;
                let first = role.disposition_for(v, v);
                assert_eq!(first, role.disposition_for(v, v));
                if role != AgentRole::Safety {
                    assert_ne!(first, Disposition::Veto);
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_inputs_clamped() {
        assert_eq!(
            AgentRole::Utility.disposition_for(250.0, 0.0),
            Disposition::Act
        );
        assert_eq!(
            AgentRole::Safety.disposition_for(0.0, -10.0),
            Disposition::Act
        );
        assert_eq!(
            AgentRole::Accuracy.disposition_for(f64::NAN, 0.0),
            Disposition::Refuse
        );
    }

    #[test]
    fn test_fallback_dispositions() {
        let (c, r) = AgentRole::Safety.fallback_signals();
        assert_eq!(AgentRole::Safety.disposition_for(c, r), Disposition::Veto);
        let (c, r) = AgentRole::Accuracy.fallback_signals();
        assert_eq!(AgentRole::Accuracy.disposition_for(c, r), Disposition::Refuse);
        let (c, r) = AgentRole::Utility.fallback_signals();
        assert_eq!(AgentRole::Utility.disposition_for(c, r), Disposition::Warn);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(AgentRole::Safety.display_name(), "Safety Agent");
        assert_eq!(AgentRole::Utility.to_string(), "utility");
        assert_eq!(AgentRole::Accuracy.signal(), PolicySignal::Confidence);
    }
}
