//! Decision cascade — reduces final votes to one system decision.
//!
//! Rules are evaluated in order and the first one that matches wins:
//!
//! 1. `safety_veto`: any VETO vote → REFUSE
//! 2. `low_confidence`: any confidence < 40 → REFUSE
//! 3. `low_agreement`: agreement < 60 % → REFUSE
//! 4. `medium_agreement`: 60 % ≤ agreement ≤ 80 % → WARN
//! 5. `high_agreement_low_risk`: agreement > 80 % and max risk < 30 → ACT
//! 6. `high_agreement_high_risk`: anything left → WARN
//!
//! Agreement is the share of ACT votes over the exact vote count. The
//! cascade holds no state; applying it twice to the same votes yields
//! identical decisions.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::decision::{Decision, Disposition, FinalDecision, FinalDisposition};

const CONFIDENCE_FLOOR: f64 = 40.0;
const LOW_AGREEMENT_BELOW: f64 = 60.0;
const MEDIUM_AGREEMENT_UP_TO: f64 = 80.0;
const ACCEPTABLE_RISK_BELOW: f64 = 30.0;

/// A vote set the cascade refuses to evaluate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CascadeError {
    #[error("vote set is empty")]
    Empty,

    #[error("got {votes} votes but {names} agent names")]
    LengthMismatch { votes: usize, names: usize },

    #[error("malformed vote from {agent}: {field} = {value} is outside [0, 100]")]
    Malformed {
        agent: String,
        field: &'static str,
        value: f64,
    },
}

/// Final votes paired with the agents that cast them.
///
/// Construction is the only place a vote set is checked; a `VoteSet` is
/// always non-empty, aligned, and every signal is finite and in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteSet {
    votes: Vec<Decision>,
    names: Vec<String>,
}

impl VoteSet {
    pub fn new(votes: Vec<Decision>, names: Vec<String>) -> Result<Self, CascadeError> {
        if votes.len() != names.len() {
            return Err(CascadeError::LengthMismatch {
                votes: votes.len(),
                names: names.len(),
            });
        }
        if votes.is_empty() {
            return Err(CascadeError::Empty);
        }
        for (name, vote) in names.iter().zip(&votes) {
            for (field, value) in [("confidence", vote.confidence), ("risk", vote.risk)] {
                if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                    return Err(CascadeError::Malformed {
                        agent: name.clone(),
                        field,
                        value,
                    });
                }
            }
        }
        Ok(Self { votes, names })
    }

    pub fn votes(&self) -> &[Decision] {
        &self.votes
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &Decision)> + '_ {
        self.names.iter().zip(&self.votes)
    }
}

/// Which cascade rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeRule {
    SafetyVeto,
    LowConfidence,
    LowAgreement,
    MediumAgreement,
    HighAgreementLowRisk,
    HighAgreementHighRisk,
}

impl CascadeRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SafetyVeto => "safety_veto",
            Self::LowConfidence => "low_confidence",
            Self::LowAgreement => "low_agreement",
            Self::MediumAgreement => "medium_agreement",
            Self::HighAgreementLowRisk => "high_agreement_low_risk",
            Self::HighAgreementHighRisk => "high_agreement_high_risk",
        }
    }
}

impl std::fmt::Display for CascadeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate metrics over a vote set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoteMetrics {
    /// `100 × ACT votes / total votes`.
    pub agreement_pct: f64,
    pub avg_confidence: f64,
    pub max_risk: f64,
}

impl VoteMetrics {
    pub fn of(set: &VoteSet) -> Self {
        let total = set.len() as f64;
        let act = set
            .votes
            .iter()
            .filter(|v| v.disposition == Disposition::Act)
            .count() as f64;
        Self {
            agreement_pct: act * 100.0 / total,
            avg_confidence: set.votes.iter().map(|v| v.confidence).sum::<f64>() / total,
            max_risk: set.votes.iter().map(|v| v.risk).fold(f64::MIN, f64::max),
        }
    }
}

/// A single cascade guard: returns a decision when the rule matches.
type Rule = fn(&VoteSet, &VoteMetrics) -> Option<FinalDecision>;

/// The guards in evaluation order. The fallback is not listed; it applies
/// when none of these match.
const RULES: &[Rule] = &[
    safety_veto,
    low_confidence,
    low_agreement,
    medium_agreement,
    high_agreement_low_risk,
];

/// Stateless evaluator for the decision rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionCascade;

impl DecisionCascade {
    /// Validate raw votes and names, then evaluate the cascade.
    pub fn apply(votes: &[Decision], names: &[String]) -> Result<FinalDecision, CascadeError> {
        let set = VoteSet::new(votes.to_vec(), names.to_vec())?;
        Ok(Self::evaluate(&set))
    }

    /// Evaluate the cascade over a validated vote set.
    pub fn evaluate(set: &VoteSet) -> FinalDecision {
        let metrics = VoteMetrics::of(set);
        let decision = RULES
            .iter()
            .find_map(|rule| rule(set, &metrics))
            .unwrap_or_else(|| high_agreement_high_risk(&metrics));

        info!(
            rule = decision.rule_applied().unwrap_or_default(),
            disposition = %decision.disposition,
            agreement_pct = metrics.agreement_pct,
            max_risk = metrics.max_risk,
            "Decision cascade applied"
        );
        decision
    }
}

fn safety_veto(set: &VoteSet, _metrics: &VoteMetrics) -> Option<FinalDecision> {
    let (name, vote) = set
        .iter()
        .find(|(_, v)| v.disposition == Disposition::Veto)?;
    Some(
        FinalDecision::new(
            FinalDisposition::Refuse,
            format!("Safety veto applied by {}. Reason: {}", name, vote.reasoning),
            CascadeRule::SafetyVeto.as_str(),
        )
        .with_meta("veto_agent", name.as_str())
        .with_meta("veto_risk", vote.risk),
    )
}

fn low_confidence(set: &VoteSet, _metrics: &VoteMetrics) -> Option<FinalDecision> {
    let (name, vote) = set
        .iter()
        .find(|(_, v)| v.confidence < CONFIDENCE_FLOOR)?;
    Some(
        FinalDecision::new(
            FinalDisposition::Refuse,
            format!(
                "{} has very low confidence ({:.1}%). Cannot proceed with confidence below {}%. Reason: {}",
                name, vote.confidence, CONFIDENCE_FLOOR, vote.reasoning
            ),
            CascadeRule::LowConfidence.as_str(),
        )
        .with_meta("low_confidence_agent", name.as_str())
        .with_meta("min_confidence", vote.confidence),
    )
}

fn low_agreement(set: &VoteSet, metrics: &VoteMetrics) -> Option<FinalDecision> {
    if metrics.agreement_pct >= LOW_AGREEMENT_BELOW {
        return None;
    }
    let dissenting: Vec<String> = set
        .iter()
        .filter(|(_, v)| v.disposition != Disposition::Act)
        .map(|(name, _)| name.clone())
        .collect();
    Some(
        FinalDecision::new(
            FinalDisposition::Refuse,
            format!(
                "Insufficient agreement ({:.1}%). Agents in disagreement: {}. At least {}% agreement required.",
                metrics.agreement_pct,
                dissenting.join(", "),
                LOW_AGREEMENT_BELOW
            ),
            CascadeRule::LowAgreement.as_str(),
        )
        .with_meta("agreement_percentage", metrics.agreement_pct)
        .with_meta("disagreeing_agents", dissenting),
    )
}

fn medium_agreement(_set: &VoteSet, metrics: &VoteMetrics) -> Option<FinalDecision> {
    if !(LOW_AGREEMENT_BELOW..=MEDIUM_AGREEMENT_UP_TO).contains(&metrics.agreement_pct) {
        return None;
    }
    Some(with_metrics(
        FinalDecision::new(
            FinalDisposition::Warn,
            format!(
                "Moderate agreement ({:.1}%) with mixed confidence. Average confidence: {:.1}%, Max risk: {:.1}%. Proceeding with caution - REVIEW CAREFULLY.",
                metrics.agreement_pct, metrics.avg_confidence, metrics.max_risk
            ),
            CascadeRule::MediumAgreement.as_str(),
        ),
        metrics,
    ))
}

fn high_agreement_low_risk(_set: &VoteSet, metrics: &VoteMetrics) -> Option<FinalDecision> {
    if !(metrics.agreement_pct > MEDIUM_AGREEMENT_UP_TO && metrics.max_risk < ACCEPTABLE_RISK_BELOW)
    {
        return None;
    }
    Some(with_metrics(
        FinalDecision::new(
            FinalDisposition::Act,
            format!(
                "Strong agreement ({:.1}%) with acceptable risk. Average confidence: {:.1}%, Max risk: {:.1}%. Safe to proceed.",
                metrics.agreement_pct, metrics.avg_confidence, metrics.max_risk
            ),
            CascadeRule::HighAgreementLowRisk.as_str(),
        ),
        metrics,
    ))
}

fn high_agreement_high_risk(metrics: &VoteMetrics) -> FinalDecision {
    with_metrics(
        FinalDecision::new(
            FinalDisposition::Warn,
            format!(
                "High agreement ({:.1}%) but elevated risk ({:.1}%). Average confidence: {:.1}%. Proceed with extreme caution.",
                metrics.agreement_pct, metrics.max_risk, metrics.avg_confidence
            ),
            CascadeRule::HighAgreementHighRisk.as_str(),
        ),
        metrics,
    )
}

fn with_metrics(decision: FinalDecision, metrics: &VoteMetrics) -> FinalDecision {
    decision
        .with_meta("agreement_percentage", metrics.agreement_pct)
        .with_meta("avg_confidence", metrics.avg_confidence)
        .with_meta("max_risk", metrics.max_risk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(confidence: f64, risk: f64, disposition: Disposition) -> Decision {
        Decision::new(confidence, risk, disposition, format!("{} reasoning", disposition))
    }

    fn names(n: usize) -> Vec<String> {
        ["Utility Agent", "Accuracy Agent", "Safety Agent", "Extra Agent", "Fifth Agent"]
            .iter()
            .take(n)
            .map(|s| s.to_string())
            .collect()
    }

    fn apply(votes: &[Decision]) -> FinalDecision {
        DecisionCascade::apply(votes, &names(votes.len())).unwrap()
    }

    #[test]
    fn test_veto_overrides_everything() {
        let fd = apply(&[
            vote(95.0, 5.0, Disposition::Act),
            vote(95.0, 5.0, Disposition::Act),
            vote(90.0, 70.0, Disposition::Veto),
        ]);
        assert_eq!(fd.disposition, FinalDisposition::Refuse);
        assert_eq!(fd.rule_applied(), Some("safety_veto"));
        assert_eq!(fd.metadata["veto_agent"], "Safety Agent");
        assert_eq!(fd.metric("veto_risk"), Some(70.0));
        assert!(fd.reasoning.contains("VETO reasoning"));
    }

    #[test]
    fn test_veto_precedes_low_confidence() {
        let fd = apply(&[
            vote(10.0, 5.0, Disposition::Refuse),
            vote(95.0, 5.0, Disposition::Act),
            vote(90.0, 55.0, Disposition::Veto),
        ]);
        assert_eq!(fd.rule_applied(), Some("safety_veto"));
    }

    #[test]
    fn test_low_confidence_names_first_offender() {
        let fd = apply(&[
            vote(70.0, 5.0, Disposition::Act),
            vote(39.9, 5.0, Disposition::Refuse),
            vote(20.0, 5.0, Disposition::Act),
        ]);
        assert_eq!(fd.disposition, FinalDisposition::Refuse);
        assert_eq!(fd.rule_applied(), Some("low_confidence"));
        assert_eq!(fd.metadata["low_confidence_agent"], "Accuracy Agent");
        assert_eq!(fd.metric("min_confidence"), Some(39.9));
        assert!(fd.reasoning.contains("(39.9%)"));
    }

    #[test]
    fn test_confidence_exactly_forty_passes_floor() {
        let fd = apply(&[
            vote(40.0, 5.0, Disposition::Act),
            vote(90.0, 5.0, Disposition::Act),
            vote(90.0, 5.0, Disposition::Act),
        ]);
        assert_eq!(fd.rule_applied(), Some("high_agreement_low_risk"));
    }

    #[test]
    fn test_low_agreement_lists_dissenters() {
        let fd = apply(&[
            vote(70.0, 5.0, Disposition::Act),
            vote(70.0, 5.0, Disposition::Warn),
            vote(70.0, 35.0, Disposition::Warn),
        ]);
        assert_eq!(fd.disposition, FinalDisposition::Refuse);
        assert_eq!(fd.rule_applied(), Some("low_agreement"));
        assert_eq!(
            fd.metadata["disagreeing_agents"],
            serde_json::json!(["Accuracy Agent", "Safety Agent"])
        );
        assert!(fd.reasoning.contains("Insufficient agreement (33.3%)"));
    }

    #[test]
    fn test_two_of_three_is_medium_agreement() {
        let fd = apply(&[
            vote(70.0, 10.0, Disposition::Act),
            vote(70.0, 10.0, Disposition::Warn),
            vote(90.0, 20.0, Disposition::Act),
        ]);
        assert_eq!(fd.disposition, FinalDisposition::Warn);
        assert_eq!(fd.rule_applied(), Some("medium_agreement"));
        let pct = fd.metric("agreement_percentage").unwrap();
        assert!((pct - 200.0 / 3.0).abs() < 1e-9);
        assert!(fd.metric("avg_confidence").is_some());
        assert_eq!(fd.metric("max_risk"), Some(20.0));
    }

    #[test]
    fn test_agreement_boundaries_inclusive() {
        // 3 of 5 ACT = exactly 60 %.
        let mut votes = vec![vote(70.0, 5.0, Disposition::Act); 3];
        votes.extend(vec![vote(70.0, 5.0, Disposition::Warn); 2]);
        assert_eq!(apply(&votes).rule_applied(), Some("medium_agreement"));

        // 4 of 5 ACT = exactly 80 %.
        let mut votes = vec![vote(70.0, 5.0, Disposition::Act); 4];
        votes.push(vote(70.0, 5.0, Disposition::Warn));
        assert_eq!(apply(&votes).rule_applied(), Some("medium_agreement"));
    }

    #[test]
    fn test_unanimous_low_risk_acts() {
        let fd = apply(&[
            vote(90.0, 5.0, Disposition::Act),
            vote(92.0, 8.0, Disposition::Act),
            vote(88.0, 29.9, Disposition::Act),
        ]);
        assert_eq!(fd.disposition, FinalDisposition::Act);
        assert_eq!(fd.rule_applied(), Some("high_agreement_low_risk"));
        assert_eq!(fd.metric("agreement_percentage"), Some(100.0));
        assert_eq!(fd.metric("avg_confidence"), Some(90.0));
    }

    #[test]
    fn test_unanimous_risk_thirty_falls_back_to_warn() {
        let fd = apply(&[
            vote(90.0, 5.0, Disposition::Act),
            vote(90.0, 30.0, Disposition::Act),
            vote(90.0, 5.0, Disposition::Act),
        ]);
        assert_eq!(fd.disposition, FinalDisposition::Warn);
        assert_eq!(fd.rule_applied(), Some("high_agreement_high_risk"));
        assert_eq!(fd.metric("max_risk"), Some(30.0));
    }

    #[test]
    fn test_single_voter() {
        let fd = apply(&[vote(75.0, 10.0, Disposition::Act)]);
        assert_eq!(fd.rule_applied(), Some("high_agreement_low_risk"));

        let fd = apply(&[vote(75.0, 10.0, Disposition::Warn)]);
        assert_eq!(fd.rule_applied(), Some("low_agreement"));
    }

    #[test]
    fn test_rejects_empty_and_misaligned_sets() {
        assert_eq!(
            DecisionCascade::apply(&[], &[]).unwrap_err(),
            CascadeError::Empty
        );
        let err = DecisionCascade::apply(&[vote(70.0, 5.0, Disposition::Act)], &names(2))
            .unwrap_err();
        assert_eq!(err, CascadeError::LengthMismatch { votes: 1, names: 2 });
    }

    /// Bypasses `Decision::new`, which would clamp the signals.
    fn raw_vote(confidence: f64, risk: f64) -> Decision {
        Decision {
            confidence,
            risk,
            disposition: Disposition::Act,
            reasoning: "raw".to_string(),
        }
    }

    #[test]
    fn test_nan_confidence_rejected() {
        let votes = vec![
            raw_vote(f64::NAN, 5.0),
            vote(90.0, 5.0, Disposition::Act),
            vote(90.0, 5.0, Disposition::Act),
        ];
        match DecisionCascade::apply(&votes, &names(3)).unwrap_err() {
            CascadeError::Malformed {
                agent,
                field,
                value,
            } => {
                assert_eq!(agent, "Utility Agent");
                assert_eq!(field, "confidence");
                assert!(value.is_nan());
            }
            other => panic!("expected malformed vote, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_signals_rejected() {
        let votes = vec![vote(90.0, 5.0, Disposition::Act), raw_vote(-500.0, 5.0)];
        assert_eq!(
            DecisionCascade::apply(&votes, &names(2)).unwrap_err(),
            CascadeError::Malformed {
                agent: "Accuracy Agent".to_string(),
                field: "confidence",
                value: -500.0,
            }
        );

        let votes = vec![raw_vote(90.0, 150.0)];
        assert_eq!(
            DecisionCascade::apply(&votes, &names(1)).unwrap_err(),
            CascadeError::Malformed {
                agent: "Utility Agent".to_string(),
                field: "risk",
                value: 150.0,
            }
        );
    }

    #[test]
    fn test_deserialized_vote_is_still_checked() {
        let json = r#"{"confidence":-500.0,"risk":5.0,"disposition":"ACT","reasoning":"x"}"#;
        let bad: Decision = serde_json::from_str(json).unwrap();
        let err = VoteSet::new(vec![bad], names(1)).unwrap_err();
        assert!(matches!(err, CascadeError::Malformed { field: "confidence", .. }));
    }

    #[test]
    fn test_signal_bounds_are_inclusive() {
        let votes = vec![raw_vote(100.0, 0.0), raw_vote(40.0, 0.0)];
        assert!(VoteSet::new(votes, names(2)).is_ok());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let votes = vec![
            vote(70.0, 10.0, Disposition::Act),
            vote(65.0, 12.0, Disposition::Warn),
            vote(88.0, 25.0, Disposition::Act),
        ];
        let first = apply(&votes);
        let second = apply(&votes);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
