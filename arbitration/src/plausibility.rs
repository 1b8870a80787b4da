//! Advisory plausibility checks on the agents' own confidence claims.
//!
//! These heuristics flag overconfident votes and mechanically uniform
//! consensus. They are informational only: findings are logged and
//! attached to the outcome, but never reach the decision cascade.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::decision::Decision;

/// Findings for one vote or for the vote set as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlausibilityFinding {
    pub issues: Vec<String>,
}

impl PlausibilityFinding {
    pub fn is_suspicious(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Flag a single vote whose confidence outruns its evidence.
///
/// Lengths are counted in characters.
pub fn check_overconfidence(
    confidence: f64,
    reasoning_len: usize,
    query_len: usize,
) -> PlausibilityFinding {
    let mut issues = Vec::new();

    if confidence >= 95.0 && reasoning_len < 100 {
        issues.push("Extremely high confidence with minimal reasoning".to_string());
    }
    if confidence >= 90.0 && query_len > 500 {
        issues.push("High confidence for complex query - may be oversimplifying".to_string());
    }
    if confidence == 100.0 && query_len > 50 {
        issues.push("Perfect confidence on non-trivial query".to_string());
    }

    PlausibilityFinding { issues }
}

/// Flag consensus that looks coordinated rather than debated.
///
/// Needs at least two votes; smaller sets are never flagged.
pub fn check_consensus_quality(votes: &[Decision]) -> PlausibilityFinding {
    let mut issues = Vec::new();
    if votes.len() < 2 {
        return PlausibilityFinding { issues };
    }

    let confidences: Vec<f64> = votes.iter().map(|v| v.confidence).collect();
    let first = confidences[0];
    if confidences.iter().all(|c| *c == first) {
        issues.push("All agents have identical confidence - possible coordination".to_string());
    }

    let n = confidences.len() as f64;
    let mean = confidences.iter().sum::<f64>() / n;
    let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    if variance < 10.0 && confidences.iter().all(|c| *c > 80.0) {
        issues.push("Artificially high consensus - agents may not be truly debating".to_string());
    }

    PlausibilityFinding { issues }
}

/// Overconfidence finding for one named agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFinding {
    pub agent: String,
    pub finding: PlausibilityFinding,
}

/// All plausibility findings for one debate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlausibilityReport {
    /// Only agents with at least one issue are listed.
    pub overconfident: Vec<AgentFinding>,
    pub consensus: PlausibilityFinding,
}

impl PlausibilityReport {
    /// Run both heuristics over a final vote set.
    pub fn assess(query: &str, votes: &[Decision], names: &[String]) -> Self {
        let query_len = query.chars().count();

        let overconfident: Vec<AgentFinding> = votes
            .iter()
            .zip(names)
            .filter_map(|(vote, name)| {
                let finding = check_overconfidence(
                    vote.confidence,
                    vote.reasoning.chars().count(),
                    query_len,
                );
                finding.is_suspicious().then(|| AgentFinding {
                    agent: name.clone(),
                    finding,
                })
            })
            .collect();

        for f in &overconfident {
            warn!(agent = %f.agent, issues = ?f.finding.issues, "Suspicious confidence");
        }

        let consensus = check_consensus_quality(votes);
        if consensus.is_suspicious() {
            warn!(issues = ?consensus.issues, "Suspicious consensus pattern");
        }

        Self {
            overconfident,
            consensus,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.overconfident.is_empty() && !self.consensus.is_suspicious()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Disposition;

    fn vote(confidence: f64) -> Decision {
        Decision::new(confidence, 5.0, Disposition::Act, "reasoning")
    }

    #[test]
    fn test_terse_high_confidence_flagged() {
        let f = check_overconfidence(95.0, 99, 10);
        assert_eq!(f.issues.len(), 1);
        assert!(!check_overconfidence(95.0, 100, 10).is_suspicious());
        assert!(!check_overconfidence(94.9, 10, 10).is_suspicious());
    }

    #[test]
    fn test_complex_query_confidence_flagged() {
        assert!(check_overconfidence(90.0, 500, 501).is_suspicious());
        assert!(!check_overconfidence(90.0, 500, 500).is_suspicious());
    }

    #[test]
    fn test_perfect_confidence_on_nontrivial_query() {
        let f = check_overconfidence(100.0, 500, 51);
        assert_eq!(f.issues, vec!["Perfect confidence on non-trivial query"]);
        assert!(!check_overconfidence(100.0, 500, 50).is_suspicious());
    }

    #[test]
    fn test_identical_confidences_flagged() {
        let f = check_consensus_quality(&[vote(70.0), vote(70.0), vote(70.0)]);
        assert_eq!(f.issues.len(), 1);
        assert!(f.issues[0].contains("identical"));
    }

    #[test]
    fn test_low_variance_high_consensus_flagged() {
        let f = check_consensus_quality(&[vote(90.0), vote(92.0), vote(94.0)]);
        assert_eq!(f.issues.len(), 1);
        assert!(f.issues[0].contains("Artificially high consensus"));

        // Same spread, but one agent not above 80.
        let f = check_consensus_quality(&[vote(80.0), vote(82.0), vote(84.0)]);
        assert!(!f.is_suspicious());
    }

    #[test]
    fn test_genuine_spread_not_flagged() {
        let f = check_consensus_quality(&[vote(85.0), vote(95.0), vote(60.0)]);
        assert!(!f.is_suspicious());
    }

    #[test]
    fn test_single_vote_never_flagged() {
        assert!(!check_consensus_quality(&[vote(99.0)]).is_suspicious());
        assert!(!check_consensus_quality(&[]).is_suspicious());
    }

    #[test]
    fn test_report_names_overconfident_agents() {
        let votes = vec![vote(99.0), vote(60.0)];
        let names = vec!["Utility Agent".to_string(), "Accuracy Agent".to_string()];
        let report = PlausibilityReport::assess("short query", &votes, &names);
        assert_eq!(report.overconfident.len(), 1);
        assert_eq!(report.overconfident[0].agent, "Utility Agent");
        assert!(!report.is_clean());
    }
}
