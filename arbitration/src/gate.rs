//! Input Gate — adversarial screening before any agent is consulted.
//!
//! Scores a raw query against a fixed set of additive checks and decides
//! whether deliberation may start. The gate is a pure function of the
//! query string: no I/O, no state carried between calls.
//!
//! # Scoring
//!
//! | Check                               | Score | Issue |
//! |-------------------------------------|-------|-------|
//! | longer than 5000 chars              | +30   | yes   |
//! | shorter than 3 chars                | +10   | yes   |
//! | prompt-injection phrase             | +80   | yes   |
//! | safety-override or SQL pattern      | +60   | yes   |
//! | special characters > 30 % of input  | +20   | yes   |
//! | one character repeated ≥ 21 times   | +40   | yes   |
//! | raw null byte                       | +90   | yes   |
//! | CJK mixed with Latin                | +5    | no    |
//!
//! A query is valid while its score stays below 50. The reported score is
//! clamped to 100.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decision::{FinalDecision, FinalDisposition};

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_CHARS: usize = 5000;
/// Minimum accepted query length, in characters.
pub const MIN_QUERY_CHARS: usize = 3;
/// Queries scoring at or above this are rejected.
pub const BLOCK_THRESHOLD: u32 = 50;
/// Runs of a single character at least this long count as spam.
const REPEAT_RUN_LIMIT: usize = 21;
const SPECIAL_CHAR_RATIO_LIMIT: f64 = 0.3;

const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(?:all\s+)?(previous|prior|all|above)\s+instructions?",
    r"disregard\s+(?:all\s+)?(previous|prior|all|above)",
    r"forget\s+(everything|all|previous)",
    r"you\s+are\s+now",
    r"new\s+instructions?:",
    r"system\s*:\s*",
    r"<\s*system\s*>",
    r"act\s+as\s+(if|though)",
    r"pretend\s+(you|to)\s+are",
    r"roleplay\s+as",
    r"\[SYSTEM\]",
    r"\[INST\]",
    r"sudo\s+mode",
    r"developer\s+mode",
    r"jailbreak",
];

const OVERRIDE_PATTERNS: &[&str] = &[
    r"bypass\s+(safety|security|filter)",
    r"override\s+(safety|security|ethics)",
    r"disable\s+(safety|filter|check)",
    r"without\s+(safety|ethics|checking)",
    r"ignore\s+(ethics|safety|warnings?)",
];

const SQL_PATTERNS: &[&str] = &[
    r"'\s*OR\s+'",
    r"--\s*$",
    r";\s*DROP\s+TABLE",
    r"UNION\s+SELECT",
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("gate pattern should compile")
        })
        .collect()
}

static INJECTION_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(INJECTION_PATTERNS));
static OVERRIDE_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(OVERRIDE_PATTERNS));
static SQL_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(SQL_PATTERNS));
static CJK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]").expect("CJK_RE regex should compile"));
static LATIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]").expect("LATIN_RE regex should compile"));

/// Category of a gate finding. Declaration order is fallback priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    PromptInjection,
    ExcessiveLength,
    SqlInjection,
    NullByte,
    SuspiciousOverride,
    TooShort,
    SpecialCharacters,
    RepeatedCharacters,
}

impl ThreatCategory {
    /// Fixed user-facing message for a refusal caused by this category.
    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::PromptInjection => {
                "I've detected an attempt to override my instructions. I cannot comply with requests to ignore my core behaviors or safety guidelines."
            }
            Self::ExcessiveLength => {
                "Your query exceeds the maximum allowed length. Please provide a more concise question."
            }
            Self::SqlInjection => {
                "Your query contains patterns that could be harmful. Please rephrase your question."
            }
            Self::NullByte => "Your query contains invalid characters. Please use standard text only.",
            Self::SuspiciousOverride
            | Self::TooShort
            | Self::SpecialCharacters
            | Self::RepeatedCharacters => {
                "I cannot disable or bypass safety mechanisms. Please ask a different question."
            }
        }
    }

    /// Whether this category selects its own refusal message.
    fn has_dedicated_fallback(self) -> bool {
        matches!(
            self,
            Self::PromptInjection | Self::ExcessiveLength | Self::SqlInjection | Self::NullByte
        )
    }
}

/// A single gate finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateIssue {
    pub category: ThreatCategory,
    pub message: String,
}

impl std::fmt::Display for GateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the caller should do with a scored query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Allow,
    Warn,
    Escalate,
    Block,
}

impl Recommendation {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            Self::Block
        } else if score >= 50 {
            Self::Escalate
        } else if score >= 20 {
            Self::Warn
        } else {
            Self::Allow
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Warn => write!(f, "WARN"),
            Self::Escalate => write!(f, "ESCALATE"),
            Self::Block => write!(f, "BLOCK"),
        }
    }
}

/// Result of screening one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub is_valid: bool,
    /// Additive score clamped to `[0, 100]`.
    pub risk_score: u32,
    /// Findings in detection order.
    pub issues: Vec<GateIssue>,
    pub recommendation: Recommendation,
}

impl GateVerdict {
    /// Issue messages in detection order.
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }

    /// The category that selects the refusal message.
    ///
    /// Prompt injection outranks excessive length, which outranks SQL
    /// patterns, then null bytes; anything else gets the generic
    /// safety-override message.
    pub fn primary_category(&self) -> ThreatCategory {
        self.issues
            .iter()
            .map(|i| i.category)
            .filter(|c| c.has_dedicated_fallback())
            .min()
            .unwrap_or(ThreatCategory::SuspiciousOverride)
    }

    /// Terminal refusal returned in place of a debate when the query is blocked.
    pub fn refusal(&self) -> FinalDecision {
        let reasoning = format!(
            "Security validation failed: {}. {}",
            self.issue_messages().join(", "),
            self.primary_category().fallback_message()
        );
        FinalDecision::new(FinalDisposition::Refuse, reasoning, "security_block")
            .with_meta("security_block", true)
            .with_meta("risk_score", self.risk_score)
            .with_meta("issues", self.issue_messages())
    }
}

/// Stateless query screener.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputGate;

impl InputGate {
    pub fn new() -> Self {
        Self
    }

    /// Score a query and decide whether deliberation may start.
    pub fn validate(&self, query: &str) -> GateVerdict {
        let mut issues = Vec::new();
        let mut score: u32 = 0;
        let length = query.chars().count();

        if length > MAX_QUERY_CHARS {
            issues.push(GateIssue {
                category: ThreatCategory::ExcessiveLength,
                message: format!("Query exceeds maximum length ({} chars)", MAX_QUERY_CHARS),
            });
            score += 30;
        }
        if length < MIN_QUERY_CHARS {
            issues.push(GateIssue {
                category: ThreatCategory::TooShort,
                message: format!("Query too short (min {} chars)", MIN_QUERY_CHARS),
            });
            score += 10;
        }

        let injection = matching_patterns(&INJECTION_RE, query);
        if !injection.is_empty() {
            issues.push(GateIssue {
                category: ThreatCategory::PromptInjection,
                message: format!("Prompt injection detected: {:?}", injection),
            });
            score += 80;
        }

        let overrides = matching_patterns(&OVERRIDE_RE, query);
        let sql = matching_patterns(&SQL_RE, query);
        if !overrides.is_empty() || !sql.is_empty() {
            let category = if sql.is_empty() {
                ThreatCategory::SuspiciousOverride
            } else {
                ThreatCategory::SqlInjection
            };
            let matched: Vec<&str> = overrides.into_iter().chain(sql).collect();
            issues.push(GateIssue {
                category,
                message: format!("Suspicious patterns detected: {:?}", matched),
            });
            score += 60;
        }

        let special = query
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace())
            .count();
        let ratio = special as f64 / length.max(1) as f64;
        if ratio > SPECIAL_CHAR_RATIO_LIMIT {
            issues.push(GateIssue {
                category: ThreatCategory::SpecialCharacters,
                message: format!("Excessive special characters ({:.1}%)", ratio * 100.0),
            });
            score += 20;
        }

        if longest_run(query) >= REPEAT_RUN_LIMIT {
            issues.push(GateIssue {
                category: ThreatCategory::RepeatedCharacters,
                message: "Repeated character spam detected".to_string(),
            });
            score += 40;
        }

        // Mixed scripts are common in legitimate text; score only.
        if CJK_RE.is_match(query) && LATIN_RE.is_match(query) {
            score += 5;
        }

        if query.contains('\0') {
            issues.push(GateIssue {
                category: ThreatCategory::NullByte,
                message: "Null byte injection detected".to_string(),
            });
            score += 90;
        }

        let verdict = GateVerdict {
            is_valid: score < BLOCK_THRESHOLD,
            risk_score: score.min(100),
            issues,
            recommendation: Recommendation::from_score(score),
        };

        if verdict.is_valid {
            debug!(risk_score = verdict.risk_score, "Input gate passed");
        } else {
            warn!(
                risk_score = verdict.risk_score,
                recommendation = %verdict.recommendation,
                issues = verdict.issues.len(),
                "Input gate blocked query"
            );
        }

        verdict
    }
}

fn matching_patterns<'a>(patterns: &'a [Regex], query: &str) -> Vec<&'a str> {
    patterns
        .iter()
        .filter(|re| re.is_match(query))
        .map(|re| re.as_str())
        .collect()
}

/// Length of the longest run of one repeated character, ignoring newlines.
fn longest_run(query: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;
    for c in query.chars() {
        if c == '\n' {
            current = 0;
            previous = None;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}
