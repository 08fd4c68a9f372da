//! Recommendation engine
//!
//! Turns a `BenchmarkResult` into an ordered list of recommendations. The
//! rule set is a table of independent `(predicate, builder)` pairs; the
//! engine evaluates every rule, then orders the output by severity with
//! ties kept in declaration order.

mod rules;

pub use rules::{default_rules, HostOs, Rule, RuleContext};

use crate::config::RuleThresholds;
use crate::models::BenchmarkResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Router,
    System,
    Dns,
    Nic,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Router => "Router",
            Category::System => "System",
            Category::Dns => "DNS",
            Category::Nic => "NIC",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// One suggested change, with the commands to apply and to undo it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub confidence: Confidence,
    pub estimated_impact: String,
    pub commands: Vec<String>,
    pub rollback_commands: Vec<String>,
    pub requires_admin: bool,
    pub reversible: bool,
    pub risk_level: RiskLevel,
}

/// Pure, deterministic mapping from a benchmark result to recommendations
pub struct RecommendationEngine {
    thresholds: RuleThresholds,
    rules: Vec<Rule>,
}

impl RecommendationEngine {
    /// Engine with the built-in rule table
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self::with_rules(thresholds, default_rules())
    }

    pub fn with_rules(thresholds: RuleThresholds, rules: Vec<Rule>) -> Self {
        Self { thresholds, rules }
    }

    /// Evaluate every rule against `result`. Output is ordered by
    /// descending severity, ties in rule declaration order.
    pub fn evaluate(&self, result: &BenchmarkResult) -> Vec<Recommendation> {
        let ctx = RuleContext {
            thresholds: self.thresholds.clone(),
            os: HostOs::from_name(&result.system_info.os),
        };

        let mut matched: Vec<(u8, Recommendation)> = self
            .rules
            .iter()
            .filter(|rule| (rule.applies)(result, &ctx))
            .map(|rule| {
                let mut recommendation = (rule.build)(result, &ctx);
                if recommendation.rollback_commands.is_empty() && recommendation.reversible {
                    warn!(
                        rule = rule.id,
                        "Recommendation has no rollback commands, marking irreversible"
                    );
                    recommendation.reversible = false;
                }
                debug!(rule = rule.id, confidence = %recommendation.confidence, "Rule matched");
                (rule.severity, recommendation)
            })
            .collect();

        // Stable sort keeps declaration order among equal severities
        matched.sort_by(|a, b| b.0.cmp(&a.0));
        matched.into_iter().map(|(_, r)| r).collect()
    }
}
