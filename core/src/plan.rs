//! Plans: ordered, annotated SQL steps.
//!
//! A plan is produced once from a `(before, after)` schema pair and is
//! immutable afterwards. It serializes to a forward-compatible JSON shape;
//! unknown fields are ignored on read.

use schema_model::Dialect;
use serde::{Deserialize, Serialize};

/// Precomputed classification of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Review,
    Lossy,
    Dangerous,
    MultiPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Safety {
    pub level: SafetyLevel,
    pub breaking_change: bool,
    pub data_loss: bool,
    pub rollback_description: String,
    pub rollback_data_loss: bool,
    #[serde(default)]
    pub safer_alternatives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateTable,
    DropTable,
    AddColumn,
    DropColumn,
    AlterColumnType,
    SetNotNull,
    DropNotNull,
    ChangeDefault,
    AddUnique,
    DropUnique,
    SetPrimaryKey,
    DropPrimaryKey,
    AddIndex,
    DropIndex,
    AddForeignKey,
    DropForeignKey,
    EnableRls,
    DisableRls,
    RebuildTable,
    CommentOnTable,
    CommentOnColumn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    pub sql: Vec<String>,
    pub operation_kind: OperationKind,
    /// The table, column or index the step acts on.
    pub entity_ref: String,
    pub safety: Safety,
    pub reversible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    pub target_dialect: Dialect,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(target_dialect: Dialect) -> Plan {
        Plan {
            source_hash: None,
            target_dialect,
            steps: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The highest safety level across the plan's steps.
    pub fn highest_safety_level(&self) -> Option<SafetyLevel> {
        self.steps.iter().map(|s| s.safety.level).max_by_key(|l| match l {
            SafetyLevel::Safe => 0,
            SafetyLevel::Review => 1,
            SafetyLevel::Lossy => 2,
            SafetyLevel::Dangerous => 3,
            SafetyLevel::MultiPhase => 4,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("plan serializes")
    }

    pub fn from_json(json: &str) -> Result<Plan, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// One line per step for human review.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            let level = match step.safety.level {
                SafetyLevel::Safe => "safe",
                SafetyLevel::Review => "review",
                SafetyLevel::Lossy => "lossy",
                SafetyLevel::Dangerous => "dangerous",
                SafetyLevel::MultiPhase => "multi-phase",
            };
            out.push_str(&format!("{:>3}. [{level}] {}\n", i + 1, step.description));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> Plan {
        Plan {
            source_hash: Some("abc123".into()),
            target_dialect: Dialect::Postgres,
            steps: vec![PlanStep {
                description: "add column email to users".into(),
                sql: vec!["ALTER TABLE \"users\" ADD COLUMN \"email\" text".into()],
                operation_kind: OperationKind::AddColumn,
                entity_ref: "users.email".into(),
                safety: Safety {
                    level: SafetyLevel::Safe,
                    breaking_change: false,
                    data_loss: false,
                    rollback_description: "drop the column".into(),
                    rollback_data_loss: false,
                    safer_alternatives: vec![],
                },
                reversible: true,
            }],
        }
    }

    #[test]
    fn plan_json_round_trips() {
        let plan = sample_plan();
        let back = Plan::from_json(&plan.to_json()).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn unknown_fields_are_ignored_on_read() {
        let mut value: serde_json::Value = serde_json::from_str(&sample_plan().to_json()).unwrap();
        value["future_field"] = serde_json::json!({"x": 1});
        value["steps"][0]["another"] = serde_json::json!(true);
        let back = Plan::from_json(&value.to_string()).unwrap();
        assert_eq!(back, sample_plan());
    }

    #[test]
    fn highest_safety_level_picks_the_worst_step() {
        let mut plan = sample_plan();
        let mut step = plan.steps[0].clone();
        step.safety.level = SafetyLevel::Dangerous;
        plan.steps.push(step);
        assert_eq!(plan.highest_safety_level(), Some(SafetyLevel::Dangerous));
    }
}
