//! Typed contracts for pipeline stage inputs and outputs.
//!
//! Model responses are parsed into these tagged types with an explicit
//! parse-or-fail-open policy per stage, never accessed as loose JSON.

use serde::{Deserialize, Serialize};

use crate::sql_engine::QueryResult;

/// One schema table a question was judged to concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantTable {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Noun-bearing columns (names, entities), excluding ids and numerics.
    #[serde(default)]
    pub noun_columns: Vec<String>,
}

/// Outcome of the schema-relevance filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceResult {
    pub is_relevant: bool,
    #[serde(default)]
    pub relevant_tables: Vec<RelevantTable>,
}

impl RelevanceResult {
    /// Fail-open default used when the model output cannot be parsed:
    /// attempt SQL rather than silently refusing.
    pub fn fail_open() -> Self {
        Self {
            is_relevant: true,
            relevant_tables: Vec::new(),
        }
    }
}

/// Verdict from the SQL validator/fixer stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(default)]
    pub issues: Option<String>,
    pub corrected_query: String,
}

impl ValidationVerdict {
    /// Fail-open default when the verdict cannot be parsed: keep the
    /// candidate query unchanged.
    pub fn fail_open() -> Self {
        Self {
            valid: true,
            issues: None,
            corrected_query: "None".to_string(),
        }
    }
}

/// Recommended chart type for a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    HorizontalBar,
    Line,
    Pie,
    Scatter,
    None,
}

/// Output of the visualization recommender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationHint {
    #[serde(rename = "recommended_visualization")]
    pub chart_type: ChartType,
    pub reason: String,
}

impl VisualizationHint {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            chart_type: ChartType::None,
            reason: reason.into(),
        }
    }
}

/// One event emitted while the pipeline runs, in stage-execution order.
/// Append-only: no event is retracted or revised after emission.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", content = "output", rename_all = "snake_case")]
pub enum PipelineEvent {
    Relevance(RelevanceResult),
    Sql { query: String },
    Validation(ValidationVerdict),
    Results(QueryResult),
    Answer { answer: String },
    Visualization(VisualizationHint),
}

/// How a stage hands control to the next one. Fatal errors travel as
/// `Err(_)` on the surrounding `Result`, never as exceptions across stage
/// boundaries.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Continue(T),
    ShortCircuit(ShortCircuit),
}

/// Modeled short-circuits that skip straight to the formatter.
#[derive(Debug, Clone)]
pub enum ShortCircuit {
    /// The schema lacks the columns needed to answer the question.
    InsufficientInfo,
    /// The validator rejected the query and could not produce a usable fix.
    UnusableQuery { issues: Option<String> },
}
