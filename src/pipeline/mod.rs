//! Multi-stage SQL analysis pipeline.
//!
//! Stages run strictly in sequence over the immutable question/schema
//! pair: relevance filter, SQL generation, validation, execution, result
//! formatting, visualization recommendation. Each stage emits its output
//! to the caller before the next stage begins, and hands control forward
//! through [`StageOutcome`] rather than exceptions.

pub mod output;
pub mod prompts;
pub mod types;

use itertools::Itertools;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::llm::ChatBackend;
use crate::pipeline::types::{
    PipelineEvent, RelevanceResult, ShortCircuit, StageOutcome, ValidationVerdict,
    VisualizationHint,
};
use crate::sql_engine::{QueryExecutor, QueryResult};
use crate::stream::EventSink;

/// Sentinel returned by the generator when the schema cannot answer the
/// question. A control signal, not data.
pub const NOT_ENOUGH_INFO: &str = "NOT_ENOUGH_INFO";

/// Minimum similarity for fuzzy table-name normalization.
const TABLE_MATCH_THRESHOLD: f64 = 0.85;

/// What the formatter stage is asked to explain.
enum FormatterInput<'a> {
    Rows(&'a QueryResult),
    ExecutionError(&'a str),
    InsufficientInfo,
    UnusableQuery(Option<&'a str>),
}

pub struct AnalysisPipeline {
    /// Model for relevance, generation and formatting.
    primary: Arc<dyn ChatBackend>,
    /// Cheaper model for validation and visualization.
    fast: Arc<dyn ChatBackend>,
    executor: Arc<dyn QueryExecutor>,
}

impl AnalysisPipeline {
    pub fn new(
        primary: Arc<dyn ChatBackend>,
        fast: Arc<dyn ChatBackend>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            primary,
            fast,
            executor,
        }
    }

    /// Run all stages for one question, pushing each stage's output into
    /// the sink as soon as it is available.
    pub async fn run(&self, question: &str, schema: &str, sink: &EventSink) -> Result<()> {
        // Stage 1: relevance filter
        let relevance = self.relevance_filter(question, schema).await?;
        sink.emit(PipelineEvent::Relevance(relevance.clone())).await?;

        // Stage 2: SQL generation
        let candidate = match self.generate_sql(question, schema, &relevance).await? {
            StageOutcome::Continue(sql) => {
                sink.emit(PipelineEvent::Sql { query: sql.clone() }).await?;
                sql
            }
            StageOutcome::ShortCircuit(reason) => {
                return self.finish_without_results(question, reason, sink).await;
            }
        };

        // Stage 3: validation/fixing
        let final_sql = match self.validate_sql(schema, &candidate).await? {
            StageOutcome::Continue((sql, verdict)) => {
                sink.emit(PipelineEvent::Validation(verdict)).await?;
                sql
            }
            StageOutcome::ShortCircuit(reason) => {
                return self.finish_without_results(question, reason, sink).await;
            }
        };

        // Stage 4: execution. Engine failures become an error payload for
        // the formatter, so the caller still gets an explanation.
        match self.executor.execute(&final_sql).await {
            Ok(results) => {
                info!(rows = results.row_count(), "query executed");
                sink.emit(PipelineEvent::Results(results.clone())).await?;

                // Stage 5: result formatting
                let answer = self
                    .format_results(question, FormatterInput::Rows(&results))
                    .await?;
                sink.emit(PipelineEvent::Answer { answer }).await?;

                // Stage 6: visualization, only for non-degenerate results
                if !results.is_empty() {
                    let hint = self
                        .recommend_visualization(question, &final_sql, &results)
                        .await?;
                    sink.emit(PipelineEvent::Visualization(hint)).await?;
                }
                Ok(())
            }
            Err(EngineError::QueryExecution(message)) => {
                warn!("query execution failed: {}", message);
                let answer = self
                    .format_results(question, FormatterInput::ExecutionError(&message))
                    .await?;
                sink.emit(PipelineEvent::Answer { answer }).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Short-circuit tail: skip straight to the formatter. Visualization is
    /// skipped on these paths and the chart type is implicitly `none`.
    async fn finish_without_results(
        &self,
        question: &str,
        reason: ShortCircuit,
        sink: &EventSink,
    ) -> Result<()> {
        let input = match &reason {
            ShortCircuit::InsufficientInfo => FormatterInput::InsufficientInfo,
            ShortCircuit::UnusableQuery { issues } => {
                FormatterInput::UnusableQuery(issues.as_deref())
            }
        };
        let answer = self.format_results(question, input).await?;
        sink.emit(PipelineEvent::Answer { answer }).await?;
        Ok(())
    }

    async fn relevance_filter(&self, question: &str, schema: &str) -> Result<RelevanceResult> {
        let messages = prompts::build_relevance_prompt(schema, question);
        let response = self.primary.invoke(&messages).await?;
        let cleaned = output::extract_json(&response);

        let mut result = match serde_json::from_str::<RelevanceResult>(&cleaned) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("relevance output was not valid JSON, failing open: {}", e);
                RelevanceResult::fail_open()
            }
        };
        scrub_relevance(&mut result, schema);
        Ok(result)
    }

    async fn generate_sql(
        &self,
        question: &str,
        schema: &str,
        relevance: &RelevanceResult,
    ) -> Result<StageOutcome<String>> {
        let messages = prompts::build_sql_generation_prompt(schema, question, relevance);
        let response = self.primary.invoke(&messages).await?;
        let sql = output::clean_sql(&response);

        if sql == NOT_ENOUGH_INFO || sql.is_empty() {
            info!("generator returned the insufficient-information sentinel");
            return Ok(StageOutcome::ShortCircuit(ShortCircuit::InsufficientInfo));
        }
        Ok(StageOutcome::Continue(sql))
    }

    async fn validate_sql(
        &self,
        schema: &str,
        candidate: &str,
    ) -> Result<StageOutcome<(String, ValidationVerdict)>> {
        let parser_diagnostic = match Parser::parse_sql(&MySqlDialect {}, candidate) {
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        };

        let messages = prompts::build_validation_prompt(schema, candidate, parser_diagnostic.as_deref());
        let response = self.fast.invoke(&messages).await?;
        let cleaned = output::extract_json(&response);

        let verdict = match serde_json::from_str::<ValidationVerdict>(&cleaned) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("validation verdict was not valid JSON, failing open: {}", e);
                ValidationVerdict::fail_open()
            }
        };

        if verdict.valid {
            return Ok(StageOutcome::Continue((candidate.to_string(), verdict)));
        }

        let corrected = verdict.corrected_query.trim();
        if corrected.is_empty() || corrected == "None" {
            warn!(issues = ?verdict.issues, "validator found no usable fix");
            return Ok(StageOutcome::ShortCircuit(ShortCircuit::UnusableQuery {
                issues: verdict.issues.clone(),
            }));
        }

        info!(issues = ?verdict.issues, "validator corrected the query");
        let corrected = corrected.to_string();
        Ok(StageOutcome::Continue((corrected, verdict)))
    }

    async fn format_results(&self, question: &str, input: FormatterInput<'_>) -> Result<String> {
        let payload = match input {
            FormatterInput::Rows(results) => prompts::render_results_payload(results),
            FormatterInput::ExecutionError(message) => format!(
                "The SQL query failed to execute. Engine error: {}",
                message
            ),
            FormatterInput::InsufficientInfo => {
                "There was not enough information in the dataset schema to answer the question. \
                 Explain what is missing and suggest how the user could rephrase."
                    .to_string()
            }
            FormatterInput::UnusableQuery(issues) => format!(
                "The generated SQL query was invalid and could not be fixed. Issues: {}",
                issues.unwrap_or("unknown")
            ),
        };

        let messages = prompts::build_format_results_prompt(question, &payload);
        self.primary.invoke(&messages).await
    }

    async fn recommend_visualization(
        &self,
        question: &str,
        sql: &str,
        results: &QueryResult,
    ) -> Result<VisualizationHint> {
        let messages = prompts::build_visualization_prompt(question, sql, results);
        let response = self.fast.invoke(&messages).await?;
        let cleaned = output::extract_json(&response);

        match serde_json::from_str::<VisualizationHint>(&cleaned) {
            Ok(hint) => Ok(hint),
            Err(e) => {
                warn!("visualization hint was not valid JSON, failing open: {}", e);
                Ok(VisualizationHint::none(
                    "recommendation could not be parsed",
                ))
            }
        }
    }
}

/// Enforce the relevance invariant: every column name must appear verbatim
/// in the schema description for its own table, and table names are
/// normalized to the schema's spelling via case-insensitive fuzzy matching.
fn scrub_relevance(result: &mut RelevanceResult, schema: &str) {
    let schema_tables = parse_schema_tables(schema);
    let table_names: Vec<String> = schema_tables.iter().map(|(name, _)| name.clone()).collect();

    for table in &mut result.relevant_tables {
        if let Some(canonical) = match_table_name(&table.table_name, &table_names) {
            table.table_name = canonical;
        }
        // A column counts only if the matched table itself declares it.
        let own_columns: &[String] = schema_tables
            .iter()
            .find(|(name, _)| *name == table.table_name)
            .map(|(_, columns)| columns.as_slice())
            .unwrap_or(&[]);
        table.columns = table
            .columns
            .iter()
            .filter(|c| own_columns.contains(*c))
            .cloned()
            .unique()
            .collect();
        table.noun_columns = table
            .noun_columns
            .iter()
            .filter(|c| own_columns.contains(*c))
            .cloned()
            .unique()
            .collect();
    }
}

/// Per-table column lists as rendered by the schema description:
/// `Table: <name>` headers, each followed by `  - <column> (<type>)` lines.
fn parse_schema_tables(schema: &str) -> Vec<(String, Vec<String>)> {
    let mut tables: Vec<(String, Vec<String>)> = Vec::new();
    for line in schema.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("Table: ") {
            tables.push((name.trim().to_string(), Vec::new()));
        } else if let Some(rest) = trimmed.strip_prefix("- ") {
            let column = rest.rsplit_once(" (").map(|(name, _)| name).unwrap_or(rest);
            if let Some((_, columns)) = tables.last_mut() {
                columns.push(column.trim().to_string());
            }
        }
    }
    tables
}

fn match_table_name(mentioned: &str, schema_tables: &[String]) -> Option<String> {
    let lowered = mentioned.to_lowercase();
    if let Some(exact) = schema_tables
        .iter()
        .find(|t| t.to_lowercase() == lowered)
    {
        return Some(exact.clone());
    }
    schema_tables
        .iter()
        .map(|t| (t, strsim::jaro_winkler(&t.to_lowercase(), &lowered)))
        .filter(|(_, score)| *score >= TABLE_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(t, _)| t.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::RelevantTable;

    const SCHEMA: &str = "Table: sales\nColumns:\n  - product_name (text)\n  - quantity (bigint)\n\nTable: customers\nColumns:\n  - customer_name (text)\n";

    #[test]
    fn malformed_relevance_json_fails_open() {
        let parsed = serde_json::from_str::<RelevanceResult>("not json at all");
        assert!(parsed.is_err());
        let fallback = RelevanceResult::fail_open();
        assert!(fallback.is_relevant);
        assert!(fallback.relevant_tables.is_empty());
    }

    #[test]
    fn scrub_drops_fabricated_columns() {
        let mut result = RelevanceResult {
            is_relevant: true,
            relevant_tables: vec![RelevantTable {
                table_name: "sales".to_string(),
                columns: vec![
                    "product_name".to_string(),
                    "made_up_column".to_string(),
                    // Substring of customer_name, not a real column.
                    "name".to_string(),
                    "product_name".to_string(),
                ],
                noun_columns: vec!["product_name".to_string(), "imaginary".to_string()],
            }],
        };
        scrub_relevance(&mut result, SCHEMA);

        let table = &result.relevant_tables[0];
        assert_eq!(table.columns, vec!["product_name".to_string()]);
        assert_eq!(table.noun_columns, vec!["product_name".to_string()]);
    }

    #[test]
    fn scrub_rejects_columns_belonging_to_other_tables() {
        // customer_name exists in the schema, but under customers, not sales.
        let mut result = RelevanceResult {
            is_relevant: true,
            relevant_tables: vec![RelevantTable {
                table_name: "sales".to_string(),
                columns: vec!["quantity".to_string(), "customer_name".to_string()],
                noun_columns: vec!["customer_name".to_string()],
            }],
        };
        scrub_relevance(&mut result, SCHEMA);

        let table = &result.relevant_tables[0];
        assert_eq!(table.columns, vec!["quantity".to_string()]);
        assert!(table.noun_columns.is_empty());
    }

    #[test]
    fn scrub_normalizes_fuzzy_table_mentions() {
        let mut result = RelevanceResult {
            is_relevant: true,
            relevant_tables: vec![RelevantTable {
                table_name: "Sales".to_string(),
                columns: vec![],
                noun_columns: vec![],
            }],
        };
        scrub_relevance(&mut result, SCHEMA);
        assert_eq!(result.relevant_tables[0].table_name, "sales");
    }

    #[test]
    fn schema_parsing_yields_per_table_columns() {
        let tables = parse_schema_tables(SCHEMA);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].0, "sales");
        assert_eq!(
            tables[0].1,
            vec!["product_name".to_string(), "quantity".to_string()]
        );
        assert_eq!(tables[1].0, "customers");
        assert_eq!(tables[1].1, vec!["customer_name".to_string()]);
    }

    #[test]
    fn near_miss_table_names_match_fuzzily() {
        let tables = vec!["vantc001_a0634235".to_string()];
        let matched = match_table_name("VanTC001_a0634235", &tables);
        assert_eq!(matched, Some("vantc001_a0634235".to_string()));
        assert_eq!(match_table_name("weather", &tables), None);
    }
}
