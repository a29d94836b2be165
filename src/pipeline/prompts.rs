//! Prompt construction for the analysis pipeline stages.

use crate::llm::ChatMessage;
use crate::pipeline::types::RelevanceResult;
use crate::sql_engine::QueryResult;

/// System prompt for the schema-relevance filter.
pub const RELEVANCE_SYSTEM_PROMPT: &str = r#"You are an expert data analyst tasked with analyzing SQL databases. Your goal is to interpret user questions, understand the provided schema, and identify relevant tables and columns.

Instructions:
1. Analyze the user question and database schema to identify relevant tables and columns.
2. Default to "is_relevant": true unless the question is clearly off-topic (e.g., "what's the weather", "tell me a joke", or unrelated non-data questions).
3. Use fuzzy matching for table names: if the user mentions any text that partially matches a table name (case-insensitive), set "is_relevant" to true.
4. Be permissive with generic data questions: questions like "show me data", "what is in the table", "analyze this data" should always be marked as relevant.
5. Focus on columns with meaningful nouns (names, entities) in "noun_columns" and exclude id or numeric columns unless specifically relevant to the question.
6. Return the result as a valid JSON object. Do not use backticks, code blocks, or any extra characters:
{
  "is_relevant": boolean,
  "relevant_tables": [
    {
      "table_name": "string",
      "columns": ["string"],
      "noun_columns": ["string"]
    }
  ]
}

Key guidelines:
- Always verify column names against the provided schema; include only column names that exist in it, matching their exact spelling.
- If a term in the question matches a likely column value rather than a column name (e.g., "Brazil" in "matches where Brazil scored"), do not include it in the lists.
- When in doubt, mark the question as relevant and attempt to identify tables and columns."#;

/// System prompt for the SQL generator.
pub const SQL_GENERATION_SYSTEM_PROMPT: &str = r#"You are an AI assistant that generates SQL queries based on user questions, database schema, and the relevant tables and columns identified for the question. Your goal is to generate a valid SQL query that directly answers the user's question.

Instructions:
1. Parse the user question, identify relevant tables and columns from the schema, and generate an SQL query using the correct table and column names.
2. Ensure the SQL query answers the question using only two or three columns in the result.
3. If there isn't enough information to generate a query, return exactly "NOT_ENOUGH_INFO".
4. Always enclose table and column names in backticks (`).
5. Skip rows where any referenced column is NULL, empty (''), or contains 'N/A'.

Examples:

1. What is the top selling product?
```sql
SELECT `product_name`, SUM(`quantity`) AS `total_quantity`
FROM `sales`
WHERE `product_name` IS NOT NULL AND `quantity` IS NOT NULL
AND `product_name` != '' AND `quantity` != ''
AND `product_name` != 'N/A' AND `quantity` != 'N/A'
GROUP BY `product_name`
ORDER BY `total_quantity` DESC
LIMIT 1
```

2. What is the total revenue for each product?
```sql
SELECT `product_name`, SUM(`quantity` * `price`) AS `total_revenue`
FROM `sales`
WHERE `product_name` IS NOT NULL AND `quantity` IS NOT NULL
AND `price` IS NOT NULL AND `product_name` != ''
AND `quantity` != '' AND `price` != ''
AND `product_name` != 'N/A' AND `quantity` != 'N/A'
AND `price` != 'N/A'
GROUP BY `product_name`
ORDER BY `total_revenue` DESC
```

3. What is the market share of each product?
```sql
SELECT `product_name`,
SUM(`quantity`) * 100.0 / (SELECT SUM(`quantity`) FROM `sales`) AS `market_share`
FROM `sales`
WHERE `product_name` IS NOT NULL AND `quantity` IS NOT NULL
AND `product_name` != '' AND `quantity` != ''
AND `product_name` != 'N/A' AND `quantity` != 'N/A'
GROUP BY `product_name`
ORDER BY `market_share` DESC
```

4. How many rows are in the sales table?
```sql
SELECT COUNT(*) AS `row_count` FROM `sales`
```

Just return the SQL query string based on the schema, question, and relevant tables provided."#;

/// System prompt for the SQL validator/fixer.
pub const VALIDATION_SYSTEM_PROMPT: &str = r#"You are an AI assistant that validates and fixes SQL queries. Your task is to:
1. Check if the SQL query is valid.
2. Ensure all table and column names are correctly spelled and exist in the schema. All table and column names should be enclosed in backticks.
3. Ensure the SQL query follows proper syntax (JOIN, WHERE, and other clauses are used correctly).
4. Take into account case sensitivity based on the schema.
5. If there are any issues, fix them and provide the corrected SQL query.
6. If no issues are found, return the original query unchanged with "corrected_query" set to "None".

Respond with a valid JSON object only. Do not use backticks around the JSON, code blocks, or any extra characters:
{
    "valid": boolean,
    "issues": string or null,
    "corrected_query": string
}

Examples:
1. {"valid": true, "issues": null, "corrected_query": "None"}
2. {"valid": false, "issues": "Column USERS does not exist", "corrected_query": "SELECT * FROM `users` WHERE `age` > 25"}"#;

/// System prompt for the result formatter.
pub const FORMAT_RESULTS_SYSTEM_PROMPT: &str = r###"You are a helpful AI assistant that explains data analysis results in a natural, conversational way.

Style requirements:
1. Write in a natural, conversational tone.
2. Do NOT use formal markdown headers like "## Overview" or structure the response like a report.
3. Use natural flowing paragraphs, kept short and readable (2-4 sentences each).
4. Use **bold** for emphasis naturally within sentences.
5. Use bullet points when listing things, introduced naturally.
6. End with a helpful question or offer to explain more.

What to do:
- Start with a direct, friendly opening that addresses the question.
- Reference the specific values and data points from the results; never invent figures that are not in them.
- Highlight interesting patterns naturally in the flow.
- If the query failed or there was not enough information, explain what went wrong in plain language and suggest how the user could rephrase."###;

/// System prompt for the visualization recommender.
pub const VISUALIZATION_SYSTEM_PROMPT: &str = r#"You are an AI assistant recommending the best data visualization. Based on the user's question, SQL query, and query results, suggest the most suitable chart type.

Chart types:
- bar: comparing categorical data or changes over time with more than two categories.
- horizontal_bar: comparing few categories or when there is a large disparity between them.
- scatter: relationships or distributions between two continuous numerical variables.
- pie: proportions or percentages of a whole.
- line: trends over time, where both axes are continuous.
- none: no visualization is appropriate (e.g., a single scalar value).

Respond with a valid JSON object only. Do not use backticks, code blocks, or any extra characters:
{
    "recommended_visualization": "bar" | "horizontal_bar" | "line" | "pie" | "scatter" | "none",
    "reason": "brief explanation of the recommendation"
}"#;

pub fn build_relevance_prompt(schema: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(RELEVANCE_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "===Database schema:\n{}\n\n===User question:\n{}\n\nIdentify the relevant tables and columns based on the provided information:",
            schema, question
        )),
    ]
}

pub fn build_sql_generation_prompt(
    schema: &str,
    question: &str,
    relevance: &RelevanceResult,
) -> Vec<ChatMessage> {
    let relevant_tables =
        serde_json::to_string(&relevance.relevant_tables).unwrap_or_else(|_| "[]".to_string());
    vec![
        ChatMessage::system(SQL_GENERATION_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "===Database schema:\n{}\n\n===User question:\n{}\n\n===Relevant tables and columns:\n{}\n\nGenerate SQL query string:",
            schema, question, relevant_tables
        )),
    ]
}

pub fn build_validation_prompt(
    schema: &str,
    sql_query: &str,
    parser_diagnostic: Option<&str>,
) -> Vec<ChatMessage> {
    let diagnostic = parser_diagnostic
        .map(|d| format!("\n\n===Parser diagnostic:\n{}", d))
        .unwrap_or_default();
    vec![
        ChatMessage::system(VALIDATION_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "===Database schema:\n{}\n\n===Generated SQL query:\n{}{}\n\nRespond in JSON format:",
            schema, sql_query, diagnostic
        )),
    ]
}

pub fn build_format_results_prompt(question: &str, results_payload: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(FORMAT_RESULTS_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "User question: {}\n\nQuery results: {}\n\nRespond naturally and conversationally:",
            question, results_payload
        )),
    ]
}

pub fn build_visualization_prompt(
    question: &str,
    sql_query: &str,
    results: &QueryResult,
) -> Vec<ChatMessage> {
    let results_json = serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string());
    vec![
        ChatMessage::system(VISUALIZATION_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "User question: {}\nSQL query: {}\nQuery results: {}\n\nRecommend a visualization:",
            question, sql_query, results_json
        )),
    ]
}

/// Render a result set into the textual payload the formatter sees. Every
/// value and count from the result set is preserved verbatim so the model
/// can reference them.
pub fn render_results_payload(results: &QueryResult) -> String {
    if results.is_empty() {
        return "The query returned no rows.".to_string();
    }
    let rows = serde_json::to_string_pretty(&results.rows)
        .unwrap_or_else(|_| format!("{:?}", results.rows));
    format!(
        "{} row(s) with columns [{}]:\n{}",
        results.row_count(),
        results.columns.join(", "),
        rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn results_payload_preserves_values() {
        let mut row = HashMap::new();
        row.insert(
            "product_name".to_string(),
            serde_json::Value::String("Widget A".to_string()),
        );
        row.insert("total_quantity".to_string(), serde_json::Value::from(42));
        let results = QueryResult {
            columns: vec!["product_name".to_string(), "total_quantity".to_string()],
            rows: vec![row],
        };

        let payload = render_results_payload(&results);
        assert!(payload.contains("Widget A"));
        assert!(payload.contains("42"));
    }

    #[test]
    fn empty_results_payload_says_so() {
        let payload = render_results_payload(&QueryResult::default());
        assert!(payload.contains("no rows"));
    }

    #[test]
    fn generation_prompt_carries_schema_and_relevance() {
        let relevance = RelevanceResult {
            is_relevant: true,
            relevant_tables: vec![crate::pipeline::types::RelevantTable {
                table_name: "sales".to_string(),
                columns: vec!["product_name".to_string()],
                noun_columns: vec!["product_name".to_string()],
            }],
        };
        let messages = build_sql_generation_prompt("Table: sales", "top product?", &relevance);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Table: sales"));
        assert!(messages[1].content.contains("\"table_name\":\"sales\""));
    }
}
