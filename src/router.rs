//! Question routing between the SQL analysis pipeline and direct chat.
//!
//! A pure keyword heuristic: explanation intents always go to chat,
//! computation intents go to the pipeline, everything else defaults to
//! chat. Deliberately conservative so small talk never produces SQL.

use tracing::debug;

/// Keywords that explicitly request a natural-language explanation or
/// summary. These never trigger SQL analysis, even when computation words
/// also appear.
const EXPLANATION_KEYWORDS: &[&str] = &[
    "explain",
    "describe",
    "what is",
    "tell me about",
    "summarize",
    "summary",
    "overview",
    "understand",
    "clarify",
    "elaborate",
    "provide details",
    "logic",
    "how does",
    "what does",
    "meaning of",
];

/// Keywords that require a database query to answer.
const COMPUTATION_KEYWORDS: &[&str] = &[
    "how many",
    "count",
    "sum",
    "average",
    "mean",
    "show all",
    "list all",
    "find records where",
    "search for",
    "maximum",
    "minimum",
    "median",
    "total",
    "group by",
    "order by",
    "sort by",
    "top ",
    "bottom ",
    "highest",
    "lowest",
    "greater than",
    "less than",
    "between",
    "statistics",
    "distribution",
    "frequency",
    "chart",
    "graph",
    "visualization",
    "plot",
    "filter by",
    "where ",
    "calculate",
];

/// Decide whether a question should run the SQL analysis pipeline.
///
/// Returns false unconditionally when no data has been uploaded: there is
/// no schema to query. Fully deterministic; explanation keywords take
/// priority over computation keywords.
pub fn should_run_sql_pipeline(question: &str, has_uploaded_data: bool) -> bool {
    if !has_uploaded_data {
        debug!("no uploaded data, routing to direct chat");
        return false;
    }

    let question_lower = question.to_lowercase();

    if EXPLANATION_KEYWORDS.iter().any(|k| question_lower.contains(k)) {
        debug!("explanation keyword matched, routing to direct chat");
        return false;
    }

    if COMPUTATION_KEYWORDS.iter().any(|k| question_lower.contains(k)) {
        debug!("computation keyword matched, routing to SQL pipeline");
        return true;
    }

    debug!("no keyword matched, routing ambiguous question to direct chat");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_uploaded_data_always_routes_to_chat() {
        let questions = [
            "How many rows are in the sales table?",
            "count all orders",
            "total revenue by region",
            "Summarize my data",
        ];
        for q in questions {
            assert!(!should_run_sql_pipeline(q, false), "{q}");
        }
    }

    #[test]
    fn computation_keywords_route_to_pipeline() {
        let questions = [
            "How many rows are in the sales table?",
            "What's the average order value?",
            "Show all customers in Berlin",
            "top 5 products by revenue",
            "Plot the distribution of income",
        ];
        for q in questions {
            assert!(should_run_sql_pipeline(q, true), "{q}");
        }
    }

    #[test]
    fn explanation_keywords_route_to_chat() {
        let questions = [
            "Explain this dataset to me",
            "Describe the customers table",
            "What is the meaning of the churn column?",
            "Give me an overview of the data",
        ];
        for q in questions {
            assert!(!should_run_sql_pipeline(q, true), "{q}");
        }
    }

    #[test]
    fn explanation_takes_priority_over_computation() {
        // Both keyword sets match; explanation wins.
        let questions = [
            "Explain how many customers churned",
            "Summarize the total sales by region",
            "Describe the distribution of ages",
        ];
        for q in questions {
            assert!(!should_run_sql_pipeline(q, true), "{q}");
        }
    }

    #[test]
    fn ambiguous_questions_default_to_chat() {
        let questions = ["hello", "thanks!", "is this thing on?"];
        for q in questions {
            assert!(!should_run_sql_pipeline(q, true), "{q}");
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(should_run_sql_pipeline("COUNT the orders", true));
        assert!(!should_run_sql_pipeline("EXPLAIN the orders count", true));
    }
}
