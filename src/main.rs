use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use nlq_engine::chat::DatasetInfo;
use nlq_engine::config::Credentials;
use nlq_engine::db::{init_pool, InMemoryMessageStore, MessageStore, PgMessageStore};
use nlq_engine::llm::{registry, ModelResolver};
use nlq_engine::sql_engine::{PgQueryExecutor, QueryExecutor};
use nlq_engine::stream::{answer_question, QuestionRequest};

#[derive(Parser)]
#[command(name = "nlq-engine")]
#[command(about = "Natural-language analytics over uploaded tabular data")]
struct Args {
    /// The question to ask about the data
    question: String,

    /// Conversation id for history tracking
    #[arg(short, long, default_value_t = 1)]
    conversation_id: i64,

    /// Model to use (unknown names fall back automatically)
    #[arg(short, long)]
    model: Option<String>,

    /// Table exposed by the uploaded dataset (repeatable)
    #[arg(short, long = "table")]
    tables: Vec<String>,

    /// Postgres URL for persistence and query execution
    /// (defaults to the DATABASE_URL env var)
    #[arg(long)]
    database_url: Option<String>,

    /// Name of the uploaded file, for data-aware chat context
    #[arg(long)]
    dataset_name: Option<String>,

    /// List the available models and exit
    #[arg(long)]
    list_models: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.list_models {
        let models = registry::available_models();
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    let resolver = ModelResolver::new(Credentials::from_env());

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let (store, executor): (Arc<dyn MessageStore>, Option<Arc<dyn QueryExecutor>>) =
        match database_url {
            Some(url) => {
                let pool = init_pool(&url).await?;
                info!("connected to database");
                (
                    Arc::new(PgMessageStore::new(pool.clone())),
                    Some(Arc::new(PgQueryExecutor::new(pool))),
                )
            }
            None => {
                info!("no database configured, using in-memory message store");
                (Arc::new(InMemoryMessageStore::new()), None)
            }
        };

    if !args.tables.is_empty() && executor.is_none() {
        anyhow::bail!("--table requires a database connection (set DATABASE_URL)");
    }

    store
        .append_message(
            args.conversation_id,
            "user",
            &serde_json::json!({ "question": args.question }),
        )
        .await?;

    let dataset = args.dataset_name.map(|name| DatasetInfo {
        name,
        table_name: args.tables.first().cloned(),
        data_preview: None,
    });

    let request = QuestionRequest {
        question: args.question,
        conversation_id: args.conversation_id,
        model: args.model,
        table_names: args.tables,
        dataset,
    };

    let mut stream = answer_question(resolver, executor, store, request);
    while let Some(line) = stream.next_line().await {
        println!("{}", line);
    }

    Ok(())
}
