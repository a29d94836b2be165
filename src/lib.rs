pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod router;
pub mod sql_engine;
pub mod stream;
