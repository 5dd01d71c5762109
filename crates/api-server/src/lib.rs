pub mod config;
pub mod handlers;
pub mod llm_client;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;
