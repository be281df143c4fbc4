pub mod config;
pub mod db;
pub mod errors;
pub mod ingestion;
pub mod intelligence;
pub mod metrics;
pub mod models;
pub mod polymarket;
pub mod services;
