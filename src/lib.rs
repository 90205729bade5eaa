pub mod cache;
pub mod config;
pub mod creator;
pub mod domain;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod orchestrator;
pub mod output;
pub mod probe;
pub mod provenance;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod strategy;
