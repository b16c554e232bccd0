pub mod app;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod error;
pub mod extract;
pub mod integrity;
pub mod manifest;
pub mod output;
pub mod pool;
pub mod store;
