pub mod add;
pub mod app;
pub mod checksum;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod find;
pub mod flatten;
pub mod output;
pub mod results;
pub mod store;
