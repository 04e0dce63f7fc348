// src/core/mod.rs

pub mod args;
pub mod collection;
pub mod config;
pub mod env;
pub mod executor;
pub mod parse_context;
pub mod parser;
pub mod task;
