// src/system/mod.rs

pub mod context;
pub mod runner;
pub mod watchers;
