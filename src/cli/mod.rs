// src/cli/mod.rs

pub mod program;
