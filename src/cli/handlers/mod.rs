// src/cli/handlers/mod.rs

//! Command handlers.

pub mod run;
