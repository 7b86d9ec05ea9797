// src/core/mod.rs

//! Gear logic, independent of how processes are spawned or records stored.

pub mod arg_builder;
pub mod config_loader;
pub mod diagnostics;
pub mod dir_tree;
pub mod dry_run;
pub mod environment;
pub mod gear;
pub mod harvester;
pub mod metrics;
pub mod orchestrator;
pub mod paths;
pub mod performance;
pub mod summaries;
