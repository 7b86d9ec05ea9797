//! Runs the MRIQC BIDS app as a gear: builds its command line from the gear
//! configuration, drives the participant and group passes, and files the
//! resulting image quality metrics.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
