//! # System Interaction Layer
//!
//! The boundary between the gear's logic and the outside world: child
//! processes and the catalog of source records.
//!
//! ## Modules
//!
//! - **`executor`**: The [`executor::ProcessRunner`] capability and the
//!   [`executor::SystemRunner`] that spawns the analysis tool with streamed
//!   output and honors dry runs.
//! - **`record_store`**: The [`record_store::SourceRecordStore`] capability
//!   used by the harvester, with a JSON-file backed implementation.

pub mod executor;
pub mod record_store;
