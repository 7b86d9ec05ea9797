// src/constants.rs

//! Names, keys and defaults shared across the crate.

/// Human-readable name of the gear, used in the final log line.
pub const GEAR_NAME: &str = "flywheel-apps/bids-mriqc";

/// The analysis tool binary invoked by default.
pub const DEFAULT_BIDS_APP_BINARY: &str = "mriqc";

/// The name of the BIDS input directory inside the work directory.
pub const BIDS_DIR_NAME: &str = "bids";

/// Extension (without the dot) of the per-scan result files written by the tool.
pub const RESULT_FILE_EXTENSION: &str = "json";

/// Extension (without the dot) of the group-level tabular summaries.
pub const SUMMARY_FILE_EXTENSION: &str = "tsv";

/// Base-name prefix of dataset-level (non per-scan) result files.
pub const DATASET_SUMMARY_PREFIX: &str = "dataset";

/// Result keys starting with this prefix carry tool bookkeeping, not metrics.
pub const RESERVED_KEY_PREFIX: &str = "__";

/// Result keys that are never carried into a metric tree.
pub const RESERVED_KEYS: &[&str] = &["bids_meta", "provenance"];

/// Maximum nesting depth of a metric tree.
pub const MAX_METRIC_DEPTH: usize = 3;

/// Name of the batch metadata document, relative to the output directory.
pub const METADATA_FILENAME: &str = ".metadata.json";

/// Default name of the gear configuration file.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the optional file holding the container's shell environment.
pub const ENVIRONMENT_FILENAME: &str = "gear_environ.json";

/// Short flag used to restrict the modalities the tool summarizes.
pub const MODALITY_FLAG: &str = "-m";

/// Modalities whose group-level summarization is known to work.
pub const GROUP_SAFE_MODALITIES: &[&str] = &["T1w", "T2w", "bold"];

/// Config keys with these prefixes configure the gear, not the tool.
pub const GEAR_KEY_PREFIXES: &[&str] = &["gear-", "lsf-", "slurm-", "singularity-"];

/// Config keys that are consumed by the gear itself.
pub const GEAR_ONLY_KEYS: &[&str] = &["debug", "bids_app_command", "bids_app_args", "analysis_level"];

/// Config key holding free-form arguments passed verbatim to the tool.
pub const BIDS_APP_ARGS_KEY: &str = "bids_app_args";

/// Metadata placed in the document when the run was only a rehearsal.
pub const DRY_RUN_KEY: &str = "How dry I am";
/// Companion value for [`DRY_RUN_KEY`].
pub const DRY_RUN_VALUE: &str = "Say to Mister Temperance....";
