// src/models.rs

//! Data types shared by the gear: scopes, tool options, commands, metadata
//! documents and source records.

use crate::constants::{BIDS_DIR_NAME, DRY_RUN_KEY, DRY_RUN_VALUE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// --- SCOPES ---

/// Whether a run analyzes one subject's data or aggregates across subjects.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisScope {
    /// Per-subject analysis.
    Participant,
    /// Cross-subject summarization.
    Group,
}

/// The granularity of the container a run was launched against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DestinationScope {
    /// A whole project (all subjects).
    Project,
    /// A single subject.
    Subject,
    /// A single session of a subject.
    Session,
}

/// Raised when a scope name cannot be recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'.")]
pub struct ScopeParseError {
    kind: &'static str,
    value: String,
}

impl AnalysisScope {
    /// The positional token the analysis tool expects for this scope.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Group => "group",
        }
    }
}

impl DestinationScope {
    /// Lowercase name of the scope.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Subject => "subject",
            Self::Session => "session",
        }
    }

    /// The analysis scope a run against this destination asks for by default.
    /// Projects are summarized across subjects; everything below is per participant.
    pub fn default_analysis_scope(self) -> AnalysisScope {
        match self {
            Self::Project => AnalysisScope::Group,
            Self::Subject | Self::Session => AnalysisScope::Participant,
        }
    }
}

impl fmt::Display for AnalysisScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DestinationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisScope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "participant" => Ok(Self::Participant),
            "group" => Ok(Self::Group),
            _ => Err(ScopeParseError {
                kind: "analysis scope",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for DestinationScope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "subject" => Ok(Self::Subject),
            "session" => Ok(Self::Session),
            _ => Err(ScopeParseError {
                kind: "destination scope",
                value: s.to_string(),
            }),
        }
    }
}

// --- CONFIGURATION OPTIONS ---

/// The value of a single tool option, as read from the gear configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// A switch: `true` emits `--name`, `false` emits nothing.
    Flag(bool),
    /// An integral number.
    Integer(i64),
    /// A floating-point number.
    Float(f64),
    /// Free text.
    Text(String),
    /// A filesystem path.
    Path(PathBuf),
    /// Several words that the tool takes as one space-separated value.
    List(Vec<String>),
    /// No value at all; never emitted.
    Unset,
}

impl OptionValue {
    /// Returns `true` for values that emit nothing: `false`, unset, and
    /// blank text, paths or lists (the platform sends `""` for an unset
    /// string field). Numbers are always present, zero included.
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Flag(b) => !b,
            Self::Integer(_) | Self::Float(_) => false,
            Self::Text(s) => s.is_empty(),
            Self::Path(p) => p.as_os_str().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Unset => true,
        }
    }
}

/// A named tool option.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOption {
    /// Option name without leading dashes.
    pub name: String,
    /// Option value.
    pub value: OptionValue,
}

/// An ordered mapping of option names to values. Names are unique; insertion
/// order is kept so that synthesized commands read the same way the config does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOptions {
    entries: Vec<ConfigOption>,
}

impl ConfigOptions {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an option. A replaced option keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|opt| opt.name == name) {
            Some(existing) => existing.value = value,
            None => self.entries.push(ConfigOption { name, value }),
        }
    }

    /// Looks up an option by name.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|opt| opt.name == name)
            .map(|opt| &opt.value)
    }

    /// Iterates the options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigOption> {
        self.entries.iter()
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping holds no options.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every option whose value emits nothing.
    pub fn retain_present(&mut self) {
        self.entries.retain(|opt| !opt.value.is_absent());
    }
}

impl<S: Into<String>> FromIterator<(S, OptionValue)> for ConfigOptions {
    fn from_iter<I: IntoIterator<Item = (S, OptionValue)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (name, value) in iter {
            options.insert(name, value);
        }
        options
    }
}

// --- COMMAND ---

/// An ordered argument vector. The first token is the tool binary, followed by
/// the three positionals (input dir, output dir, analysis scope), then flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// Index of the analysis scope positional.
    pub const SCOPE_POSITION: usize = 3;

    /// Starts a command with the given binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            tokens: vec![binary.into()],
        }
    }

    /// Appends one token.
    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Appends several tokens.
    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
    }

    /// The full argument vector, binary included.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Mutable access for post-passes over the synthesized tokens.
    pub fn tokens_mut(&mut self) -> &mut [String] {
        &mut self.tokens
    }

    /// The binary name.
    pub fn program(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or_default()
    }

    /// Everything after the binary.
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }

    /// The analysis scope positional, if the command has one.
    pub fn scope(&self) -> Option<&str> {
        self.tokens.get(Self::SCOPE_POSITION).map(String::as_str)
    }

    /// Returns a copy of this command whose scope positional is replaced.
    /// Commands without a scope positional are returned unchanged.
    pub fn with_scope(&self, scope: AnalysisScope) -> Self {
        let mut rewritten = self.clone();
        if let Some(slot) = rewritten.tokens.get_mut(Self::SCOPE_POSITION) {
            *slot = scope.as_str().to_string();
        }
        rewritten
    }

    /// Whether any token equals `token`.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// A shell-quoted rendering for logs. Falls back to a plain join when a
    /// token cannot be quoted.
    pub fn display_line(&self) -> String {
        shlex::try_join(self.tokens.iter().map(String::as_str))
            .unwrap_or_else(|_| self.tokens.join(" "))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

// --- RESULTS & METADATA ---

/// Nested metrics reconstructed from one result file.
pub type MetricTree = Map<String, Value>;

/// The batch document written once per run, holding metrics that could not be
/// attached to a source record.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetadataDocument {
    /// Root `analysis` section.
    pub analysis: AnalysisMetadata,
}

/// The `analysis` section of a [`MetadataDocument`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AnalysisMetadata {
    /// The `analysis.info` section.
    pub info: AnalysisInfo,
}

/// The `analysis.info` section of a [`MetadataDocument`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AnalysisInfo {
    /// Derived metrics for unmatched result files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedMetadata>,
    /// Marker left by rehearsal runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<Map<String, Value>>,
}

/// The `analysis.info.derived` section of a [`MetadataDocument`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DerivedMetadata {
    /// One entry per unmatched result file, in discovery order.
    #[serde(rename = "IQM", default)]
    pub iqm: Vec<MetricTree>,
}

impl MetadataDocument {
    /// The document written for rehearsal runs.
    pub fn dry_run() -> Self {
        let mut marker = Map::new();
        marker.insert(DRY_RUN_KEY.to_string(), Value::from(DRY_RUN_VALUE));
        Self {
            analysis: AnalysisMetadata {
                info: AnalysisInfo {
                    derived: None,
                    dry_run: Some(marker),
                },
            },
        }
    }

    /// Appends an unmatched result: its metrics plus a `filename` entry.
    pub fn push_batch_entry(&mut self, mut metrics: MetricTree, filename: &str) {
        metrics.insert("filename".to_string(), Value::from(filename));
        self.analysis
            .info
            .derived
            .get_or_insert_with(DerivedMetadata::default)
            .iqm
            .push(metrics);
    }

    /// The batch entries collected so far.
    pub fn batch_entries(&self) -> &[MetricTree] {
        self.analysis
            .info
            .derived
            .as_ref()
            .map(|d| d.iqm.as_slice())
            .unwrap_or_default()
    }

    /// Whether the document carries anything worth writing.
    pub fn has_content(&self) -> bool {
        !self.batch_entries().is_empty() || self.analysis.info.dry_run.is_some()
    }
}

// --- SOURCE RECORDS ---

/// An external catalog entry for one original input file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Catalog identifier.
    pub id: String,
    /// File name of the record (e.g. `sub-01_T1w.nii.gz`).
    pub name: String,
    /// Free-form metadata attached to the record.
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl SourceRecord {
    /// The BIDS file name stored on the record when it was curated.
    pub fn original_filename(&self) -> Option<&str> {
        self.info.get("BIDS")?.get("Filename")?.as_str()
    }

    /// Whether the record holds image data rather than a sidecar.
    pub fn is_image_payload(&self) -> bool {
        self.name.contains("nii")
    }
}

// --- GEAR CONFIG FILE ---

/// The container the gear writes its results to.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Destination {
    /// Container identifier; names the output subdirectory and summary files.
    pub id: String,
    /// Container type as reported by the platform.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Granularity of the analyzed container, when the platform reports it.
    #[serde(default)]
    pub level: Option<DestinationScope>,
}

/// The deserialized `config.json` of a gear run.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct GearConfigFile {
    /// Run-time options, both gear settings and tool options.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Where the results go.
    #[serde(default)]
    pub destination: Option<Destination>,
}

// --- RUN LAYOUT ---

/// Directories and files a run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    /// BIDS input directory handed to the tool.
    pub bids_dir: PathBuf,
    /// Permanent output directory of the run.
    pub output_dir: PathBuf,
    /// Scratch directory.
    pub work_dir: PathBuf,
    /// Raw tool output, `<output_dir>/<destination_id>`.
    pub analysis_output_dir: PathBuf,
    /// Location of the batch metadata document.
    pub metadata_path: PathBuf,
}

impl RunLayout {
    /// Default BIDS directory inside a work directory.
    pub fn default_bids_dir(work_dir: &std::path::Path) -> PathBuf {
        work_dir.join(BIDS_DIR_NAME)
    }
}
