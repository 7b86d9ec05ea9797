// src/core/orchestrator.rs

//! # Execution Orchestrator
//!
//! Drives one or two runs of the analysis tool depending on the destination
//! scope. Project-level runs need per-participant artifacts before the tool
//! can summarize them, so they become a participant pass followed by a group
//! pass. Everything else is a single run.
//!
//! Phase failures are recorded in [`RunDiagnostics`] and never abort the
//! pipeline: harvesting always gets a chance to collect partial output.

use crate::constants::{GROUP_SAFE_MODALITIES, MODALITY_FLAG};
use crate::core::diagnostics::RunDiagnostics;
use crate::models::{AnalysisScope, Command, DestinationScope};
use crate::system::executor::ProcessRunner;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Diagnostics category for failed or crashed phases.
pub const EXECUTION_FAILURE: &str = "ExecutionFailure";

/// Where the orchestrator is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    /// Nothing has run yet.
    Init,
    /// Running the tool at participant level.
    ParticipantPhase,
    /// Running the tool at group level.
    GroupPhase,
    /// Every phase exited with 0.
    Done,
    /// At least one phase failed or crashed.
    Failed,
}

impl PhaseState {
    /// Whether the run has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ParticipantPhase => "participant phase",
            Self::GroupPhase => "group phase",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Workarounds for a known defect in the tool's cross-modality group
/// summarization. Kept in one place so they can be switched off once the
/// tool is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkaroundPolicy {
    /// Run a participant pass before the group pass on project destinations.
    pub force_participant_pass: bool,
    /// Modalities the group pass is restricted to; `None` leaves the group
    /// command untouched.
    pub modality_whitelist: Option<Vec<String>>,
}

impl Default for WorkaroundPolicy {
    fn default() -> Self {
        Self {
            force_participant_pass: true,
            modality_whitelist: Some(
                GROUP_SAFE_MODALITIES
                    .iter()
                    .map(|m| (*m).to_string())
                    .collect(),
            ),
        }
    }
}

impl WorkaroundPolicy {
    /// No pre-pass and no modality restriction.
    pub fn disabled() -> Self {
        Self {
            force_participant_pass: false,
            modality_whitelist: None,
        }
    }

    /// Appends `-m "<modalities>"` as two tokens.
    pub fn apply_to_group(&self, command: &mut Command) {
        if let Some(modalities) = &self.modality_whitelist {
            if modalities.is_empty() {
                return;
            }
            command.push(MODALITY_FLAG);
            command.push(modalities.join(" "));
        }
    }
}

/// One executed (or attempted) phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    /// The phase the command ran in. Single runs are recorded as the phase
    /// matching their scope.
    pub phase: PhaseState,
    /// Exactly what was handed to the runner.
    pub command: Command,
    /// Exit code, or `None` if the runner raised instead of returning.
    pub exit_code: Option<i32>,
}

impl PhaseRecord {
    /// Whether the phase exited with 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the phases for one gear invocation against a [`ProcessRunner`].
#[derive(Debug)]
pub struct Orchestrator<'a, R: ProcessRunner + ?Sized> {
    runner: &'a mut R,
    env: &'a HashMap<String, String>,
    dry_run: bool,
    policy: WorkaroundPolicy,
    state: PhaseState,
    history: Vec<PhaseRecord>,
}

impl<'a, R: ProcessRunner + ?Sized> Orchestrator<'a, R> {
    /// An orchestrator with the default workaround policy.
    pub fn new(runner: &'a mut R, env: &'a HashMap<String, String>, dry_run: bool) -> Self {
        Self {
            runner,
            env,
            dry_run,
            policy: WorkaroundPolicy::default(),
            state: PhaseState::Init,
            history: Vec::new(),
        }
    }

    /// Replaces the workaround policy.
    pub fn with_policy(mut self, policy: WorkaroundPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current state.
    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Every phase run so far, in execution order.
    pub fn history(&self) -> &[PhaseRecord] {
        &self.history
    }

    /// Runs `command` for a destination of the given scope and returns the
    /// terminal state.
    ///
    /// `command` is the fully synthesized tool command for the requested
    /// analysis scope. For project destinations its scope positional is
    /// rewritten per phase.
    pub fn execute(
        &mut self,
        command: &Command,
        destination: DestinationScope,
        analysis_output_dir: &Path,
        diagnostics: &mut RunDiagnostics,
    ) -> PhaseState {
        self.state = PhaseState::Init;

        log::info!("Creating output directory {}", analysis_output_dir.display());
        if let Err(e) = fs::create_dir_all(analysis_output_dir) {
            let msg = format!(
                "Could not create output directory '{}': {}",
                analysis_output_dir.display(),
                e
            );
            log::error!("CRITICAL: {}", msg);
            diagnostics.error(EXECUTION_FAILURE, msg);
            self.state = PhaseState::Failed;
            return self.state;
        }

        let all_ok = if destination == DestinationScope::Project {
            self.run_project(command, diagnostics)
        } else {
            let phase = match command.scope() {
                Some("group") => PhaseState::GroupPhase,
                _ => PhaseState::ParticipantPhase,
            };
            self.run_phase(phase, command.clone(), diagnostics)
        };

        self.state = if all_ok {
            PhaseState::Done
        } else {
            PhaseState::Failed
        };
        log::debug!("Orchestration finished in state '{}'", self.state);
        self.state
    }

    /// Participant pass (when the policy asks for it), then the group pass.
    /// The group pass runs even if the participant pass failed.
    fn run_project(&mut self, command: &Command, diagnostics: &mut RunDiagnostics) -> bool {
        let mut all_ok = true;

        if self.policy.force_participant_pass {
            let participant = command.with_scope(AnalysisScope::Participant);
            if !self.run_phase(PhaseState::ParticipantPhase, participant, diagnostics) {
                log::warn!("Participant phase failed; attempting group phase with partial output.");
                all_ok = false;
            }
        }

        let mut group = command.with_scope(AnalysisScope::Group);
        self.policy.apply_to_group(&mut group);
        all_ok &= self.run_phase(PhaseState::GroupPhase, group, diagnostics);
        all_ok
    }

    /// Runs one command and records the outcome. Returns whether it exited 0.
    fn run_phase(
        &mut self,
        phase: PhaseState,
        command: Command,
        diagnostics: &mut RunDiagnostics,
    ) -> bool {
        self.state = phase;
        log::info!("Starting {}: {}", phase, command);

        let exit_code = match self.runner.run(&command, self.env, self.dry_run) {
            Ok(output) => {
                if !output.success() {
                    diagnostics.error(
                        EXECUTION_FAILURE,
                        format!("{} exited with code {}", phase, output.exit_code),
                    );
                }
                Some(output.exit_code)
            }
            Err(e) => {
                log::error!("CRITICAL: {} could not be run: {}", phase, e);
                diagnostics.error(EXECUTION_FAILURE, format!("{} could not be run: {}", phase, e));
                None
            }
        };

        let record = PhaseRecord {
            phase,
            command,
            exit_code,
        };
        let ok = record.succeeded();
        self.history.push(record);
        ok
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::executor::{ExecutionError, ProcessOutput};
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Replays scripted outcomes and remembers every command it was handed.
    #[derive(Default)]
    struct ScriptedRunner {
        outcomes: VecDeque<Result<i32, ()>>,
        seen: Vec<(Command, bool)>,
    }

    impl ScriptedRunner {
        fn with(outcomes: &[Result<i32, ()>]) -> Self {
            Self {
                outcomes: outcomes.iter().copied().collect(),
                seen: Vec::new(),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(
            &mut self,
            command: &Command,
            _env: &HashMap<String, String>,
            dry_run: bool,
        ) -> Result<ProcessOutput, ExecutionError> {
            self.seen.push((command.clone(), dry_run));
            match self.outcomes.pop_front().unwrap_or(Ok(0)) {
                Ok(exit_code) => Ok(ProcessOutput {
                    exit_code,
                    ..Default::default()
                }),
                Err(()) => Err(ExecutionError::Terminated(command.display_line())),
            }
        }
    }

    fn group_command() -> Command {
        let mut cmd = Command::new("mriqc");
        cmd.extend(["/work/bids", "/out/dest", "group", "--n_cpus=2"]);
        cmd
    }

    fn run(
        runner: &mut ScriptedRunner,
        destination: DestinationScope,
        command: &Command,
    ) -> (PhaseState, RunDiagnostics, Vec<PhaseRecord>) {
        let out = TempDir::new().unwrap();
        let env = HashMap::new();
        let mut diagnostics = RunDiagnostics::new();
        let mut orchestrator = Orchestrator::new(runner, &env, false);
        let state = orchestrator.execute(
            command,
            destination,
            &out.path().join("dest"),
            &mut diagnostics,
        );
        let history = orchestrator.history().to_vec();
        (state, diagnostics, history)
    }

    #[test]
    fn test_project_runs_participant_before_group() {
        let mut runner = ScriptedRunner::default();
        let (state, diagnostics, history) =
            run(&mut runner, DestinationScope::Project, &group_command());

        assert_eq!(state, PhaseState::Done);
        assert!(!diagnostics.has_errors());
        let phases: Vec<_> = history.iter().map(|r| r.phase).collect();
        assert_eq!(phases, vec![PhaseState::ParticipantPhase, PhaseState::GroupPhase]);
        assert_eq!(runner.seen[0].0.scope(), Some("participant"));
        assert_eq!(runner.seen[1].0.scope(), Some("group"));
    }

    #[test]
    fn test_participant_failure_still_runs_group() {
        let mut runner = ScriptedRunner::with(&[Ok(1), Ok(0)]);
        let (state, diagnostics, history) =
            run(&mut runner, DestinationScope::Project, &group_command());

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].phase, PhaseState::GroupPhase);
        assert_eq!(state, PhaseState::Failed);
        assert_eq!(diagnostics.errors().len(), 1);
        assert_eq!(diagnostics.errors()[0].kind, EXECUTION_FAILURE);
    }

    #[test]
    fn test_workaround_tokens_only_on_group_command() {
        let mut runner = ScriptedRunner::default();
        run(&mut runner, DestinationScope::Project, &group_command());

        let participant = &runner.seen[0].0;
        let group = &runner.seen[1].0;
        assert!(!participant.contains("-m"));
        assert_eq!(
            group.tokens().get(group.tokens().len() - 2..),
            Some(&["-m".to_string(), "T1w T2w bold".to_string()][..])
        );
    }

    #[test]
    fn test_non_project_runs_once_without_workaround() {
        let mut participant = Command::new("mriqc");
        participant.extend(["/work/bids", "/out/dest", "participant"]);
        let mut runner = ScriptedRunner::default();
        let (state, _, history) = run(&mut runner, DestinationScope::Session, &participant);

        assert_eq!(state, PhaseState::Done);
        assert_eq!(runner.seen.len(), 1);
        assert_eq!(runner.seen[0].0, participant);
        assert_eq!(history[0].phase, PhaseState::ParticipantPhase);
    }

    #[test]
    fn test_runner_error_is_recorded_not_propagated() {
        let mut runner = ScriptedRunner::with(&[Err(()), Ok(0)]);
        let (state, diagnostics, history) =
            run(&mut runner, DestinationScope::Project, &group_command());

        assert_eq!(state, PhaseState::Failed);
        assert_eq!(history[0].exit_code, None);
        assert!(history[1].succeeded());
        assert!(diagnostics.errors()[0].message.contains("could not be run"));
    }

    #[test]
    fn test_disabled_policy_runs_group_only() {
        let out = TempDir::new().unwrap();
        let env = HashMap::new();
        let mut runner = ScriptedRunner::default();
        let mut diagnostics = RunDiagnostics::new();
        let mut orchestrator =
            Orchestrator::new(&mut runner, &env, false).with_policy(WorkaroundPolicy::disabled());
        orchestrator.execute(
            &group_command(),
            DestinationScope::Project,
            out.path(),
            &mut diagnostics,
        );

        assert_eq!(runner.seen.len(), 1);
        assert_eq!(runner.seen[0].0, group_command());
    }

    #[test]
    fn test_output_dir_is_created_and_dry_run_forwarded() {
        let out = TempDir::new().unwrap();
        let target = out.path().join("dest");
        let env = HashMap::new();
        let mut runner = ScriptedRunner::default();
        let mut diagnostics = RunDiagnostics::new();
        let mut orchestrator = Orchestrator::new(&mut runner, &env, true);
        let state = orchestrator.execute(
            &group_command(),
            DestinationScope::Subject,
            &target,
            &mut diagnostics,
        );

        assert!(state.is_terminal());
        assert!(target.is_dir());
        assert!(runner.seen.iter().all(|(_, dry)| *dry));
    }
}
