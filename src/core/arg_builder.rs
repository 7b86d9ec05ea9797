// src/core/arg_builder.rs

//! Turns a mapping of tool options into the argument vector handed to the
//! analysis tool. Positionals come first (input dir, output dir, scope), then
//! any pass-through words, then one or two tokens per option.

use crate::models::{AnalysisScope, Command, ConfigOptions, OptionValue, RunLayout};
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref VERBOSE_TOKEN_RE: Regex =
        Regex::new(r"^--verbose=(v+)$").expect("verbose pattern is a valid regex");
}

/// Builds a command from a binary, its positionals and an option mapping.
///
/// Options are rendered in mapping order:
/// - `true` becomes `--name`; `false` and unset values emit nothing.
/// - Numbers become `--name=value`.
/// - Text with interior whitespace becomes two tokens, `--name` and the raw text,
///   so the value reaches the tool as one argument. Other text is `--name=value`.
///
/// A final pass collapses `--verbose=vvv` into `-vvv`. No shell escaping is done.
pub fn synthesize(binary: &str, positionals: &[String], options: &ConfigOptions) -> Command {
    synthesize_with_passthrough(binary, positionals, &[], options)
}

/// Like [`synthesize`], with free-form words inserted between the positionals
/// and the synthesized flags.
pub fn synthesize_with_passthrough(
    binary: &str,
    positionals: &[String],
    passthrough: &[String],
    options: &ConfigOptions,
) -> Command {
    let mut command = Command::new(binary);
    command.extend(positionals.iter().cloned());
    command.extend(passthrough.iter().cloned());

    for option in options.iter() {
        command.extend(render_option(&option.name, &option.value));
    }

    collapse_verbosity(command.tokens_mut());
    log::debug!("Synthesized command: {}", command);
    command
}

/// Builds the tool command for a run layout and scope.
pub fn build_bids_command(
    binary: &str,
    layout: &RunLayout,
    scope: AnalysisScope,
    passthrough: &[String],
    options: &ConfigOptions,
) -> Command {
    let positionals = [
        layout.bids_dir.to_string_lossy().into_owned(),
        layout.analysis_output_dir.to_string_lossy().into_owned(),
        scope.as_str().to_string(),
    ];
    synthesize_with_passthrough(binary, &positionals, passthrough, options)
}

/// Renders a single option into zero, one or two tokens.
fn render_option(name: &str, value: &OptionValue) -> Vec<String> {
    match value {
        OptionValue::Flag(true) => vec![format!("--{}", name)],
        OptionValue::Flag(false) | OptionValue::Unset => Vec::new(),
        OptionValue::Integer(n) => vec![format!("--{}={}", name, n)],
        OptionValue::Float(x) => vec![format!("--{}={}", name, format_float(*x))],
        OptionValue::Text(text) => render_text(name, Cow::Borrowed(text.as_str())),
        OptionValue::Path(path) => render_text(name, path.to_string_lossy()),
        // Lists travel as one space-separated value.
        OptionValue::List(items) => render_text(name, Cow::Owned(items.join(" "))),
    }
}

fn render_text(name: &str, text: Cow<'_, str>) -> Vec<String> {
    if has_interior_whitespace(&text) {
        vec![format!("--{}", name), text.into_owned()]
    } else {
        vec![format!("--{}={}", name, text)]
    }
}

fn has_interior_whitespace(text: &str) -> bool {
    text.trim().contains(char::is_whitespace)
}

/// Integral floats keep a trailing `.0` so `2.0` is not confused with `2`.
fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

/// The tool counts verbosity as a repeated short flag, not a long option.
fn collapse_verbosity(tokens: &mut [String]) {
    for token in tokens.iter_mut() {
        let short = VERBOSE_TOKEN_RE
            .captures(token)
            .and_then(|caps| caps.get(1))
            .map(|level| format!("-{}", level.as_str()));
        if let Some(short) = short {
            log::trace!("Collapsing '{}' into '{}'", token, short);
            *token = short;
        }
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn positionals() -> Vec<String> {
        ["/bids", "/out", "participant"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn options(pairs: Vec<(&str, OptionValue)>) -> ConfigOptions {
        pairs.into_iter().collect()
    }

    #[test]
    fn test_true_flag_is_single_token() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![("anat-only", OptionValue::Flag(true))]),
        );
        assert_eq!(
            cmd.tokens(),
            &["tool", "/bids", "/out", "participant", "--anat-only"]
        );
    }

    #[test]
    fn test_false_and_unset_are_omitted() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![
                ("no-sub", OptionValue::Flag(false)),
                ("email", OptionValue::Unset),
            ]),
        );
        assert_eq!(cmd.tokens().len(), 4);
        assert!(!cmd.tokens().iter().any(|t| t.contains("no-sub")));
        assert!(!cmd.tokens().iter().any(|t| t.contains("email")));
    }

    #[test]
    fn test_numbers_use_equals_form() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![
                ("threshold", OptionValue::Integer(5)),
                ("fd_thres", OptionValue::Float(0.2)),
                ("mem_gb", OptionValue::Float(8.0)),
            ]),
        );
        assert!(cmd.contains("--threshold=5"));
        assert!(cmd.contains("--fd_thres=0.2"));
        assert!(cmd.contains("--mem_gb=8.0"));
    }

    #[test]
    fn test_text_with_space_becomes_two_tokens() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![("note", OptionValue::Text("a b".to_string()))]),
        );
        assert_eq!(cmd.args().get(3..), Some(&["--note".to_string(), "a b".to_string()][..]));
        assert!(!cmd.contains("--note=a b"));
    }

    #[test]
    fn test_text_without_space_uses_equals_form() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![
                ("modalities", OptionValue::Text("T1w".to_string())),
                ("work-dir", OptionValue::Path(PathBuf::from("/work"))),
            ]),
        );
        assert!(cmd.contains("--modalities=T1w"));
        assert!(cmd.contains("--work-dir=/work"));
    }

    #[test]
    fn test_list_is_joined_into_one_value() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![(
                "participant-label",
                OptionValue::List(vec!["01".to_string(), "02".to_string()]),
            )]),
        );
        assert!(cmd.contains("--participant-label"));
        assert!(cmd.contains("01 02"));
    }

    #[test]
    fn test_verbose_is_collapsed_to_short_flag() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![("verbose", OptionValue::Text("vvv".to_string()))]),
        );
        assert!(cmd.contains("-vvv"));
        assert!(!cmd.contains("--verbose=vvv"));

        let single = synthesize(
            "tool",
            &positionals(),
            &options(vec![("verbose", OptionValue::Text("v".to_string()))]),
        );
        assert!(single.contains("-v"));
    }

    #[test]
    fn test_verbose_with_other_letters_is_untouched() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![("verbose", OptionValue::Text("debug".to_string()))]),
        );
        assert!(cmd.contains("--verbose=debug"));
    }

    #[test]
    fn test_option_order_is_preserved() {
        let cmd = synthesize(
            "tool",
            &positionals(),
            &options(vec![
                ("b", OptionValue::Flag(true)),
                ("a", OptionValue::Integer(1)),
            ]),
        );
        assert_eq!(cmd.args().get(3..), Some(&["--b".to_string(), "--a=1".to_string()][..]));
    }

    #[test]
    fn test_passthrough_sits_between_positionals_and_flags() {
        let passthrough = vec!["--no-sub".to_string(), "--verbose=vv".to_string()];
        let cmd = synthesize_with_passthrough(
            "tool",
            &positionals(),
            &passthrough,
            &options(vec![("n_cpus", OptionValue::Integer(2))]),
        );
        assert_eq!(
            cmd.tokens(),
            &["tool", "/bids", "/out", "participant", "--no-sub", "-vv", "--n_cpus=2"]
        );
    }

    #[test]
    fn test_build_bids_command_positionals() {
        let layout = RunLayout {
            bids_dir: PathBuf::from("/work/bids"),
            output_dir: PathBuf::from("/out"),
            work_dir: PathBuf::from("/work"),
            analysis_output_dir: PathBuf::from("/out/abc"),
            metadata_path: PathBuf::from("/out/.metadata.json"),
        };
        let cmd = build_bids_command("mriqc", &layout, AnalysisScope::Group, &[], &ConfigOptions::new());
        assert_eq!(cmd.tokens(), &["mriqc", "/work/bids", "/out/abc", "group"]);
    }
}
