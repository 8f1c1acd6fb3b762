//! Wandbox response shaping
//!
//! The external contract is a JSON object with exactly one of three keys:
//! `compiler_error`, `program_error` or `program_output`. The enum is
//! closed and only constructed through [`CompileResponse::from_outcome`],
//! which enforces that exclusivity.

use serde::{Deserialize, Serialize};

use crate::sandbox::{ExecutionOutcome, PhaseResult};

/// Fallback when the compiler failed without producing output
const COMPILE_FALLBACK: &str = "Compilation failed.";

/// Fallback when compile succeeded but no run result exists
const NO_RUN_FALLBACK: &str = "Execution phase did not run.";

/// Exactly-one-of-three response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompileResponse {
    CompilerError { compiler_error: String },
    ProgramError { program_error: String },
    ProgramOutput { program_output: String },
}

impl CompileResponse {
    /// Map an execution outcome to its single response variant
    pub fn from_outcome(outcome: &ExecutionOutcome) -> Self {
        if outcome.compile.exit_code != 0 {
            let text = joined(&outcome.compile);
            return CompileResponse::CompilerError {
                compiler_error: if text.is_empty() {
                    COMPILE_FALLBACK.to_string()
                } else {
                    text
                },
            };
        }

        let Some(run) = &outcome.run else {
            return CompileResponse::ProgramError {
                program_error: NO_RUN_FALLBACK.to_string(),
            };
        };

        if run.exit_code != 0 {
            let text = joined(run);
            return CompileResponse::ProgramError {
                program_error: if text.is_empty() {
                    format!("Process exited with code {}.", run.exit_code)
                } else {
                    text
                },
            };
        }

        CompileResponse::ProgramOutput {
            program_output: run.stdout.trim().to_string(),
        }
    }
}

/// Trimmed stderr and stdout joined by a newline, empty parts skipped
fn joined(phase: &PhaseResult) -> String {
    [phase.stderr.trim(), phase.stdout.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}
