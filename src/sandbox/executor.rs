//! Two-phase compile/run execution inside a live sandbox

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::archive::create_tar;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sandbox::lifecycle::Sandbox;
use crate::sandbox::stream::FrameDemux;

/// Injected source filename inside the work directory
const SOURCE_FILE: &str = "main.cpp";

/// Exit code substituted when the runtime reports none
const EXIT_CODE_UNKNOWN: i64 = 255;

/// Exit code of the in-sandbox `timeout` wrapper, reused for the outer
/// run deadline so both look identical to the caller
const EXIT_CODE_TIMED_OUT: i64 = 124;

/// Stderr text attached to a run that hit its deadline
const RUN_TIMEOUT_MESSAGE: &str = "Execution timed out.";

/// Supported compiler variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compiler {
    #[serde(rename = "gcc-head")]
    GccHead,
    #[serde(rename = "clang-head")]
    ClangHead,
}

impl Compiler {
    /// Stable identifier, as used in requests and cache fingerprints
    pub fn id(&self) -> &'static str {
        match self {
            Compiler::GccHead => "gcc-head",
            Compiler::ClangHead => "clang-head",
        }
    }

    /// Compiler binary inside the image
    pub fn binary(&self) -> &'static str {
        match self {
            Compiler::GccHead => "g++",
            Compiler::ClangHead => "clang++",
        }
    }
}

impl std::fmt::Display for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One validated compile-and-run request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code to compile
    pub code: String,
    /// Compiler variant
    pub compiler: Compiler,
    /// Raw comma-separated option string, e.g. `"warning-all,std=c++20"`
    #[serde(default)]
    pub options: Option<String>,
}

/// Captured result of exactly one exec invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Full result of a sandboxed execution.
///
/// `run` is present if and only if the compile phase exited 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub compile: PhaseResult,
    pub run: Option<PhaseResult>,
}

/// Execution phase, tagging the two independent timeout domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Compile,
    Run,
}

impl Phase {
    fn timeout_error(self) -> Error {
        match self {
            Phase::Compile => Error::CompileTimeout,
            Phase::Run => Error::RunTimeout,
        }
    }
}

/// Drives the compile-then-run sequence inside a ready sandbox
#[derive(Clone)]
pub struct PhasedExecutor {
    compile_timeout: Duration,
    run_timeout: Duration,
    run_kill_after_secs: u64,
    work_dir: String,
}

impl PhasedExecutor {
    pub fn new(config: &Config) -> Self {
        PhasedExecutor {
            compile_timeout: config.compile_timeout(),
            run_timeout: config.run_timeout(),
            run_kill_after_secs: config.run_kill_after_secs(),
            work_dir: config.work_dir.clone(),
        }
    }

    /// Inject the source and run the two-phase sequence.
    ///
    /// A run that exceeds its deadline is a normal outcome (exit 124), not
    /// an error; only a compile deadline or an infrastructure failure
    /// aborts.
    pub async fn execute(
        &self,
        sandbox: &Sandbox,
        code: &[u8],
        compiler: Compiler,
        flags: &[String],
    ) -> Result<ExecutionOutcome> {
        let tar = create_tar(SOURCE_FILE, code)?;
        sandbox
            .substrate()
            .inject_file(sandbox.handle(), &self.work_dir, tar)
            .await?;

        let compile_cmd = format!(
            "{} -o {dir}/a.out {dir}/{src} {flags} 2>&1",
            compiler.binary(),
            dir = self.work_dir,
            src = SOURCE_FILE,
            flags = flags.join(" "),
        );
        let compile = self
            .exec_capture(sandbox, shell(&compile_cmd), Phase::Compile)
            .await?;

        if compile.exit_code != 0 {
            return Ok(ExecutionOutcome { compile, run: None });
        }

        // the in-sandbox `timeout` wrapper kills a runaway process even if
        // the outer deadline is delayed
        let run_cmd = format!(
            "timeout {} {}/a.out 2>&1",
            self.run_kill_after_secs, self.work_dir
        );
        let run = match self.exec_capture(sandbox, shell(&run_cmd), Phase::Run).await {
            Ok(result) => result,
            Err(Error::RunTimeout) => PhaseResult {
                exit_code: EXIT_CODE_TIMED_OUT,
                stdout: String::new(),
                stderr: RUN_TIMEOUT_MESSAGE.to_string(),
            },
            Err(e) => return Err(e),
        };

        Ok(ExecutionOutcome {
            compile,
            run: Some(run),
        })
    }

    /// Exec one command, demux its output, and resolve its exit code.
    ///
    /// The exit code is inspected only after the output channel completes.
    /// On deadline expiry the remote process is killed best-effort and the
    /// phase-tagged timeout error is returned.
    async fn exec_capture(
        &self,
        sandbox: &Sandbox,
        argv: Vec<String>,
        phase: Phase,
    ) -> Result<PhaseResult> {
        let substrate = sandbox.substrate();
        let mut exec = substrate
            .exec(sandbox.handle(), argv, &self.work_dir)
            .await?;

        let deadline = match phase {
            Phase::Compile => self.compile_timeout,
            Phase::Run => self.run_timeout,
        };

        let capture = async {
            let mut demux = FrameDemux::new();
            while let Some(chunk) = exec.output.next().await {
                demux.push(&chunk?);
            }
            Ok::<_, Error>(demux.into_streams())
        };

        let (stdout, stderr) = match tokio::time::timeout(deadline, capture).await {
            Ok(captured) => captured?,
            Err(_) => {
                // failure to terminate is not itself reported
                let _ = substrate.terminate(sandbox.handle()).await;
                return Err(phase.timeout_error());
            }
        };

        let exit_code = substrate
            .exec_exit_code(&exec.id)
            .await?
            .unwrap_or(EXIT_CODE_UNKNOWN);

        Ok(PhaseResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

fn shell(cmd: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sandbox::substrate::fake::{FakeExec, FakeSubstrate};
    use crate::sandbox::substrate::SecurityPolicy;

    async fn sandbox_on(substrate: &FakeSubstrate) -> Sandbox {
        Sandbox::provision(
            Arc::new(substrate.clone()),
            "img",
            "/workspace",
            &SecurityPolicy::default(),
        )
        .await
        .unwrap()
    }

    fn executor() -> PhasedExecutor {
        PhasedExecutor::new(&Config::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_compile_and_run_success() {
        let substrate = FakeSubstrate::new(vec![
            FakeExec::exited(0, b"", b""),
            FakeExec::exited(0, b"Hello\n", b""),
        ]);
        let sandbox = sandbox_on(&substrate).await;

        let outcome = executor()
            .execute(&sandbox, b"int main(){}", Compiler::GccHead, &[])
            .await
            .unwrap();

        assert_eq!(outcome.compile.exit_code, 0);
        let run = outcome.run.unwrap();
        assert_eq!(run.exit_code, 0);
        assert_eq!(run.stdout, "Hello\n");
        assert_eq!(substrate.exec_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compile_failure_skips_run() {
        let substrate = FakeSubstrate::new(vec![FakeExec::exited(
            1,
            b"",
            b"main.cpp:1:1: error: expected unqualified-id",
        )]);
        let sandbox = sandbox_on(&substrate).await;

        let outcome = executor()
            .execute(&sandbox, b"garbage", Compiler::ClangHead, &[])
            .await
            .unwrap();

        assert_eq!(outcome.compile.exit_code, 1);
        assert!(outcome.compile.stderr.contains("error:"));
        assert!(outcome.run.is_none());
        assert_eq!(substrate.exec_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compile_timeout_is_tagged_error() {
        let substrate = FakeSubstrate::new(vec![FakeExec::hanging()]);
        let sandbox = sandbox_on(&substrate).await;

        let err = executor()
            .execute(&sandbox, b"int main(){}", Compiler::GccHead, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CompileTimeout));
        assert!(substrate.ops().contains(&"terminate".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_is_normal_outcome() {
        let substrate =
            FakeSubstrate::new(vec![FakeExec::exited(0, b"", b""), FakeExec::hanging()]);
        let sandbox = sandbox_on(&substrate).await;

        let outcome = executor()
            .execute(&sandbox, b"int main(){for(;;);}", Compiler::GccHead, &[])
            .await
            .unwrap();

        let run = outcome.run.unwrap();
        assert_eq!(run.exit_code, 124);
        assert_eq!(run.stdout, "");
        assert_eq!(run.stderr, "Execution timed out.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_exit_code_becomes_sentinel() {
        let substrate = FakeSubstrate::new(vec![FakeExec {
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            hang: false,
        }]);
        let sandbox = sandbox_on(&substrate).await;

        let outcome = executor()
            .execute(&sandbox, b"int main(){}", Compiler::GccHead, &[])
            .await
            .unwrap();

        assert_eq!(outcome.compile.exit_code, 255);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_and_flags_reach_the_substrate() {
        let substrate = FakeSubstrate::new(vec![
            FakeExec::exited(0, b"", b""),
            FakeExec::exited(0, b"", b""),
        ]);
        let sandbox = sandbox_on(&substrate).await;

        executor()
            .execute(
                &sandbox,
                b"int main(){}",
                Compiler::GccHead,
                &["-Wall".to_string(), "-std=c++20".to_string()],
            )
            .await
            .unwrap();

        let ops = substrate.ops();
        let compile_op = ops.iter().find(|op| op.contains("g++")).unwrap();
        assert!(compile_op.contains("-o /workspace/a.out /workspace/main.cpp"));
        assert!(compile_op.contains("-Wall -std=c++20"));
        let run_op = ops.iter().find(|op| op.contains("a.out 2>&1") && op.contains("timeout")).unwrap();
        assert!(run_op.contains("timeout 5 /workspace/a.out"));
    }
}
