//! Isolation substrate contract
//!
//! The orchestration core needs four capabilities from a container runtime:
//! create with a security policy, lifecycle control (start/stop/remove),
//! file injection, and exec with streamed output plus post-hoc exit-code
//! inspection. Everything above this trait is runtime-agnostic, which is
//! also what lets tests substitute a fake substrate for the Docker daemon.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// Raw multiplexed output channel of one exec invocation.
///
/// Every substrate delivers the framed wire format described in
/// [`super::stream`]; the Phased Executor owns the demultiplexing.
pub type OutputStream = BoxStream<'static, Result<Bytes>>;

/// A started exec invocation: its runtime id plus its output channel
pub struct ExecHandle {
    /// Runtime identifier used for post-hoc exit-code inspection
    pub id: String,
    /// Combined, multiplexed output stream
    pub output: OutputStream,
}

/// Opaque identity of one ephemeral sandbox.
///
/// Owned by exactly one in-flight request, never shared or reused.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    /// Runtime container identifier
    pub id: String,
}

/// Hardening applied to every sandbox.
///
/// This is the sandbox's correctness guarantee, not tuning; the values are
/// applied verbatim on every create.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Disable all network access (no exfiltration, no C2)
    pub network_none: bool,
    /// Drop every capability (no privileged syscalls)
    pub drop_all_capabilities: bool,
    /// Fixed non-root process identity, `uid:gid`
    pub user: String,
    /// Private scratch mount: path and mount options
    pub scratch_tmpfs: (String, String),
    /// Process count ceiling, soft = hard (fork-bomb mitigation; too low
    /// prevents the toolchain from even starting)
    pub nproc_limit: i64,
    /// Hard memory ceiling in bytes
    pub memory_bytes: i64,
    /// Forbid privilege escalation
    pub no_new_privileges: bool,
    /// Run without a seccomp profile. Deliberate: seccomp profiles are known
    /// to break under nested/virtualized hosts (runc "cannot allocate
    /// memory" on Docker Desktop/WSL2); isolation is carried by the other
    /// controls.
    pub seccomp_unconfined: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        SecurityPolicy {
            network_none: true,
            drop_all_capabilities: true,
            user: "1000:1000".to_string(),
            scratch_tmpfs: ("/tmp".to_string(), "rw,noexec,nosuid,size=32m".to_string()),
            nproc_limit: 256,
            memory_bytes: 512 * 1024 * 1024,
            no_new_privileges: true,
            seccomp_unconfined: true,
        }
    }
}

/// Container runtime capabilities required by the orchestration core
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Create a sandbox from an image under the given security policy
    async fn create(
        &self,
        image: &str,
        workdir: &str,
        policy: &SecurityPolicy,
    ) -> Result<SandboxHandle>;

    /// Start a created sandbox
    async fn start(&self, handle: &SandboxHandle) -> Result<()>;

    /// Gracefully stop a sandbox, waiting at most `grace`
    async fn stop(&self, handle: &SandboxHandle, grace: Duration) -> Result<()>;

    /// Forcibly remove a sandbox
    async fn remove(&self, handle: &SandboxHandle) -> Result<()>;

    /// Unpack a tar archive into a directory inside the sandbox
    async fn inject_file(&self, handle: &SandboxHandle, dest_dir: &str, tar: Vec<u8>)
        -> Result<()>;

    /// Start a command inside the sandbox, attaching to its output channel
    async fn exec(
        &self,
        handle: &SandboxHandle,
        argv: Vec<String>,
        workdir: &str,
    ) -> Result<ExecHandle>;

    /// Inspect a finished exec for its exit code; `None` when unreported
    async fn exec_exit_code(&self, exec_id: &str) -> Result<Option<i64>>;

    /// Best-effort kill of everything running in the sandbox
    async fn terminate(&self, handle: &SandboxHandle) -> Result<()>;
}

#[cfg(test)]
pub mod fake {
    //! Scripted in-memory substrate for executor and orchestrator tests

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use futures::stream::{self, StreamExt};

    use super::*;
    use crate::error::Error;
    use crate::sandbox::stream::{encode_frame, STDERR_SELECTOR, STDOUT_SELECTOR};

    /// One scripted exec invocation
    #[derive(Debug, Clone, Default)]
    pub struct FakeExec {
        pub exit_code: Option<i64>,
        pub stdout: Vec<u8>,
        pub stderr: Vec<u8>,
        /// Never complete the output stream (drives the outer timeout)
        pub hang: bool,
    }

    impl FakeExec {
        pub fn exited(code: i64, stdout: &[u8], stderr: &[u8]) -> Self {
            FakeExec {
                exit_code: Some(code),
                stdout: stdout.to_vec(),
                stderr: stderr.to_vec(),
                hang: false,
            }
        }

        pub fn hanging() -> Self {
            FakeExec {
                hang: true,
                ..FakeExec::default()
            }
        }
    }

    #[derive(Default)]
    struct Inner {
        script: Vec<FakeExec>,
        next_exec: usize,
        exit_codes: HashMap<String, Option<i64>>,
        ops: Vec<String>,
        fail_create: bool,
    }

    /// Substrate whose exec results are scripted up front, recording every
    /// operation for assertions
    #[derive(Clone, Default)]
    pub struct FakeSubstrate {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeSubstrate {
        pub fn new(script: Vec<FakeExec>) -> Self {
            FakeSubstrate {
                inner: Arc::new(Mutex::new(Inner {
                    script,
                    ..Inner::default()
                })),
            }
        }

        pub fn failing_create() -> Self {
            FakeSubstrate {
                inner: Arc::new(Mutex::new(Inner {
                    fail_create: true,
                    ..Inner::default()
                })),
            }
        }

        /// Recorded operations, in call order
        pub fn ops(&self) -> Vec<String> {
            self.inner.lock().unwrap().ops.clone()
        }

        pub fn exec_count(&self) -> usize {
            self.inner.lock().unwrap().next_exec
        }

        fn record(&self, op: &str) {
            self.inner.lock().unwrap().ops.push(op.to_string());
        }
    }

    #[async_trait]
    impl Substrate for FakeSubstrate {
        async fn create(
            &self,
            image: &str,
            _workdir: &str,
            _policy: &SecurityPolicy,
        ) -> Result<SandboxHandle> {
            self.record(&format!("create:{}", image));
            if self.inner.lock().unwrap().fail_create {
                return Err(Error::Container("no docker daemon".to_string()));
            }
            Ok(SandboxHandle {
                id: "fake-sandbox".to_string(),
            })
        }

        async fn start(&self, _handle: &SandboxHandle) -> Result<()> {
            self.record("start");
            Ok(())
        }

        async fn stop(&self, _handle: &SandboxHandle, _grace: Duration) -> Result<()> {
            self.record("stop");
            Ok(())
        }

        async fn remove(&self, _handle: &SandboxHandle) -> Result<()> {
            self.record("remove");
            Ok(())
        }

        async fn inject_file(
            &self,
            _handle: &SandboxHandle,
            dest_dir: &str,
            _tar: Vec<u8>,
        ) -> Result<()> {
            self.record(&format!("inject:{}", dest_dir));
            Ok(())
        }

        async fn exec(
            &self,
            _handle: &SandboxHandle,
            argv: Vec<String>,
            _workdir: &str,
        ) -> Result<ExecHandle> {
            self.record(&format!("exec:{}", argv.join(" ")));

            let (step, id) = {
                let mut inner = self.inner.lock().unwrap();
                let idx = inner.next_exec;
                let step = inner
                    .script
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| FakeExec::exited(0, b"", b""));
                inner.next_exec += 1;
                let id = format!("fake-exec-{}", idx);
                inner.exit_codes.insert(id.clone(), step.exit_code);
                (step, id)
            };

            let output: OutputStream = if step.hang {
                stream::pending().boxed()
            } else {
                let mut frames = Vec::new();
                if !step.stdout.is_empty() {
                    frames.push(Ok(encode_frame(STDOUT_SELECTOR, &step.stdout)));
                }
                if !step.stderr.is_empty() {
                    frames.push(Ok(encode_frame(STDERR_SELECTOR, &step.stderr)));
                }
                stream::iter(frames).boxed()
            };

            Ok(ExecHandle { id, output })
        }

        async fn exec_exit_code(&self, exec_id: &str) -> Result<Option<i64>> {
            self.record(&format!("inspect:{}", exec_id));
            Ok(self
                .inner
                .lock()
                .unwrap()
                .exit_codes
                .get(exec_id)
                .copied()
                .flatten())
        }

        async fn terminate(&self, _handle: &SandboxHandle) -> Result<()> {
            self.record("terminate");
            Ok(())
        }
    }
}
