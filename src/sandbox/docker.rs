//! Docker-backed isolation substrate
//!
//! Implements the [`Substrate`] contract against the local Docker daemon via
//! bollard. Containers are created hardened per [`SecurityPolicy`] and kept
//! alive with a no-op command so files can be injected and execs attached.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::service::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sandbox::stream::{encode_frame, STDERR_SELECTOR, STDOUT_SELECTOR};
use crate::sandbox::substrate::{ExecHandle, SandboxHandle, SecurityPolicy, Substrate};

/// Substrate backed by the local Docker daemon
pub struct DockerSubstrate {
    docker: Docker,
}

impl DockerSubstrate {
    /// Connect to the local daemon and verify it responds
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Container(format!("Failed to connect to Docker: {}", e)))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::Container(format!("Docker ping failed: {}", e)))?;

        info!("Docker substrate connected");
        Ok(DockerSubstrate { docker })
    }

    fn host_config(policy: &SecurityPolicy) -> HostConfig {
        let (tmpfs_path, tmpfs_opts) = policy.scratch_tmpfs.clone();

        HostConfig {
            // no network access (prevents exfiltration, C2, etc.)
            network_mode: policy.network_none.then(|| "none".to_string()),
            // no privileged syscalls available
            cap_drop: policy
                .drop_all_capabilities
                .then(|| vec!["ALL".to_string()]),
            // read-only rootfs would block the archive upload, so the
            // writable surface is bounded with a noexec/nosuid tmpfs instead
            tmpfs: Some(HashMap::from([(tmpfs_path, tmpfs_opts)])),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nproc".to_string()),
                soft: Some(policy.nproc_limit),
                hard: Some(policy.nproc_limit),
            }]),
            memory: Some(policy.memory_bytes),
            security_opt: Some(Self::security_opt(policy)),
            auto_remove: Some(false),
            ..Default::default()
        }
    }

    fn security_opt(policy: &SecurityPolicy) -> Vec<String> {
        let mut opts = Vec::new();
        if policy.no_new_privileges {
            opts.push("no-new-privileges:true".to_string());
        }
        if policy.seccomp_unconfined {
            opts.push("seccomp=unconfined".to_string());
        }
        opts
    }
}

#[async_trait]
impl Substrate for DockerSubstrate {
    async fn create(
        &self,
        image: &str,
        workdir: &str,
        policy: &SecurityPolicy,
    ) -> Result<SandboxHandle> {
        let name = format!("cxxbox-{}", uuid::Uuid::new_v4());

        let config = Config {
            image: Some(image.to_string()),
            // keep the container alive for injection and execs
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            user: Some(policy.user.clone()),
            working_dir: Some(workdir.to_string()),
            host_config: Some(Self::host_config(policy)),
            attach_stdin: Some(false),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        self.docker.create_container(Some(options), config).await?;
        debug!(container = %name, "Created sandbox container");

        Ok(SandboxHandle { id: name })
    }

    async fn start(&self, handle: &SandboxHandle) -> Result<()> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await?;
        debug!(container = %handle.id, "Started sandbox container");
        Ok(())
    }

    async fn stop(&self, handle: &SandboxHandle, grace: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        self.docker.stop_container(&handle.id, Some(options)).await?;
        Ok(())
    }

    async fn remove(&self, handle: &SandboxHandle) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(&handle.id, Some(options))
            .await?;
        debug!(container = %handle.id, "Removed sandbox container");
        Ok(())
    }

    async fn inject_file(
        &self,
        handle: &SandboxHandle,
        dest_dir: &str,
        tar: Vec<u8>,
    ) -> Result<()> {
        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(&handle.id, Some(options), tar.into())
            .await?;
        Ok(())
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        argv: Vec<String>,
        workdir: &str,
    ) -> Result<ExecHandle> {
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(argv),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(workdir.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let started = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await?;

        let output = match started {
            StartExecResults::Attached { output, .. } => output,
            StartExecResults::Detached => {
                return Err(Error::Container("exec started detached".to_string()))
            }
        };

        // bollard parses the attach framing into LogOutput; fold the frames
        // back onto the wire encoding so every substrate presents the same
        // multiplexed channel to the executor
        let output = output
            .map(|item| match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    Ok(encode_frame(STDOUT_SELECTOR, &message))
                }
                Ok(LogOutput::StdErr { message }) => Ok(encode_frame(STDERR_SELECTOR, &message)),
                Ok(LogOutput::StdIn { .. }) => Ok(Bytes::new()),
                Err(e) => Err(Error::from(e)),
            })
            .boxed();

        Ok(ExecHandle {
            id: exec.id,
            output,
        })
    }

    async fn exec_exit_code(&self, exec_id: &str) -> Result<Option<i64>> {
        let inspect = self.docker.inspect_exec(exec_id).await?;
        Ok(inspect.exit_code)
    }

    async fn terminate(&self, handle: &SandboxHandle) -> Result<()> {
        self.docker
            .kill_container(&handle.id, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }
}
