//! Composition root for sandboxed executions
//!
//! Holds the process-scoped pieces (isolation substrate, outcome cache,
//! phased executor, config) and drives one request end to end: cache
//! lookup, sandbox provisioning, archive injection, the two-phase sequence,
//! unconditional teardown, and cache store. There is no retry anywhere on
//! this path; a substrate failure is immediately fatal for the request.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cache::{fingerprint, OutcomeCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::options::parse_options;
use crate::sandbox::{
    Compiler, ExecutionOutcome, ExecutionRequest, PhasedExecutor, Sandbox, SecurityPolicy,
    Substrate,
};

/// Process-scoped execution pipeline, initialized once at startup
pub struct Orchestrator {
    substrate: Arc<dyn Substrate>,
    cache: OutcomeCache,
    executor: PhasedExecutor,
    policy: SecurityPolicy,
    config: Config,
}

impl Orchestrator {
    pub fn new(substrate: Arc<dyn Substrate>, config: Config) -> Self {
        let cache = OutcomeCache::new(
            config.cache_enabled,
            Duration::from_secs(config.cache_ttl_secs),
        );
        let executor = PhasedExecutor::new(&config);
        Orchestrator {
            substrate,
            cache,
            executor,
            policy: SecurityPolicy::default(),
            config,
        }
    }

    /// Image providing the requested compiler variant
    fn image_for(&self, compiler: Compiler) -> &str {
        match compiler {
            Compiler::GccHead => &self.config.image_gcc_head,
            Compiler::ClangHead => &self.config.image_clang_head,
        }
    }

    /// Execute one request: cache hit, or a full sandboxed run.
    ///
    /// The sandbox is torn down on every exit path before the result is
    /// returned. The provision/phases/teardown pipeline runs in its own
    /// task awaited through a join handle: if the request future is dropped
    /// (client disconnect), the task keeps running to its teardown instead
    /// of abandoning a live container at the current await point.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let key = fingerprint(request);

        if let Some(outcome) = self.cache.get(&key).await {
            debug!(fingerprint = %key, "Outcome cache hit");
            return Ok(outcome);
        }

        let flags = parse_options(request.options.as_deref());
        let image = self.image_for(request.compiler).to_string();
        let substrate = self.substrate.clone();
        let work_dir = self.config.work_dir.clone();
        let policy = self.policy.clone();
        let executor = self.executor.clone();
        let code = request.code.clone().into_bytes();
        let compiler = request.compiler;

        let pipeline = tokio::spawn(async move {
            let sandbox = Sandbox::provision(substrate, &image, &work_dir, &policy).await?;
            info!(compiler = %compiler, container = %sandbox.handle().id, "Sandbox ready");

            let result = executor.execute(&sandbox, &code, compiler, &flags).await;

            // mandatory, regardless of how the phases ended
            sandbox.teardown().await;
            result
        });

        let outcome = pipeline
            .await
            .map_err(|e| Error::Internal(format!("Execution task failed: {}", e)))??;
        self.cache.insert(key, outcome.clone()).await;
        Ok(outcome)
    }
}
