//! Sandbox lifecycle management
//!
//! One throwaway sandbox per request, with guaranteed removal. The lifecycle
//! only moves forward: created, started, settled, ready for injection, torn
//! down. Teardown is reachable from every state and never surfaces a
//! failure; a sandbox that is already stopped or already gone is not an
//! error worth reporting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::sandbox::substrate::{SandboxHandle, SecurityPolicy, Substrate};

/// Wait after start before trusting the container filesystem with injection
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Bounded wait for a graceful stop before the forced remove
const STOP_GRACE: Duration = Duration::from_secs(2);

/// One live, exclusively-owned sandbox
pub struct Sandbox {
    substrate: Arc<dyn Substrate>,
    handle: SandboxHandle,
}

impl Sandbox {
    /// Create and start a fresh sandbox, settled and ready for injection.
    ///
    /// If start fails after create succeeded, the half-started sandbox is
    /// torn down before the error is returned.
    pub async fn provision(
        substrate: Arc<dyn Substrate>,
        image: &str,
        workdir: &str,
        policy: &SecurityPolicy,
    ) -> Result<Self> {
        let handle = substrate.create(image, workdir, policy).await?;
        let sandbox = Sandbox { substrate, handle };

        if let Err(e) = sandbox.substrate.start(&sandbox.handle).await {
            sandbox.teardown().await;
            return Err(e);
        }

        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(sandbox)
    }

    /// Identity of the owned sandbox
    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    /// Shared substrate this sandbox lives on
    pub fn substrate(&self) -> &Arc<dyn Substrate> {
        &self.substrate
    }

    /// Stop (bounded) then force-remove, consuming the sandbox.
    ///
    /// Failures are swallowed: they are logged, never retried, and never
    /// block request completion.
    pub async fn teardown(self) {
        if let Err(e) = self.substrate.stop(&self.handle, STOP_GRACE).await {
            debug!(container = %self.handle.id, error = %e, "Sandbox stop failed");
        }
        if let Err(e) = self.substrate.remove(&self.handle).await {
            warn!(container = %self.handle.id, error = %e, "Sandbox remove failed");
        }
    }
}
