//! Application-wide engine context.
//!
//! One supervisor/API pair constructed at startup and passed by handle to
//! every call site, instead of a module-level mutable singleton. Construction
//! in tests is fully isolated: swap the spawner, endpoint, or retry policy.

use std::sync::Arc;

use crate::api::EngineApi;
use crate::client::{ResilientClient, RetryPolicy};
use crate::launch::{RunMode, WorkerSpec};
use crate::platform::PlatformProfile;
use crate::supervisor::EngineSupervisor;

pub struct EngineContext {
    supervisor: Arc<EngineSupervisor>,
    api: EngineApi,
}

impl EngineContext {
    /// Build the context for a run mode with default platform, spawner and
    /// retry policy.
    pub fn new(mode: &RunMode) -> Self {
        let platform = PlatformProfile::native();
        let spec = WorkerSpec::resolve(mode, &platform);
        Self::from_supervisor(EngineSupervisor::new(spec), RetryPolicy::default())
    }

    /// Build the context around an already-configured supervisor. The API
    /// client targets the supervisor's endpoint.
    pub fn from_supervisor(supervisor: EngineSupervisor, policy: RetryPolicy) -> Self {
        let client = ResilientClient::new(supervisor.endpoint_url()).with_policy(policy);
        Self {
            supervisor: Arc::new(supervisor),
            api: EngineApi::new(client),
        }
    }

    pub fn supervisor(&self) -> &Arc<EngineSupervisor> {
        &self.supervisor
    }

    pub fn api(&self) -> &EngineApi {
        &self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn api_targets_supervisor_endpoint() {
        let ctx = EngineContext::new(&RunMode::Packaged {
            resources_dir: PathBuf::from("/opt/quicktrans"),
        });

        assert_eq!(
            ctx.api().client().base_url(),
            &ctx.supervisor().endpoint_url()
        );
    }

    #[test]
    fn custom_policy_is_applied() {
        let platform = PlatformProfile::native();
        let spec = WorkerSpec::resolve(
            &RunMode::Packaged {
                resources_dir: PathBuf::from("/opt/quicktrans"),
            },
            &platform,
        );
        let policy = RetryPolicy {
            max_attempts: 5,
            inter_attempt_delay: std::time::Duration::from_millis(250),
        };
        let ctx = EngineContext::from_supervisor(EngineSupervisor::new(spec), policy);

        assert_eq!(ctx.api().client().policy().max_attempts, 5);
    }
}
