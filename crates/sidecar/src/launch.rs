//! Worker launch description and spawning.
//!
//! A [`WorkerSpec`] is resolved once from the run mode (development venv vs
//! packaged binary) and never mutated afterwards. Spawning goes through the
//! [`EngineSpawner`] trait so tests can count or intercept spawn calls.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::platform::PlatformProfile;

/// Where the engine lives on disk.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Project checkout: interpreter from the engine's venv plus the API
    /// server script, both of which must exist on disk.
    Development { engine_dir: PathBuf },
    /// Installed application: a self-contained platform-suffixed executable
    /// under the resources directory, no script argument.
    Packaged { resources_dir: PathBuf },
}

/// Immutable description of how to launch the engine worker.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Executable to spawn: the venv interpreter in development, the bundled
    /// engine binary in packaged mode.
    pub executable: PathBuf,
    /// Arguments passed to the executable, in order.
    pub script_args: Vec<String>,
    /// Script path that must exist in development mode, checked separately
    /// from the executable so the failure is distinguishable.
    pub script: Option<PathBuf>,
    /// Environment merged over the parent process environment at spawn.
    pub env_overlay: HashMap<String, String>,
}

impl WorkerSpec {
    /// Resolve the launch description for the given run mode.
    pub fn resolve(mode: &RunMode, platform: &PlatformProfile) -> Self {
        // Unbuffered output is required: readiness detection reads the
        // worker's stdout line-by-line and a buffered uvicorn banner would
        // arrive too late or not at all.
        let mut env_overlay = HashMap::new();
        env_overlay.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());

        match mode {
            RunMode::Development { engine_dir } => {
                let script = engine_dir.join("api_server.py");
                Self {
                    executable: engine_dir.join(platform.venv_interpreter),
                    script_args: vec![script.display().to_string()],
                    script: Some(script),
                    env_overlay,
                }
            }
            RunMode::Packaged { resources_dir } => Self {
                executable: resources_dir
                    .join("python-engine")
                    .join(platform.packaged_binary),
                script_args: Vec::new(),
                script: None,
                env_overlay,
            },
        }
    }
}

/// Extension point for worker spawn strategies.
pub trait EngineSpawner: Send + Sync {
    fn spawn(&self, spec: &WorkerSpec) -> std::io::Result<Child>;
}

/// Default spawner: runs the spec's executable as a child process with piped
/// stdio.
pub struct ProcessSpawner;

impl EngineSpawner for ProcessSpawner {
    fn spawn(&self, spec: &WorkerSpec) -> std::io::Result<Child> {
        Command::new(&spec.executable)
            .args(&spec.script_args)
            .envs(&spec.env_overlay)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}
