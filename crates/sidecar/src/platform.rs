//! Platform-dependent launch and shutdown parameters.
//!
//! All OS-conditional values live here, resolved once at supervisor
//! construction instead of branching at each use site.

use std::time::Duration;

/// How the worker process is asked to go away.
///
/// Windows has no reliable cooperative shutdown for console subprocesses, so
/// the worker is killed outright there. Everywhere else SIGTERM gives uvicorn
/// a chance to close its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Graceful,
    Forceful,
}

/// OS-dependent constants for launching and supervising the engine.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    /// File name of the self-contained engine binary in packaged mode.
    pub packaged_binary: &'static str,
    /// File name of the Python interpreter inside the development venv,
    /// relative to the engine directory.
    pub venv_interpreter: &'static str,
    /// How long to wait for a readiness sentinel before falling back to the
    /// health probe. First run can download models, and Windows cold starts
    /// are markedly slower.
    pub readiness_timeout: Duration,
    pub termination: Termination,
}

impl PlatformProfile {
    /// Profile for the platform this binary was compiled for.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self {
                packaged_binary: "QuickTrans-API.exe",
                venv_interpreter: ".venv/Scripts/python.exe",
                readiness_timeout: Duration::from_secs(45),
                termination: Termination::Forceful,
            }
        } else {
            Self {
                packaged_binary: "QuickTrans-API",
                venv_interpreter: ".venv/bin/python",
                readiness_timeout: Duration::from_secs(15),
                termination: Termination::Graceful,
            }
        }
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::native()
    }
}
