//! The host loop around the scanner.
//!
//! A completed scan is a terminal state. What follows it is decided here:
//! the board restarts (the behaviour it ships with), or the station goes back
//! to idle and waits for the next tag.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::display::DeliverySink;
use crate::executor::ExecutionUnit;
use crate::nfc::TagReader;
use crate::scanner::{ScanReport, TagScanner};

/// Poll step while waiting for the success task before going idle.
const SETTLE_STEP: Duration = Duration::from_millis(10);

/// Full device restart. All process state is lost.
pub trait Restart {
    fn restart(&self) -> !;
}

/// What a completed scan leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Restart the device after every successful scan.
    #[default]
    Restart,
    /// Clear the LEDs and poll for the next tag.
    Idle,
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restart" => Ok(RestartPolicy::Restart),
            "idle" => Ok(RestartPolicy::Idle),
            other => Err(format!("unknown restart policy {other:?}")),
        }
    }
}

pub struct Station<R, U, S, X> {
    scanner: TagScanner<R, U, S>,
    restart: X,
    policy: RestartPolicy,
    completed: u64,
}

impl<R, U, S, X> Station<R, U, S, X>
where
    R: TagReader,
    U: ExecutionUnit,
    S: DeliverySink,
    X: Restart,
{
    pub fn new(scanner: TagScanner<R, U, S>, restart: X, policy: RestartPolicy) -> Self {
        Self {
            scanner,
            restart,
            policy,
            completed: 0,
        }
    }

    pub fn scanner(&self) -> &TagScanner<R, U, S> {
        &self.scanner
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Scan until a tag is read completely, then apply the restart policy.
    ///
    /// Only returns under [`RestartPolicy::Idle`].
    pub fn run_cycle(&mut self) -> ScanReport {
        let report = self.scanner.run();
        self.completed += 1;

        info!(
            session = %report.session_id,
            uid = %report.uid,
            bytes = report.data.len(),
            elapsed_ms = report.elapsed_ms,
            "tag read complete"
        );
        if let Ok(json) = serde_json::to_string(&report) {
            debug!(report = %json, "scan report");
        }

        match self.policy {
            RestartPolicy::Restart => {
                info!("restarting device");
                self.restart.restart()
            }
            RestartPolicy::Idle => {
                // The success task must not light its LED after the next
                // cycle has cleared them.
                self.scanner.signaler().settle(SETTLE_STEP);
                info!(completed = self.completed, "returning to idle");
                report
            }
        }
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.run_cycle();
        }
    }
}
