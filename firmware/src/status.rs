//! Scan status on the three LEDs.
//!
//! Progress and error indication happen on the polling thread. The success
//! blink is handed to the secondary core so delivery to the display is not
//! held up by it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::IndicatorError;
use crate::executor::{ExecutionUnit, SignalTask, SingleFlightExecutor};
use crate::leds::{BlinkPattern, IndicatorHandle, Led};

/// Scan progress as shown on the LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Waiting for a tag: all LEDs off
    Idle,
    /// Tag answered, blocks are being read: progress LED on
    InProgress,
    /// A block read failed: one error blink, caller waits for it
    Error,
    /// Every block read: success blink on the secondary core
    Success,
}

/// Maps [`ScanStatus`] changes to LED actions.
pub struct StatusSignaler<U> {
    leds: IndicatorHandle,
    executor: Arc<SingleFlightExecutor<U>>,
    error_blink: BlinkPattern,
    success_blink: BlinkPattern,
}

impl<U: ExecutionUnit> StatusSignaler<U> {
    pub fn new(
        leds: IndicatorHandle,
        executor: Arc<SingleFlightExecutor<U>>,
        error_blink: BlinkPattern,
        success_blink: BlinkPattern,
    ) -> Self {
        Self {
            leds,
            executor,
            error_blink,
            success_blink,
        }
    }

    pub fn executor(&self) -> &Arc<SingleFlightExecutor<U>> {
        &self.executor
    }

    /// Block until the last dispatched task has returned.
    ///
    /// Any LED writes it made are queued ahead of whatever is signalled next.
    pub fn settle(&self, step: Duration) {
        while let Some(handle) = self.executor.slot().current() {
            if handle.is_finished() {
                break;
            }
            thread::sleep(step);
        }
    }

    /// LED failures are logged and otherwise ignored.
    pub fn signal(&self, status: ScanStatus) {
        debug!(?status, "status change");
        if let Err(e) = self.apply(status) {
            warn!(?status, error = %e, "status indication failed");
        }
    }

    fn apply(&self, status: ScanStatus) -> Result<(), IndicatorError> {
        match status {
            ScanStatus::Idle => self.leds.clear_all(),
            ScanStatus::InProgress => self.leds.set_high(Led::Progress),
            ScanStatus::Error => {
                self.leds.set_low(Led::Progress)?;
                self.leds.blink(Led::Error, self.error_blink)
            }
            ScanStatus::Success => {
                self.leds.set_low(Led::Progress)?;
                let leds = self.leds.clone();
                let pattern = self.success_blink;
                self.executor.start(SignalTask::new("success-blink", move || {
                    let shown = leds
                        .blink(Led::Success, pattern)
                        .and_then(|_| leds.set_high(Led::Success));
                    if let Err(e) = shown {
                        warn!(error = %e, "success indication failed");
                    }
                }));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    use crate::executor::{ExecutorSlot, SecondaryCore};
    use crate::leds::{Indicators, spawn_owner};

    type Log = Arc<Mutex<Vec<(Led, bool)>>>;

    struct RecordingLeds(Log);

    impl Indicators for RecordingLeds {
        fn set_high(&mut self, led: Led) -> Result<(), IndicatorError> {
            self.0.lock().unwrap().push((led, true));
            Ok(())
        }

        fn set_low(&mut self, led: Led) -> Result<(), IndicatorError> {
            self.0.lock().unwrap().push((led, false));
            Ok(())
        }
    }

    fn signaler(log: &Log) -> StatusSignaler<SecondaryCore> {
        let (leds, _join) = spawn_owner(RecordingLeds(log.clone())).unwrap();
        let executor = Arc::new(SingleFlightExecutor::new(
            SecondaryCore::new(),
            Arc::new(ExecutorSlot::new()),
            Duration::from_millis(1),
        ));
        let blink = BlinkPattern::new(Duration::ZERO, 1);
        StatusSignaler::new(leds, executor, blink, blink)
    }

    #[test]
    fn error_blink_completes_before_signal_returns() {
        let log = Log::default();
        let signaler = signaler(&log);

        signaler.signal(ScanStatus::InProgress);
        signaler.signal(ScanStatus::Error);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Led::Progress, true),
                (Led::Progress, false),
                (Led::Error, true),
                (Led::Error, false)
            ]
        );
    }

    #[test]
    fn idle_clears_every_led() {
        let log = Log::default();
        let signaler = signaler(&log);

        signaler.signal(ScanStatus::Idle);
        // a blocking call flushes the owner queue
        signaler.signal(ScanStatus::Error);

        let log = log.lock().unwrap();
        assert_eq!(
            &log[..3],
            &[(Led::Success, false), (Led::Progress, false), (Led::Error, false)]
        );
    }

    #[test]
    fn success_runs_on_secondary_core_and_leaves_led_lit() {
        let log = Log::default();
        let signaler = signaler(&log);

        signaler.signal(ScanStatus::Success);

        let handle = signaler.executor().slot().current().unwrap();
        assert_eq!(handle.name(), "success-blink");

        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(handle.is_finished());
        // the final set_high is queued before the task returns; flush it
        signaler.signal(ScanStatus::Error);

        let log = log.lock().unwrap();
        assert_eq!(
            &log[..4],
            &[
                (Led::Progress, false),
                (Led::Success, true),
                (Led::Success, false),
                (Led::Success, true)
            ]
        );
    }

    #[test]
    fn settled_success_task_cannot_relight_after_idle() {
        let log = Log::default();
        let (leds, _join) = spawn_owner(RecordingLeds(log.clone())).unwrap();
        let executor = Arc::new(SingleFlightExecutor::new(
            SecondaryCore::new(),
            Arc::new(ExecutorSlot::new()),
            Duration::from_millis(1),
        ));
        let signaler = StatusSignaler::new(
            leds,
            executor,
            BlinkPattern::new(Duration::ZERO, 1),
            BlinkPattern::new(Duration::from_millis(50), 1),
        );

        signaler.signal(ScanStatus::Success);
        signaler.settle(Duration::from_millis(1));
        signaler.signal(ScanStatus::Idle);
        // a blocking call flushes the owner queue
        signaler.signal(ScanStatus::Error);

        let log = log.lock().unwrap();
        let last_success = log.iter().rev().find(|(led, _)| *led == Led::Success);
        assert_eq!(last_success, Some(&(Led::Success, false)));
    }

    #[test]
    fn settle_returns_at_once_without_a_task() {
        let log = Log::default();
        let signaler = signaler(&log);

        let start = Instant::now();
        signaler.settle(Duration::from_secs(5));

        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
