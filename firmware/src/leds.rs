//! Status LEDs.
//!
//! Three LEDs report scan state:
//! - GP8 -> success (green)
//! - GP6 -> progress (yellow)
//! - GP7 -> error (red)
//!
//! All pin writes happen on one owner thread. The scan loop and the secondary
//! core talk to it through an [`IndicatorHandle`], so a success blink running on
//! the secondary core can never interleave its pin writes with an error blink
//! from the scan loop.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::digital::{Error as _, OutputPin};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::IndicatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Success,
    Progress,
    Error,
}

impl Led {
    /// Order used by the power-on sequence.
    pub const ALL: [Led; 3] = [Led::Success, Led::Progress, Led::Error];
}

/// `count` on/off cycles, `interval` per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "BlinkPatternMs")]
pub struct BlinkPattern {
    pub interval: Duration,
    pub count: u32,
}

#[derive(Deserialize)]
struct BlinkPatternMs {
    #[serde(default = "default_blink_interval_ms")]
    interval_ms: u64,
    #[serde(default = "default_blink_count")]
    count: u32,
}

fn default_blink_interval_ms() -> u64 {
    500
}

fn default_blink_count() -> u32 {
    1
}

impl From<BlinkPatternMs> for BlinkPattern {
    fn from(p: BlinkPatternMs) -> Self {
        BlinkPattern::new(Duration::from_millis(p.interval_ms), p.count)
    }
}

impl BlinkPattern {
    pub const fn new(interval: Duration, count: u32) -> Self {
        Self { interval, count }
    }
}

impl Default for BlinkPattern {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(default_blink_interval_ms()),
            default_blink_count(),
        )
    }
}

/// The indicator device.
pub trait Indicators: Send {
    fn set_high(&mut self, led: Led) -> Result<(), IndicatorError>;

    fn set_low(&mut self, led: Led) -> Result<(), IndicatorError>;

    /// Blocks for `2 * interval * count`.
    fn blink(&mut self, led: Led, pattern: BlinkPattern) -> Result<(), IndicatorError> {
        for _ in 0..pattern.count {
            self.set_high(led)?;
            thread::sleep(pattern.interval);
            self.set_low(led)?;
            thread::sleep(pattern.interval);
        }
        Ok(())
    }

    fn clear_all(&mut self) -> Result<(), IndicatorError> {
        for led in Led::ALL {
            self.set_low(led)?;
        }
        Ok(())
    }
}

/// Power-on sequence: each LED on in turn, then each off in turn.
pub fn self_test<I: Indicators + ?Sized>(leds: &mut I, step: Duration) -> Result<(), IndicatorError> {
    for on in [true, false] {
        for led in Led::ALL {
            if on {
                leds.set_high(led)?;
            } else {
                leds.set_low(led)?;
            }
            thread::sleep(step);
        }
    }
    Ok(())
}

/// LEDs wired to `embedded-hal` output pins.
pub struct PinIndicators<P> {
    success: P,
    progress: P,
    error: P,
}

impl<P: OutputPin> PinIndicators<P> {
    pub fn new(success: P, progress: P, error: P) -> Self {
        Self {
            success,
            progress,
            error,
        }
    }

    fn pin(&mut self, led: Led) -> &mut P {
        match led {
            Led::Success => &mut self.success,
            Led::Progress => &mut self.progress,
            Led::Error => &mut self.error,
        }
    }
}

impl<P: OutputPin + Send> Indicators for PinIndicators<P> {
    fn set_high(&mut self, led: Led) -> Result<(), IndicatorError> {
        self.pin(led)
            .set_high()
            .map_err(|e| IndicatorError::Pin(format!("{led:?}: {:?}", e.kind())))
    }

    fn set_low(&mut self, led: Led) -> Result<(), IndicatorError> {
        self.pin(led)
            .set_low()
            .map_err(|e| IndicatorError::Pin(format!("{led:?}: {:?}", e.kind())))
    }
}

enum IndicatorCommand {
    High(Led),
    Low(Led),
    ClearAll,
    Blink {
        led: Led,
        pattern: BlinkPattern,
        done: oneshot::Sender<()>,
    },
    SelfTest {
        step: Duration,
        done: oneshot::Sender<()>,
    },
}

/// Sender side of the indicator owner task.
#[derive(Clone)]
pub struct IndicatorHandle {
    tx: mpsc::UnboundedSender<IndicatorCommand>,
}

impl IndicatorHandle {
    fn send(&self, command: IndicatorCommand) -> Result<(), IndicatorError> {
        self.tx.send(command).map_err(|_| IndicatorError::OwnerGone)
    }

    pub fn set_high(&self, led: Led) -> Result<(), IndicatorError> {
        self.send(IndicatorCommand::High(led))
    }

    pub fn set_low(&self, led: Led) -> Result<(), IndicatorError> {
        self.send(IndicatorCommand::Low(led))
    }

    pub fn clear_all(&self) -> Result<(), IndicatorError> {
        self.send(IndicatorCommand::ClearAll)
    }

    /// Blink and wait until the owner has finished the sequence.
    pub fn blink(&self, led: Led, pattern: BlinkPattern) -> Result<(), IndicatorError> {
        let (done, wait) = oneshot::channel();
        self.send(IndicatorCommand::Blink { led, pattern, done })?;
        wait.blocking_recv().map_err(|_| IndicatorError::OwnerGone)
    }

    /// Run the power-on sequence and wait for it.
    pub fn self_test(&self, step: Duration) -> Result<(), IndicatorError> {
        let (done, wait) = oneshot::channel();
        self.send(IndicatorCommand::SelfTest { step, done })?;
        wait.blocking_recv().map_err(|_| IndicatorError::OwnerGone)
    }
}

/// Move `device` onto its own thread.
///
/// The thread exits once every [`IndicatorHandle`] is dropped and hands the
/// device back through the join handle.
pub fn spawn_owner<I>(device: I) -> std::io::Result<(IndicatorHandle, JoinHandle<I>)>
where
    I: Indicators + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    let join = thread::Builder::new()
        .name("indicators".into())
        .spawn(move || {
            let mut device = device;
            while let Some(command) = rx.blocking_recv() {
                if let Err(e) = apply(&mut device, command) {
                    warn!(error = %e, "indicator command failed");
                }
            }
            debug!("indicator owner stopped");
            device
        })?;

    Ok((IndicatorHandle { tx }, join))
}

fn apply<I: Indicators>(device: &mut I, command: IndicatorCommand) -> Result<(), IndicatorError> {
    match command {
        IndicatorCommand::High(led) => device.set_high(led),
        IndicatorCommand::Low(led) => device.set_low(led),
        IndicatorCommand::ClearAll => device.clear_all(),
        IndicatorCommand::Blink { led, pattern, done } => {
            let result = device.blink(led, pattern);
            let _ = done.send(());
            result
        }
        IndicatorCommand::SelfTest { step, done } => {
            let result = self_test(device, step);
            let _ = done.send(());
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

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

    struct FakePin {
        name: Led,
        log: Log,
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.log.lock().unwrap().push((self.name, false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.log.lock().unwrap().push((self.name, true));
            Ok(())
        }
    }

    #[test]
    fn blink_toggles_count_times() {
        let log = Log::default();
        let mut leds = RecordingLeds(log.clone());

        leds.blink(Led::Error, BlinkPattern::new(Duration::ZERO, 2)).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Led::Error, true),
                (Led::Error, false),
                (Led::Error, true),
                (Led::Error, false)
            ]
        );
    }

    #[test]
    fn self_test_walks_all_leds_on_then_off() {
        let log = Log::default();
        let mut leds = RecordingLeds(log.clone());

        self_test(&mut leds, Duration::ZERO).unwrap();

        let expected: Vec<_> = Led::ALL
            .iter()
            .map(|l| (*l, true))
            .chain(Led::ALL.iter().map(|l| (*l, false)))
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[test]
    fn pin_indicators_drive_matching_pin() {
        let log = Log::default();
        let pin = |name| FakePin {
            name,
            log: log.clone(),
        };
        let mut leds = PinIndicators::new(pin(Led::Success), pin(Led::Progress), pin(Led::Error));

        leds.set_high(Led::Progress).unwrap();
        leds.clear_all().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Led::Progress, true),
                (Led::Success, false),
                (Led::Progress, false),
                (Led::Error, false)
            ]
        );
    }

    #[test]
    fn owner_applies_commands_in_order_and_returns_device() {
        let log = Log::default();
        let (handle, join) = spawn_owner(RecordingLeds(log.clone())).unwrap();

        handle.set_high(Led::Progress).unwrap();
        handle.blink(Led::Success, BlinkPattern::new(Duration::ZERO, 1)).unwrap();
        handle.clear_all().unwrap();
        drop(handle);
        let _device = join.join().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Led::Progress, true),
                (Led::Success, true),
                (Led::Success, false),
                (Led::Success, false),
                (Led::Progress, false),
                (Led::Error, false)
            ]
        );
    }

    #[test]
    fn blink_pattern_from_config_json() {
        let pattern: BlinkPattern = serde_json::from_str(r#"{"interval_ms": 250, "count": 3}"#).unwrap();
        assert_eq!(pattern, BlinkPattern::new(Duration::from_millis(250), 3));

        let pattern: BlinkPattern = serde_json::from_str("{}").unwrap();
        assert_eq!(pattern, BlinkPattern::default());
    }
}
