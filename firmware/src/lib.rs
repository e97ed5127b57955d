//! TagDisplay firmware core
//!
//! Polls a MIFARE Classic reader, reads the data blocks of sectors 1-15 with
//! key A and hands the collected bytes to a 16x2 character LCD. Three LEDs
//! (success, progress, error) report scan state.
//!
//! Hardware is reached only through the traits in [`nfc`], [`leds`],
//! [`display`] and [`station`], so the same logic runs on the board and in the
//! desktop simulator.

pub mod config;
pub mod display;
pub mod error;
pub mod executor;
pub mod leds;
pub mod nfc;
pub mod scanner;
pub mod station;
pub mod status;

pub use config::StationConfig;
pub use error::{BlockReadError, ConfigError, DisplayError, LaunchError, ReaderError};
pub use executor::{ExecutorSlot, SecondaryCore, SingleFlightExecutor};
pub use scanner::{PollOutcome, ScanReport, TagScanner};
pub use station::{Restart, RestartPolicy, Station};
pub use status::{ScanStatus, StatusSignaler};
