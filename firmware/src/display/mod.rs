//! Display module for the 16x2 character LCD.
//!
//! HD44780 compatible controller driven in 4-bit mode:
//! - GP22 -> RS
//! - GP21 -> E
//! - GP17..GP20 -> D4..D7
//! - GP28 -> backlight
//!
//! The nibble level drive sequence lives in the display driver; this module
//! turns tag bytes into display text and decides how that text is laid out.

pub mod layout;

use tracing::{error, info};

use crate::error::DisplayError;

pub use layout::{Frame, frames, scroll_windows};

/// Receives the bytes of a fully read tag.
///
/// Called once per successful scan, right before the device restarts, so an
/// implementation must return in bounded time.
pub trait DeliverySink {
    fn deliver(&mut self, bytes: &[u8]);
}

impl<F: FnMut(&[u8])> DeliverySink for F {
    fn deliver(&mut self, bytes: &[u8]) {
        self(bytes)
    }
}

/// The character display device.
pub trait CharacterDisplay {
    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError>;

    /// Show `text`, scrolling it when it is wider than the display.
    fn print(&mut self, text: &str) -> Result<(), DisplayError>;

    /// Run the controller init sequence again (clears the screen).
    fn reinit(&mut self) -> Result<(), DisplayError>;
}

/// Tag bytes to text: NUL bytes are dropped, every other byte is taken as
/// the Latin-1 character of the same value.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// Replace the Nordic letters the LCD ROM lacks with their base letter.
pub fn fold_nordic(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'Ä' | 'Å' => 'A',
            'ä' | 'å' => 'a',
            'Ö' => 'O',
            'ö' => 'o',
            other => other,
        })
        .collect()
}

/// Delivery sink that puts the tag text on a [`CharacterDisplay`].
///
/// Display errors are logged and the handoff is abandoned; they never reach
/// the scan loop.
pub struct DisplayHandoff<D> {
    display: D,
    deliveries: u64,
}

impl<D: CharacterDisplay> DisplayHandoff<D> {
    pub fn new(display: D) -> Self {
        Self {
            display,
            deliveries: 0,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    fn show(&mut self, text: &str) -> Result<(), DisplayError> {
        self.display.set_backlight(true)?;
        self.display.print(text)?;
        self.display.reinit()
    }
}

impl<D: CharacterDisplay> DeliverySink for DisplayHandoff<D> {
    fn deliver(&mut self, bytes: &[u8]) {
        self.deliveries += 1;
        let text = fold_nordic(&bytes_to_text(bytes));
        info!(chars = text.chars().count(), "showing tag text");

        if let Err(e) = self.show(&text) {
            error!(error = %e, "display error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDisplay {
        calls: Vec<String>,
        fail_print: bool,
    }

    impl CharacterDisplay for RecordingDisplay {
        fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
            self.calls.push(format!("backlight {on}"));
            Ok(())
        }

        fn print(&mut self, text: &str) -> Result<(), DisplayError> {
            if self.fail_print {
                return Err(DisplayError::Bus("E pin stuck".into()));
            }
            self.calls.push(format!("print {text}"));
            Ok(())
        }

        fn reinit(&mut self) -> Result<(), DisplayError> {
            self.calls.push("reinit".into());
            Ok(())
        }
    }

    #[test]
    fn nul_bytes_are_skipped() {
        assert_eq!(bytes_to_text(b"Hi\0\0 there\0"), "Hi there");
        assert_eq!(bytes_to_text(&[0; 16]), "");
        assert_eq!(bytes_to_text(&[0xC4, 0x41]), "ÄA");
    }

    #[test]
    fn nordic_letters_are_folded() {
        assert_eq!(fold_nordic("Äiti Åsa Öljy"), "Aiti Asa Oljy");
        assert_eq!(fold_nordic("päivä på hööm"), "paiva pa hoom");
        assert_eq!(fold_nordic("Ümlaut ß"), "Ümlaut ß");
    }

    #[test]
    fn long_text_is_printed_once_unmodified_except_folding() {
        let mut handoff = DisplayHandoff::new(RecordingDisplay::default());
        let text = "Hyvää päivää, tämä teksti on pidempi kuin näyttö";
        let mut bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        bytes.extend_from_slice(&[0; 7]);

        handoff.deliver(&bytes);

        let prints: Vec<_> = handoff
            .display()
            .calls
            .iter()
            .filter(|c| c.starts_with("print "))
            .collect();
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0], &format!("print {}", fold_nordic(text)));
        assert_eq!(handoff.display().calls.first().map(String::as_str), Some("backlight true"));
        assert_eq!(handoff.display().calls.last().map(String::as_str), Some("reinit"));
        assert_eq!(handoff.deliveries(), 1);
    }

    #[test]
    fn display_error_is_contained() {
        let mut handoff = DisplayHandoff::new(RecordingDisplay {
            fail_print: true,
            ..Default::default()
        });

        handoff.deliver(b"abc");

        assert_eq!(handoff.display().calls, vec!["backlight true".to_string()]);
        assert_eq!(handoff.deliveries(), 1);
    }

    #[test]
    fn closures_are_delivery_sinks() {
        let mut got = Vec::new();
        {
            let mut sink = |bytes: &[u8]| got.extend_from_slice(bytes);
            sink.deliver(b"xyz");
        }
        assert_eq!(got, b"xyz");
    }
}
