//! Console stand-ins for the board peripherals.

use std::collections::HashMap;
use std::io::Write;
use std::thread;

use tagdisplay_firmware::config::DisplayConfig;
use tagdisplay_firmware::display::{CharacterDisplay, frames};
use tagdisplay_firmware::error::{DisplayError, IndicatorError};
use tagdisplay_firmware::leds::{Indicators, Led};
use tagdisplay_firmware::station::Restart;
use tracing::info;

/// LEDs rendered as a `[G Y R]` status line.
#[derive(Default)]
pub struct ConsoleLeds {
    lit: HashMap<Led, bool>,
}

impl ConsoleLeds {
    fn render(&self) -> String {
        let lamp = |led: Led, on_char: char| {
            if self.lit.get(&led).copied().unwrap_or(false) {
                on_char
            } else {
                '.'
            }
        };
        format!(
            "[{} {} {}]",
            lamp(Led::Success, 'G'),
            lamp(Led::Progress, 'Y'),
            lamp(Led::Error, 'R')
        )
    }

    fn set(&mut self, led: Led, on: bool) {
        if self.lit.insert(led, on) != Some(on) {
            info!(leds = %self.render(), "led");
        }
    }
}

impl Indicators for ConsoleLeds {
    fn set_high(&mut self, led: Led) -> Result<(), IndicatorError> {
        self.set(led, true);
        Ok(())
    }

    fn set_low(&mut self, led: Led) -> Result<(), IndicatorError> {
        self.set(led, false);
        Ok(())
    }
}

/// 16x2 LCD drawn on stdout.
pub struct ConsoleLcd {
    config: DisplayConfig,
    backlight: bool,
}

impl ConsoleLcd {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            backlight: false,
        }
    }

    fn draw(&self, line: &str) -> Result<(), DisplayError> {
        let mut out = std::io::stdout().lock();
        write!(out, "\r|{:<width$}|", line, width = self.config.width)
            .and_then(|_| out.flush())
            .map_err(|e| DisplayError::Bus(e.to_string()))
    }
}

impl CharacterDisplay for ConsoleLcd {
    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        self.backlight = on;
        Ok(())
    }

    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        if let Some(c) = text.chars().find(|c| !c.is_ascii()) {
            // HD44780 ROM A00 has no glyphs above 0x7F
            return Err(DisplayError::UnsupportedChar(c));
        }
        for frame in frames(text, &self.config) {
            self.draw(&frame.text)?;
            thread::sleep(frame.hold);
        }
        self.draw("")?;
        println!();
        Ok(())
    }

    fn reinit(&mut self) -> Result<(), DisplayError> {
        info!(backlight = self.backlight, "lcd init");
        Ok(())
    }
}

/// On the desktop a device restart ends the process.
pub struct ProcessRestart;

impl Restart for ProcessRestart {
    fn restart(&self) -> ! {
        info!("simulated restart, exiting");
        std::process::exit(0)
    }
}
