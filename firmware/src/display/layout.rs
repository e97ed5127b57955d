//! Text layout for a fixed width character display.
//!
//! Text that fits is shown once and held. Longer text scrolls: the text is
//! joined to itself with one space and a display-wide window slides over it
//! one character per step, so the end of the text runs straight into its
//! start.

use std::time::Duration;

use crate::config::DisplayConfig;

/// One screenful and how long to keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub text: String,
    pub hold: Duration,
}

/// The windows of one scroll pass over `text`.
///
/// Text no wider than `width` yields itself as the only window.
pub fn scroll_windows(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if width == 0 || chars.len() <= width {
        return vec![text.to_string()];
    }

    let mut track = chars.clone();
    track.push(' ');
    track.extend_from_slice(&chars);

    track
        .windows(width)
        .map(|window| window.iter().collect())
        .collect()
}

/// Every frame needed to show `text` with the given display settings.
pub fn frames(text: &str, config: &DisplayConfig) -> Vec<Frame> {
    let windows = scroll_windows(text, config.width);
    if text.chars().count() <= config.width {
        return windows
            .into_iter()
            .map(|text| Frame {
                text,
                hold: config.static_hold(),
            })
            .collect();
    }

    let step = config.scroll_step();
    (0..config.scroll_passes)
        .flat_map(|_| windows.iter().cloned())
        .map(|text| Frame { text, hold: step })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_static_frame() {
        let config = DisplayConfig::default();
        let frames = frames("Hello", &config);

        assert_eq!(
            frames,
            vec![Frame {
                text: "Hello".into(),
                hold: Duration::from_secs(2)
            }]
        );
    }

    #[test]
    fn exactly_display_wide_text_does_not_scroll() {
        assert_eq!(scroll_windows("0123456789abcdef", 16), vec!["0123456789abcdef"]);
    }

    #[test]
    fn long_text_wraps_into_itself() {
        let text = "0123456789abcdefXY"; // 18 chars
        let windows = scroll_windows(text, 16);

        // (18 + 1 + 18) - 15 windows
        assert_eq!(windows.len(), 22);
        assert_eq!(windows[0], "0123456789abcdef");
        assert_eq!(windows[2], "23456789abcdefXY");
        assert_eq!(windows[3], "3456789abcdefXY ");
        assert_eq!(windows[4], "456789abcdefXY 0");
        assert_eq!(windows.last().unwrap(), "23456789abcdefXY");
        assert!(windows.iter().all(|w| w.chars().count() == 16));
    }

    #[test]
    fn scroll_passes_repeat_windows() {
        let config = DisplayConfig {
            scroll_passes: 2,
            ..DisplayConfig::default()
        };
        let text = "a long line of tag text";

        let frames = frames(text, &config);

        assert_eq!(frames.len(), 2 * scroll_windows(text, 16).len());
        assert!(frames.iter().all(|f| f.hold == Duration::from_millis(500)));
    }
}
