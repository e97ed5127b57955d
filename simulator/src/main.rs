//! TagDisplay PC Simulator
//!
//! Runs the station loop on a desktop against a scripted tag. LEDs are shown as
//! a `[G Y R]` log line and the LCD is drawn on stdout.
//!
//! # Usage
//! ```bash
//! cargo run -p tagdisplay-simulator -- --text "Hyvää päivää, tämä on tagin teksti"
//!
//! # tag shows up on the 5th poll, two blocks glitch once
//! cargo run -p tagdisplay-simulator -- --tag-after 4 --glitch 3:1 --glitch 9:0
//! ```
//!
//! # Options
//! - `--config <file>`: JSON station config (otherwise `TAGDISPLAY_*` env vars)
//! - `--text <text>`: tag contents
//! - `--uid <hex>`: tag UID
//! - `--tag-after <n>`: polls before the tag enters the field
//! - `--glitch <sector:block>`: block that fails its next read (repeatable)
//! - `--policy <restart|idle>`: what follows a complete read

mod console;
mod reader;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tagdisplay_firmware::display::DisplayHandoff;
use tagdisplay_firmware::leds::spawn_owner;
use tagdisplay_firmware::nfc::{BlockAddress, SectorReader, Uid};
use tagdisplay_firmware::{
    ExecutorSlot, RestartPolicy, SecondaryCore, SingleFlightExecutor, Station, StationConfig,
    StatusSignaler, TagScanner,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::console::{ConsoleLcd, ConsoleLeds, ProcessRestart};
use crate::reader::SimulatedReader;

const DEFAULT_TEXT: &str = "Tervetuloa! Lähiluku onnistui, tämä teksti tuli tagilta.";
const DEFAULT_UID: [u8; 4] = [0x04, 0xA1, 0xB2, 0xC3];

struct Args {
    config: Option<PathBuf>,
    text: String,
    uid: Uid,
    tag_after: u64,
    glitches: Vec<BlockAddress>,
    policy: Option<RestartPolicy>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args {
            config: None,
            text: DEFAULT_TEXT.to_string(),
            uid: Uid::from_slice(&DEFAULT_UID).ok_or_else(|| anyhow!("bad default uid"))?,
            tag_after: 3,
            glitches: Vec::new(),
            policy: None,
        };

        while let Some(flag) = args.next() {
            let mut value = || args.next().ok_or_else(|| anyhow!("{flag} needs a value"));
            match flag.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--text" => parsed.text = value()?,
                "--uid" => parsed.uid = parse_uid(&value()?)?,
                "--tag-after" => {
                    parsed.tag_after = value()?.parse().context("--tag-after takes a number")?
                }
                "--glitch" => parsed.glitches.push(parse_address(&value()?)?),
                "--policy" => {
                    parsed.policy = Some(value()?.parse().map_err(|e: String| anyhow!(e))?)
                }
                other => bail!("unknown argument {other:?}"),
            }
        }

        Ok(parsed)
    }
}

fn parse_uid(hex: &str) -> anyhow::Result<Uid> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        bail!("uid must be an even number of hex digits");
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<Vec<_>, _>>()
        .context("uid must be hex")?;
    Uid::from_slice(&bytes).ok_or_else(|| anyhow!("uid must be 4, 7 or 10 bytes"))
}

fn parse_address(spec: &str) -> anyhow::Result<BlockAddress> {
    let (sector, block) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("expected sector:block, got {spec:?}"))?;
    Ok(BlockAddress::new(
        sector.parse().context("bad sector")?,
        block.parse().context("bad block")?,
    ))
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagdisplay_firmware=debug,tagdisplay_simulator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => StationConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StationConfig::from_env()?,
    };
    if let Some(policy) = args.policy {
        config.restart_policy = policy;
    }

    info!("TagDisplay Simulator");
    info!(uid = %args.uid, tag_after = args.tag_after, policy = ?config.restart_policy, "scripted tag");

    let (leds, _owner) = spawn_owner(ConsoleLeds::default()).context("starting indicator owner")?;
    leds.self_test(config.self_test_step())?;

    let executor = Arc::new(SingleFlightExecutor::new(
        SecondaryCore::new(),
        Arc::new(ExecutorSlot::new()),
        config.executor_backoff(),
    ));
    let signaler = StatusSignaler::new(leds, executor, config.error_blink, config.success_blink);

    let reader =
        SimulatedReader::with_text(args.uid, &args.text, args.tag_after).with_flaky(args.glitches);
    let sink = DisplayHandoff::new(ConsoleLcd::new(config.display.clone()));

    let scanner = TagScanner::new(
        reader,
        SectorReader::new(config.key_a),
        signaler,
        sink,
        config.poll_interval(),
    );

    let mut station = Station::new(scanner, ProcessRestart, config.restart_policy);
    station.run()
}
