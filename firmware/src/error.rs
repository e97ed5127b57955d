use thiserror::Error;

use crate::nfc::BlockAddress;

/// Errors reported by the tag reader device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("no tag answered")]
    NoTag,

    #[error("tag protocol error")]
    Protocol,

    #[error("authentication with key {0:?} failed")]
    Authentication(crate::nfc::MifareKeyType),

    #[error("reader transport error: {0}")]
    Transport(String),
}

/// A single block read that yielded no data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockReadError {
    #[error("reading {address} failed: {source}")]
    Device {
        address: BlockAddress,
        #[source]
        source: ReaderError,
    },

    #[error("reader returned no payload for {0}")]
    Empty(BlockAddress),
}

impl BlockReadError {
    pub fn address(&self) -> BlockAddress {
        match self {
            BlockReadError::Device { address, .. } => *address,
            BlockReadError::Empty(address) => *address,
        }
    }
}

/// Why the secondary execution unit refused a task.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("secondary core is still in use")]
    Busy,

    #[error("failed to spawn task thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("task rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("display bus error: {0}")]
    Bus(String),

    #[error("display does not support character {0:?}")]
    UnsupportedChar(char),
}

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("indicator owner task has stopped")]
    OwnerGone,

    #[error("indicator pin error: {0}")]
    Pin(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}
