//! NFC module for the MFRC522 reader.
//!
//! The MFRC522 is an ISO14443A frontend; the station only talks to
//! MIFARE Classic 1K tags through it:
//! - REQA/WUPA to detect a tag in the field
//! - anticollision + select to obtain the UID
//! - Crypto-1 authentication per sector, then 16-byte block reads
//!
//! Hardware connection (SPI1):
//! - GP14 -> SCK
//! - GP15 -> MOSI
//! - GP12 -> MISO
//! - GP13 -> CS
//! - GP9  -> RST
//!
//! The driver itself lives outside this crate and is reached through
//! [`TagReader`].

pub mod sector;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReaderError;

pub use sector::SectorReader;

/// Number of sectors on a MIFARE Classic 1K tag.
pub const SECTORS: u8 = 16;
/// Sector 0 holds manufacturer data and is never scanned.
pub const FIRST_DATA_SECTOR: u8 = 1;
/// Blocks 0..3 of each sector carry data; block 3 is the sector trailer.
pub const DATA_BLOCKS_PER_SECTOR: u8 = 3;
/// Blocks per sector including the trailer.
pub const BLOCKS_PER_SECTOR: u8 = 4;
/// Payload size of one block read.
pub const BLOCK_SIZE: usize = 16;

/// Factory default key A.
pub const DEFAULT_KEY_A: MifareKey = MifareKey([0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
/// Key B as shipped in the station config. Never used for authentication.
pub const DEFAULT_KEY_B: MifareKey = MifareKey([0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

/// The tag reader device.
///
/// Calls block until the transport answers; the reader imposes its own
/// timeouts.
pub trait TagReader {
    /// Send REQA/WUPA and report what answered.
    fn request(&mut self, mode: RequestMode) -> Result<TagType, ReaderError>;

    /// Run anticollision and select the tag in the field.
    fn select_tag(&mut self) -> Result<Uid, ReaderError>;

    /// Authenticate the sector of `address` with `key` and read the block.
    ///
    /// `Ok(None)` means the device reported success without returning data.
    fn read_block(
        &mut self,
        uid: &Uid,
        address: BlockAddress,
        key: &MifareKey,
    ) -> Result<Option<Vec<u8>>, ReaderError>;

    /// Drop the Crypto-1 session so the tag can be selected again.
    fn release_crypto(&mut self);
}

impl<R: TagReader + ?Sized> TagReader for &mut R {
    fn request(&mut self, mode: RequestMode) -> Result<TagType, ReaderError> {
        (**self).request(mode)
    }

    fn select_tag(&mut self) -> Result<Uid, ReaderError> {
        (**self).select_tag()
    }

    fn read_block(
        &mut self,
        uid: &Uid,
        address: BlockAddress,
        key: &MifareKey,
    ) -> Result<Option<Vec<u8>>, ReaderError> {
        (**self).read_block(uid, address, key)
    }

    fn release_crypto(&mut self) {
        (**self).release_crypto()
    }
}

/// Which tags answer a request. The station always wakes halted tags too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// WUPA: tags in IDLE and HALT state
    All,
}

impl RequestMode {
    pub fn command(self) -> u8 {
        match self {
            RequestMode::All => 0x52,
        }
    }
}

/// ATQA returned by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagType {
    pub atqa: [u8; 2],
}

impl TagType {
    pub fn new(atqa: [u8; 2]) -> Self {
        Self { atqa }
    }

    pub fn is_mifare_classic_1k(&self) -> bool {
        self.atqa == [0x04, 0x00]
    }

    pub fn is_mifare_classic_4k(&self) -> bool {
        self.atqa == [0x02, 0x00]
    }

    /// NTAG and Ultralight tags
    pub fn is_ntag(&self) -> bool {
        self.atqa == [0x44, 0x00]
    }

    pub fn family(&self) -> &'static str {
        if self.is_mifare_classic_1k() {
            "mifare-classic-1k"
        } else if self.is_mifare_classic_4k() {
            "mifare-classic-4k"
        } else if self.is_ntag() {
            "ntag"
        } else {
            "unknown"
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ATQA {:02X}{:02X}", self.atqa[1], self.atqa[0])
    }
}

/// Tag UID (4, 7, or 10 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uid(heapless::Vec<u8, 10>);

impl Uid {
    /// Returns `None` unless `bytes` has a valid ISO14443A UID length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if !matches!(bytes.len(), 4 | 7 | 10) {
            return None;
        }
        heapless::Vec::from_slice(bytes).ok().map(Uid)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

/// MIFARE authentication key type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MifareKeyType {
    KeyA,
    KeyB,
}

impl MifareKeyType {
    pub fn auth_command(self) -> u8 {
        match self {
            MifareKeyType::KeyA => 0x60,
            MifareKeyType::KeyB => 0x61,
        }
    }
}

/// Six byte Crypto-1 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MifareKey(pub [u8; 6]);

impl FromStr for MifareKey {
    type Err = String;

    /// Accepts `FFFFFFFFFFFF` as well as `FF:FF:FF:FF:FF:FF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| !matches!(c, ':' | '-' | ' ')).collect();
        if digits.len() != 12 {
            return Err(format!("expected 6 hex bytes, got {s:?}"));
        }
        let mut key = [0u8; 6];
        for (i, byte) in key.iter_mut().enumerate() {
            let pair = digits.get(i * 2..i * 2 + 2).ok_or_else(|| format!("bad key {s:?}"))?;
            *byte = u8::from_str_radix(pair, 16).map_err(|e| format!("bad key {s:?}: {e}"))?;
        }
        Ok(MifareKey(key))
    }
}

/// One data block on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockAddress {
    pub sector: u8,
    pub block: u8,
}

impl BlockAddress {
    pub const fn new(sector: u8, block: u8) -> Self {
        Self { sector, block }
    }

    /// Absolute block number in the 1K memory map.
    pub fn absolute(&self) -> u8 {
        self.sector * BLOCKS_PER_SECTOR + self.block
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sector {} block {}", self.sector, self.block)
    }
}

/// The addresses visited by one scan, sector major.
#[derive(Debug, Clone, Copy)]
pub struct ScanPlan {
    first_sector: u8,
    sectors: u8,
    blocks: u8,
}

impl ScanPlan {
    /// Data blocks of sectors 1-15.
    pub const fn mifare_1k() -> Self {
        Self {
            first_sector: FIRST_DATA_SECTOR,
            sectors: SECTORS,
            blocks: DATA_BLOCKS_PER_SECTOR,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockAddress> + use<> {
        let blocks = self.blocks;
        (self.first_sector..self.sectors)
            .flat_map(move |sector| (0..blocks).map(move |block| BlockAddress::new(sector, block)))
    }

    pub fn len(&self) -> usize {
        usize::from(self.sectors.saturating_sub(self.first_sector)) * usize::from(self.blocks)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The address whose read closes a scan.
    pub fn last(&self) -> Option<BlockAddress> {
        if self.is_empty() {
            return None;
        }
        Some(BlockAddress::new(self.sectors - 1, self.blocks - 1))
    }
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self::mifare_1k()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_skips_sector_zero_and_trailers() {
        let plan = ScanPlan::mifare_1k();
        let addresses: Vec<_> = plan.iter().collect();

        assert_eq!(addresses.len(), 45);
        assert_eq!(plan.len(), 45);
        assert_eq!(addresses[0], BlockAddress::new(1, 0));
        assert_eq!(addresses.last().copied(), plan.last());
        assert_eq!(plan.last(), Some(BlockAddress::new(15, 2)));
        assert!(addresses.iter().all(|a| a.sector != 0 && a.block < 3));
    }

    #[test]
    fn absolute_block_numbers() {
        assert_eq!(BlockAddress::new(1, 0).absolute(), 4);
        assert_eq!(BlockAddress::new(15, 2).absolute(), 62);
    }

    #[test]
    fn uid_lengths() {
        assert!(Uid::from_slice(&[1, 2, 3]).is_none());
        assert!(Uid::from_slice(&[0; 11]).is_none());

        let uid = Uid::from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(uid.to_string(), "DEADBEEF");
        assert_eq!(uid.to_hex(), "DEADBEEF");
        assert_eq!(uid.as_bytes().len(), 4);
    }

    #[test]
    fn key_parsing() {
        assert_eq!("FFFFFFFFFFFF".parse::<MifareKey>().unwrap(), DEFAULT_KEY_A);
        assert_eq!(
            "a0:a1:a2:a3:a4:a5".parse::<MifareKey>().unwrap(),
            MifareKey([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5])
        );
        assert!("FFFF".parse::<MifareKey>().is_err());
        assert!("GGFFFFFFFFFF".parse::<MifareKey>().is_err());
    }

    #[test]
    fn tag_type_classification() {
        assert!(TagType::new([0x04, 0x00]).is_mifare_classic_1k());
        assert!(TagType::new([0x02, 0x00]).is_mifare_classic_4k());
        assert!(TagType::new([0x44, 0x00]).is_ntag());
        assert_eq!(TagType::new([0x04, 0x00]).family(), "mifare-classic-1k");
        assert_eq!(TagType::new([0x44, 0x00]).family(), "ntag");
        assert_eq!(TagType::new([0x08, 0x00]).family(), "unknown");
        assert_eq!(MifareKeyType::KeyA.auth_command(), 0x60);
        assert_eq!(RequestMode::All.command(), 0x52);
    }
}
