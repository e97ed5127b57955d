//! Scripted MIFARE Classic tag for the simulator.

use std::collections::{HashMap, HashSet};

use tagdisplay_firmware::ReaderError;
use tagdisplay_firmware::nfc::{
    BLOCK_SIZE, BlockAddress, DEFAULT_KEY_A, MifareKey, MifareKeyType, RequestMode, ScanPlan,
    TagReader, TagType, Uid,
};
use tracing::{debug, trace};

/// A 1K tag that enters the field after a number of polls.
///
/// Releasing the crypto session takes the tag away again; it comes back after
/// the same number of polls.
pub struct SimulatedReader {
    uid: Uid,
    tag_key: MifareKey,
    blocks: HashMap<BlockAddress, Vec<u8>>,
    arrives_after: u64,
    requests: u64,
    /// Blocks that fail on their next read only
    flaky: HashSet<BlockAddress>,
    crypto_active: bool,
}

impl SimulatedReader {
    /// Lay `text` out over the data blocks as Latin-1, zero padded.
    pub fn with_text(uid: Uid, text: &str, arrives_after: u64) -> Self {
        let bytes: Vec<u8> = text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        let blocks = ScanPlan::mifare_1k()
            .iter()
            .enumerate()
            .map(|(i, address)| {
                let mut block = vec![0u8; BLOCK_SIZE];
                let start = (i * BLOCK_SIZE).min(bytes.len());
                let end = (start + BLOCK_SIZE).min(bytes.len());
                block[..end - start].copy_from_slice(&bytes[start..end]);
                (address, block)
            })
            .collect();

        Self {
            uid,
            tag_key: DEFAULT_KEY_A,
            blocks,
            arrives_after,
            requests: 0,
            flaky: HashSet::new(),
            crypto_active: false,
        }
    }

    pub fn with_flaky(mut self, addresses: impl IntoIterator<Item = BlockAddress>) -> Self {
        self.flaky.extend(addresses);
        self
    }
}

impl TagReader for SimulatedReader {
    fn request(&mut self, mode: RequestMode) -> Result<TagType, ReaderError> {
        self.requests += 1;
        trace!(command = mode.command(), request = self.requests, "REQ");
        if self.requests <= self.arrives_after {
            return Err(ReaderError::NoTag);
        }
        Ok(TagType::new([0x04, 0x00]))
    }

    fn select_tag(&mut self) -> Result<Uid, ReaderError> {
        Ok(self.uid.clone())
    }

    fn read_block(
        &mut self,
        uid: &Uid,
        address: BlockAddress,
        key: &MifareKey,
    ) -> Result<Option<Vec<u8>>, ReaderError> {
        if uid != &self.uid {
            return Err(ReaderError::Protocol);
        }
        if key != &self.tag_key {
            return Err(ReaderError::Authentication(MifareKeyType::KeyA));
        }
        self.crypto_active = true;

        if self.flaky.remove(&address) {
            debug!(%address, block = address.absolute(), "simulated read glitch");
            return Err(ReaderError::Transport("CRC mismatch".into()));
        }
        Ok(self.blocks.get(&address).cloned())
    }

    fn release_crypto(&mut self) {
        trace!(was_active = self.crypto_active, "crypto released");
        self.crypto_active = false;
        self.requests = 0;
    }
}
