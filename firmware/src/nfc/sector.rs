//! Authenticated single-block reads.

use tracing::trace;

use super::{BlockAddress, MifareKey, MifareKeyType, TagReader, Uid};
use crate::error::BlockReadError;

/// Reads one block at a time with the configured key A.
///
/// Key B has a slot in the station config but is never attempted.
#[derive(Debug, Clone)]
pub struct SectorReader {
    key_a: MifareKey,
}

impl SectorReader {
    pub fn new(key_a: MifareKey) -> Self {
        Self { key_a }
    }

    pub fn key_type(&self) -> MifareKeyType {
        MifareKeyType::KeyA
    }

    /// One authenticated read. No retries.
    pub fn read<R: TagReader + ?Sized>(
        &self,
        reader: &mut R,
        uid: &Uid,
        address: BlockAddress,
    ) -> Result<Vec<u8>, BlockReadError> {
        match reader.read_block(uid, address, &self.key_a) {
            Ok(Some(data)) => {
                trace!(
                    %address,
                    auth = self.key_type().auth_command(),
                    len = data.len(),
                    "block read"
                );
                Ok(data)
            }
            Ok(None) => Err(BlockReadError::Empty(address)),
            Err(source) => Err(BlockReadError::Device { address, source }),
        }
    }
}
