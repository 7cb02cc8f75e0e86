//! On-disk header layout and global codec parameters
//!
//! All fields are little-endian. The file begins with a fixed header:
//!
//! | offset | bytes             | field                                    |
//! |--------|-------------------|------------------------------------------|
//! | 0      | 8                 | freeze flags (version word)              |
//! | 8      | 8                 | global parameters                        |
//! | 16     | 8                 | size (number of posting lists)           |
//! | 24     | 8                 | num_docs                                 |
//! | 32     | 8                 | reserved                                 |
//! | 40     | 8                 | endpoint_size (words)                    |
//! | 48     | 16 + 8 * ep_size  | Elias-Fano endpoint region               |
//! | ...    | 8                 | list_blob_size                           |
//! | ...    | list_blob_size    | concatenated posting lists               |

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::structures::BlockCodec;

/// Version word written at offset 0
pub const FREEZE_FLAGS: u64 = 1;

/// Bytes preceding the endpoint region
pub const HEADER_FIXED_BYTES: usize = 48;

/// Encoding parameters shared by every list in the file
///
/// Baked in at build time; a reader decodes with exactly these parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalParameters {
    /// Maximum postings per block
    pub block_size: u32,
    /// Codec applied to docid gaps and frequencies
    pub codec: BlockCodec,
}

impl Default for GlobalParameters {
    fn default() -> Self {
        Self {
            block_size: 128,
            codec: BlockCodec::default(),
        }
    }
}

impl GlobalParameters {
    pub const SIZE: usize = 8;

    pub fn write(&self, out: &mut [u8]) {
        LittleEndian::write_u32(&mut out[0..4], self.block_size);
        out[4] = self.codec.as_u8();
        out[5..8].fill(0);
    }

    pub fn read(input: &[u8]) -> Result<Self> {
        let block_size = LittleEndian::read_u32(&input[0..4]);
        if block_size == 0 {
            return Err(Error::Corruption("block size must be nonzero".into()));
        }
        let codec = BlockCodec::from_u8(input[4])?;
        Ok(Self { block_size, codec })
    }
}
