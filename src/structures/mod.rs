mod bitvector;
mod codec;
mod elias_fano;
pub mod simd;

pub use bitvector::{BitVector, BitVectorBuilder};
pub use codec::{BlockCodec, read_vint, write_vint};
pub use elias_fano::{EndpointTable, encode_endpoints};
