/// Utilities to parse shadow sets in packed binary format.
pub mod parser;

/// Utilities to encode shadow sets to packed binary format.
pub mod encoder;

// ============================================================================
// Layout of a packed shadow file:
//
//   magic   : u32, big endian
//   columns : u64, big endian
//   flags   : ceil(columns / 8) bytes, column 0 in the MSB of the first byte
const PACKED_MAGIC: u32 = 0x5053_4844;

const MAGIC_LEN: usize = std::mem::size_of::<u32>();
const COLUMNS_LEN: usize = std::mem::size_of::<u64>();
// ============================================================================
