use std::io::Write;

use colshade_error::ShadowError;

use crate::{
    generic::ShadowEncoder,
    packed::{COLUMNS_LEN, MAGIC_LEN, PACKED_MAGIC},
    shadows::ColumnShadowSet,
};

/// An encoder to emit shadow sets in packed binary format
///
/// The flag bytes are written exactly as they are laid out in memory, which
/// keeps files compatible with tools reading the raw MSB-first bitmap.
pub struct PackedEncoder;

impl PackedEncoder {
    const HEADER_LEN: usize = MAGIC_LEN + COLUMNS_LEN;

    pub fn new() -> Self {
        Self {}
    }

    fn encode_header(&self, columns: usize) -> [u8; Self::HEADER_LEN] {
        let mut header = [0u8; Self::HEADER_LEN];
        header[..MAGIC_LEN].copy_from_slice(&PACKED_MAGIC.to_be_bytes());
        header[MAGIC_LEN..].copy_from_slice(&(columns as u64).to_be_bytes());
        header
    }
}

impl Default for PackedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowEncoder for PackedEncoder {
    fn encode<W: Write>(
        &mut self,
        shadows: &ColumnShadowSet,
        mut output: W,
    ) -> Result<(), ShadowError> {
        output.write_all(&self.encode_header(shadows.columns()))?;
        output.write_all(shadows.as_bytes())?;

        Ok(())
    }

    fn format(&self) -> &'static str {
        "Packed"
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use anyhow::Error;
    use colshade_error::ShadowError;

    use super::PackedEncoder;
    use crate::shadows::ColumnShadowSet;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn encode_valid_set() -> Result<(), Error> {
        let mut shadows = ColumnShadowSet::new(12)?;
        for index in [0, 2, 5, 8, 11] {
            shadows.shade_column(index, true);
        }

        let mut buffer = Vec::new();
        shadows.save(&mut PackedEncoder::new(), &mut buffer)?;

        let mut expected = Vec::new();
        expected.extend(0x5053_4844_u32.to_be_bytes());
        expected.extend(12_u64.to_be_bytes());
        expected.extend([0b1010_0100, 0b1001_0000]);

        assert_eq!(buffer, expected);

        Ok(())
    }

    #[test]
    fn encode_empty_set() -> Result<(), Error> {
        let mut buffer = Vec::new();
        ColumnShadowSet::new(0)?.save(&mut PackedEncoder::new(), &mut buffer)?;

        assert_eq!(buffer.len(), 12);
        assert_eq!(&buffer[4..], &0_u64.to_be_bytes());

        Ok(())
    }

    #[test]
    fn fail_on_write_error() -> Result<(), Error> {
        let shadows = ColumnShadowSet::new(8)?;

        let error = shadows
            .save(&mut PackedEncoder::new(), BrokenPipe)
            .unwrap_err();

        assert!(matches!(error, ShadowError::Io(_)));

        Ok(())
    }
}
