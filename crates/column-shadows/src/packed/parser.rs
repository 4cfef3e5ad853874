use std::io::{BufRead, Read};

use colshade_error::{FormatError, ShadowError};

use crate::{
    generic::ShadowParser,
    packed::{COLUMNS_LEN, MAGIC_LEN, PACKED_MAGIC},
    shadows::{self, ColumnShadowSet, ShadowRecord},
};

/// A parser for shadow sets in packed binary format.
pub struct PackedParser;

impl PackedParser {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for PackedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowParser for PackedParser {
    fn parse<R: BufRead>(&mut self, mut input: R) -> Result<ShadowRecord, ShadowError> {
        // Parse header info
        let header = read_section(&mut input, MAGIC_LEN + COLUMNS_LEN, "header bytes")?;
        let mut magic = [0; MAGIC_LEN];
        magic.copy_from_slice(&header[..MAGIC_LEN]);
        let mut columns = [0; COLUMNS_LEN];
        columns.copy_from_slice(&header[MAGIC_LEN..]);

        let magic = u32::from_be_bytes(magic);
        if magic != PACKED_MAGIC {
            return Err(FormatError::BadMagic {
                expected: u64::from(PACKED_MAGIC),
                found: u64::from(magic),
            }
            .into());
        }

        let columns = shadows::checked_columns(u64::from_be_bytes(columns))?;

        // Parse the flag bitmap into a scratch set so stray bits are masked
        let bytes = read_section(&mut input, shadows::byte_len(columns), "flag bytes")?;
        let scratch = ColumnShadowSet::from_packed(columns, &bytes)?;

        Ok(ShadowRecord::new(Some(columns), scratch.iter_shaded().collect()))
    }

    fn format(&self) -> &'static str {
        "Packed"
    }
}

/// Reads exactly `len` bytes, reporting a short stream as truncated data.
fn read_section<R: Read>(
    input: &mut R,
    len: usize,
    what: &'static str,
) -> Result<Vec<u8>, ShadowError> {
    let mut bytes = Vec::new();
    let found = input.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if found < len {
        return Err(FormatError::Truncated {
            what,
            expected: len as u64,
            found: found as u64,
        }
        .into());
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, Cursor};

    use anyhow::Error;
    use colshade_error::{FormatError, ShadowError};

    use super::PackedParser;
    use crate::{
        generic::ShadowParser,
        shadows::{ColumnShadowSet, ShadowRecord},
    };

    fn packed(magic: u32, columns: u64, flags: &[u8]) -> Vec<u8> {
        let mut file = Vec::new();
        file.extend(magic.to_be_bytes());
        file.extend(columns.to_be_bytes());
        file.extend(flags);
        file
    }

    fn format_error(result: Result<ShadowRecord, ShadowError>) -> FormatError {
        match result.unwrap_err() {
            ShadowError::Format(e) => e,
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn parse_valid_set() -> Result<(), Error> {
        let input = packed(0x5053_4844, 12, &[0b1010_0100, 0b1001_0000]);

        let record = PackedParser::new().parse(input.as_slice())?;

        assert_eq!(record, ShadowRecord::new(Some(12), vec![0, 2, 5, 8, 11]));

        Ok(())
    }

    #[test]
    fn parse_ignores_stray_bits() -> Result<(), Error> {
        let input = packed(0x5053_4844, 10, &[0x00, 0b0111_1111]);

        let record = PackedParser::new().parse(input.as_slice())?;

        assert_eq!(record.shaded(), &[9]);

        Ok(())
    }

    #[test]
    fn parse_leaves_trailing_bytes_unread() -> Result<(), Error> {
        let mut input = Cursor::new(packed(0x5053_4844, 8, &[0xFF, b'\n', b'x']));
        let record = PackedParser::new().parse(&mut input)?;
        assert_eq!(record.shaded().len(), 8);

        let mut rest = Vec::new();
        input.read_until(b'x', &mut rest)?;
        assert_eq!(rest, b"\nx");

        Ok(())
    }

    #[test]
    fn load_merges_and_ignores_wider_sets() -> Result<(), Error> {
        let mut shadows = ColumnShadowSet::new(6)?;
        shadows.shade_column(1, true);

        let input = packed(0x5053_4844, 16, &[0b0000_1100, 0b1000_0000]);
        shadows.load(&mut PackedParser::new(), input.as_slice())?;

        assert_eq!(shadows.iter_shaded().collect::<Vec<_>>(), vec![1, 4, 5]);

        Ok(())
    }

    #[test]
    fn fail_on_wrong_magic() -> Result<(), Error> {
        let mut shadows = ColumnShadowSet::new(8)?;
        shadows.shade_column(0, true);
        let before = shadows.clone();

        let input = packed(0x1234_5678, 8, &[0xFF]);
        let error = shadows
            .load(&mut PackedParser::new(), input.as_slice())
            .unwrap_err();

        assert!(matches!(
            error,
            ShadowError::Format(FormatError::BadMagic {
                found: 0x1234_5678,
                ..
            })
        ));
        assert_eq!(shadows, before);

        Ok(())
    }

    #[test]
    fn fail_on_truncated_header() {
        let input = packed(0x5053_4844, 8, &[]);

        let error = format_error(PackedParser::new().parse(&input[..7]));

        assert!(matches!(error, FormatError::Truncated { what: "header bytes", .. }));
    }

    #[test]
    fn fail_on_truncated_flags() {
        let input = packed(0x5053_4844, 20, &[0xFF, 0xFF]);

        let error = format_error(PackedParser::new().parse(input.as_slice()));

        assert_eq!(
            error,
            FormatError::Truncated {
                what: "flag bytes",
                expected: 3,
                found: 2
            }
        );
    }
}
