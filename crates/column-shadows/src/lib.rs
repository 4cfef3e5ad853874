use std::io::{BufRead, Write};

use crate::generic::{ShadowEncoder, ShadowParser};

/// Generic traits for parsing and encoding of persisted shadow sets
pub mod generic;
mod packed;
mod shadows;
mod text_format;

pub use colshade_error::{FormatError, ShadowError, exit_code, exit_code_description};
pub use packed::{encoder::PackedEncoder, parser::PackedParser};
pub use shadows::{
    ColumnShadowSet, MAX_DERIVED_COLUMNS, ShadedColumns, ShadowRecord, ShadowSummary,
};
pub use text_format::{SHADOW_TEXT_MAGIC, TextEncoder, TextParser};

/// Converts a persisted shadow set from one format into another.
///
/// The column count of the converted set is `columns` if given, otherwise the
/// count stored in the input, otherwise one past the highest shaded index.
/// Returns the converted set.
pub fn convert<P: ShadowParser, E: ShadowEncoder, I: BufRead, O: Write>(
    parser: &mut P,
    encoder: &mut E,
    input: I,
    mut output: O,
    columns: Option<usize>,
) -> Result<ColumnShadowSet, ShadowError> {
    let shadows = parser.parse(input)?.into_shadows(columns)?;

    log::info!(
        "Converting {} shaded of {} columns from {} to {}",
        shadows.count_shaded(),
        shadows.columns(),
        parser.format(),
        encoder.format()
    );

    shadows.save(encoder, &mut output)?;
    output.flush()?;

    Ok(shadows)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use anyhow::Error;

    use crate::{PackedEncoder, PackedParser, TextEncoder, TextParser};

    #[test]
    fn convert_text_to_packed_and_back() -> Result<(), Error> {
        let text = "1397245015\n3\n2\n9\n17\n";

        let mut packed = Vec::new();
        let shadows = super::convert(
            &mut TextParser::new(),
            &mut PackedEncoder::new(),
            text.as_bytes(),
            &mut packed,
            None,
        )?;
        assert_eq!(shadows.columns(), 18);

        let mut round_trip = Vec::new();
        let restored = super::convert(
            &mut PackedParser::new(),
            &mut TextEncoder::new(),
            Cursor::new(packed),
            &mut round_trip,
            None,
        )?;

        assert_eq!(restored, shadows);
        assert_eq!(String::from_utf8(round_trip)?, text);

        Ok(())
    }

    #[test]
    fn convert_with_explicit_column_count() -> Result<(), Error> {
        let text = "1397245015\n2\n1\n40\n";

        let mut output = Vec::new();
        let shadows = super::convert(
            &mut TextParser::new(),
            &mut TextEncoder::new(),
            text.as_bytes(),
            &mut output,
            Some(10),
        )?;

        assert_eq!(shadows.columns(), 10);
        assert_eq!(String::from_utf8(output)?, "1397245015\n1\n1\n");

        Ok(())
    }

    #[test]
    fn fail_on_malformed_input() {
        let mut output = Vec::new();
        super::convert(
            &mut TextParser::new(),
            &mut PackedEncoder::new(),
            "42\n0\n".as_bytes(),
            &mut output,
            None,
        )
        .unwrap_err();

        assert!(output.is_empty());
    }
}
