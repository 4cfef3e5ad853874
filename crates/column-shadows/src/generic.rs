use std::io::{BufRead, Write};

use colshade_error::ShadowError;

use crate::shadows::{ColumnShadowSet, ShadowRecord};

/// Common trait for parsers of persisted shadow sets
pub trait ShadowParser {
    /// Parses and validates a complete shadow set from `input`.
    ///
    /// Implementations must not read past the unit (line or byte) that ends
    /// the shadow set. Line-oriented formats may consume the remainder of
    /// their last line.
    fn parse<R: BufRead>(&mut self, input: R) -> Result<ShadowRecord, ShadowError>;

    /// Returns a string identifying the persistence format of this parser.
    fn format(&self) -> &'static str;
}

/// Common trait for encoders of shadow sets
pub trait ShadowEncoder {
    /// Writes `shadows` to `output` in some specific format.
    fn encode<W: Write>(&mut self, shadows: &ColumnShadowSet, output: W)
    -> Result<(), ShadowError>;

    /// Returns a string identifying the persistence format of this encoder.
    fn format(&self) -> &'static str;
}
