use std::{
    collections::VecDeque,
    io::{BufRead, Write},
};

use colshade_error::{FormatError, ShadowError};

use crate::{
    generic::{ShadowEncoder, ShadowParser},
    shadows::{ColumnShadowSet, ShadowRecord},
};

/// Identifies the line-oriented shadow format ("SHDW").
pub const SHADOW_TEXT_MAGIC: u64 = 0x5348_4457;

// Upper bound for pre-allocating the index list from an untrusted count.
const MAX_PREALLOCATED_INDICES: usize = 4096;

/// An encoder to emit shadow sets in the line-oriented text format
///
/// The output consists of the magic number, the number of shaded columns and
/// one line per shaded column index in ascending order.
pub struct TextEncoder;

impl TextEncoder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for TextEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowEncoder for TextEncoder {
    fn encode<W: Write>(
        &mut self,
        shadows: &ColumnShadowSet,
        mut output: W,
    ) -> Result<(), ShadowError> {
        writeln!(output, "{SHADOW_TEXT_MAGIC}")?;
        writeln!(output, "{}", shadows.count_shaded())?;
        for index in shadows.iter_shaded() {
            writeln!(output, "{index}")?;
        }

        Ok(())
    }

    fn format(&self) -> &'static str {
        "Text"
    }
}

/// A parser for shadow sets in the line-oriented text format
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowParser for TextParser {
    fn parse<R: BufRead>(&mut self, input: R) -> Result<ShadowRecord, ShadowError> {
        let mut tokens = Tokens::new(input);

        let magic = tokens.expect("header fields", 2, 0)?;
        let magic = magic
            .parse::<u64>()
            .map_err(|_| invalid("magic number", &magic))?;
        if magic != SHADOW_TEXT_MAGIC {
            return Err(FormatError::BadMagic {
                expected: SHADOW_TEXT_MAGIC,
                found: magic,
            }
            .into());
        }

        let count = tokens.expect("header fields", 2, 1)?;
        let count = count
            .parse::<i64>()
            .map_err(|_| invalid("shaded column count", &count))?;
        let count = u64::try_from(count).map_err(|_| FormatError::NegativeCount(count))?;

        let capacity = usize::try_from(count).map_or(MAX_PREALLOCATED_INDICES, |count| {
            count.min(MAX_PREALLOCATED_INDICES)
        });
        let mut shaded = Vec::with_capacity(capacity);
        for found in 0..count {
            let index = tokens.expect("column indices", count, found)?;
            shaded.push(
                index
                    .parse::<usize>()
                    .map_err(|_| invalid("column index", &index))?,
            );
        }

        Ok(ShadowRecord::new(None, shaded))
    }

    fn format(&self) -> &'static str {
        "Text"
    }
}

fn invalid(what: &'static str, token: &str) -> FormatError {
    FormatError::InvalidToken {
        what,
        token: token.into(),
    }
}

/// Splits a buffered stream into whitespace-separated tokens, reading one
/// line at a time. Nothing past the last needed line is consumed, but unused
/// tokens on that line are discarded.
struct Tokens<R: BufRead> {
    input: R,
    line: Vec<u8>,
    pending: VecDeque<String>,
}

impl<R: BufRead> Tokens<R> {
    fn new(input: R) -> Self {
        Self {
            input,
            line: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    fn next_token(&mut self) -> Result<Option<String>, ShadowError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(Some(token));
            }

            self.line.clear();
            if self.input.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            let line = std::str::from_utf8(&self.line).map_err(|_| FormatError::NotUtf8)?;
            self.pending.extend(line.split_whitespace().map(String::from));
        }
    }

    fn expect(
        &mut self,
        what: &'static str,
        expected: u64,
        found: u64,
    ) -> Result<String, ShadowError> {
        self.next_token()?.ok_or_else(|| {
            FormatError::Truncated {
                what,
                expected,
                found,
            }
            .into()
        })
    }
}
