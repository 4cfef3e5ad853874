use std::io::{BufRead, Write};

use colshade_error::{FormatError, ShadowError};
use serde::{Deserialize, Serialize};

use crate::generic::{ShadowEncoder, ShadowParser};

const BITS_PER_BYTE: usize = 8;

/// Largest column count derived from the indices of a record that carries no
/// column count of its own. Wider sets need an explicit count.
pub const MAX_DERIVED_COLUMNS: usize = 1 << 24;

/// Number of bytes needed to hold `columns` packed flags.
pub(crate) fn byte_len(columns: usize) -> usize {
    columns.div_ceil(BITS_PER_BYTE)
}

/// Flags are stored MSB-first: column 0 is the highest bit of byte 0.
fn locate(index: usize) -> (usize, u8) {
    (index / BITS_PER_BYTE, 0x80 >> (index % BITS_PER_BYTE))
}

/// Mask selecting the bits of the last byte that belong to valid columns.
fn tail_mask(columns: usize) -> u8 {
    match columns % BITS_PER_BYTE {
        0 => 0xFF,
        used => !(0xFF >> used),
    }
}

fn allocate(columns: usize) -> Result<Vec<u8>, ShadowError> {
    let len = byte_len(columns);
    let mut bits = Vec::new();
    bits.try_reserve_exact(len).map_err(|source| ShadowError::Allocation { columns, source })?;
    bits.resize(len, 0);

    log::trace!("Allocated {len} bytes for {columns} shadow columns");

    Ok(bits)
}

/// A per-column "shaded" flag set backed by packed byte storage.
///
/// Every column index in `[0, columns)` maps to exactly one bit. Indices at or
/// beyond the column count are never read: queries return `false` and
/// mutations are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShadowSet {
    columns: usize,
    bits: Vec<u8>,
}

impl ColumnShadowSet {
    /// Creates a shadow set for `columns` columns with every flag cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::Allocation`] if the backing storage could not
    /// be reserved.
    pub fn new(columns: usize) -> Result<Self, ShadowError> {
        Ok(Self {
            columns,
            bits: allocate(columns)?,
        })
    }

    /// Builds a shadow set from raw MSB-first bytes.
    ///
    /// Missing trailing bytes are treated as zero, surplus bytes and bits past
    /// `columns` are dropped.
    pub fn from_packed(columns: usize, bytes: &[u8]) -> Result<Self, ShadowError> {
        let mut shadows = Self::new(columns)?;
        let len = shadows.bits.len().min(bytes.len());
        shadows.bits[..len].copy_from_slice(&bytes[..len]);
        shadows.mask_tail();

        Ok(shadows)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0
    }

    /// Size of the backing store in bytes.
    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    /// The packed backing store, MSB-first within each byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Returns whether column `index` is shaded.
    ///
    /// Out-of-range indices are reported as unshaded.
    pub fn get_shade_flag(&self, index: usize) -> bool {
        if index >= self.columns {
            return false;
        }

        let (byte, mask) = locate(index);
        self.bits[byte] & mask != 0
    }

    /// Shades or unshades column `index`.
    ///
    /// Indices at or beyond the current column count are silently ignored.
    pub fn shade_column(&mut self, index: usize, should_shade: bool) {
        if index >= self.columns {
            return;
        }

        let (byte, mask) = locate(index);
        if should_shade {
            self.bits[byte] |= mask;
        } else {
            self.bits[byte] &= !mask;
        }
    }

    /// Changes the number of tracked columns.
    ///
    /// Flags below `min(old, new)` are kept, all other columns start out
    /// unshaded. If the new storage cannot be allocated the set is left
    /// untouched.
    pub fn resize(&mut self, new_columns: usize) -> Result<(), ShadowError> {
        let mut bits = allocate(new_columns)?;

        let kept = self.columns.min(new_columns);
        let kept_bytes = byte_len(kept);
        bits[..kept_bytes].copy_from_slice(&self.bits[..kept_bytes]);
        if let Some(last) = bits[..kept_bytes].last_mut() {
            *last &= tail_mask(kept);
        }

        log::debug!("Resized shadow set from {} to {new_columns} columns", self.columns);

        self.bits = bits;
        self.columns = new_columns;

        Ok(())
    }

    /// Unshades every column.
    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// Counts the shaded columns in `[0, columns)`.
    pub fn count_shaded(&self) -> usize {
        let Some((last, full)) = self.bits.split_last() else {
            return 0;
        };

        let full: usize = full.iter().map(|byte| byte.count_ones() as usize).sum();
        full + (last & tail_mask(self.columns)).count_ones() as usize
    }

    /// Iterates over the shaded column indices in ascending order.
    pub fn iter_shaded(&self) -> ShadedColumns<'_> {
        ShadedColumns {
            bits: &self.bits,
            columns: self.columns,
            byte_index: 0,
            current: self.bits.first().copied().unwrap_or(0),
        }
    }

    /// Shades every column that is shaded in `other`.
    ///
    /// Columns of `other` beyond this set's column count are ignored.
    pub fn merge(&mut self, other: &ColumnShadowSet) {
        let columns = self.columns;
        for index in other.iter_shaded().take_while(|&index| index < columns) {
            self.shade_column(index, true);
        }
    }

    /// Writes the shaded columns to `output` using `encoder`.
    pub fn save<E: ShadowEncoder, W: Write>(
        &self,
        encoder: &mut E,
        output: W,
    ) -> Result<(), ShadowError> {
        encoder.encode(self, output)?;

        log::debug!(
            "Saved {} shaded of {} columns in {} format",
            self.count_shaded(),
            self.columns,
            encoder.format()
        );

        Ok(())
    }

    /// Reads a persisted shadow set from `input` and shades every column it
    /// lists.
    ///
    /// Existing flags are kept, so loading several inputs in sequence yields
    /// the union of their shaded columns. The input is validated completely
    /// before any flag changes: on error the set is left as it was.
    pub fn load<P: ShadowParser, R: BufRead>(
        &mut self,
        parser: &mut P,
        input: R,
    ) -> Result<(), ShadowError> {
        let record = match parser.parse(input) {
            Ok(record) => record,
            Err(e) => {
                if let ShadowError::Format(cause) = &e {
                    log::warn!("Rejected {} shadow data: {cause}", parser.format());
                }
                return Err(e);
            }
        };

        self.apply(&record);

        Ok(())
    }

    /// Shades every column listed in `record`.
    pub fn apply(&mut self, record: &ShadowRecord) {
        let mut ignored = 0_usize;
        for &index in record.shaded() {
            if index >= self.columns {
                ignored += 1;
            }
            self.shade_column(index, true);
        }

        if ignored > 0 {
            log::debug!(
                "Ignored {ignored} shaded indices beyond column count {}",
                self.columns
            );
        }
    }

    /// Takes a serializable snapshot of this set.
    pub fn summary(&self) -> ShadowSummary {
        ShadowSummary {
            columns: self.columns,
            shaded_count: self.count_shaded(),
            shaded: self.iter_shaded().collect(),
        }
    }

    fn mask_tail(&mut self) {
        let mask = tail_mask(self.columns);
        if let Some(last) = self.bits.last_mut() {
            *last &= mask;
        }
    }
}

/// Iterator over the shaded columns of a [`ColumnShadowSet`].
pub struct ShadedColumns<'a> {
    bits: &'a [u8],
    columns: usize,
    byte_index: usize,
    current: u8,
}

impl Iterator for ShadedColumns<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current == 0 {
                self.byte_index += 1;
                self.current = *self.bits.get(self.byte_index)?;
                continue;
            }

            let bit = self.current.leading_zeros() as usize;
            self.current &= !(0x80 >> bit);

            let index = self.byte_index * BITS_PER_BYTE + bit;
            return (index < self.columns).then_some(index);
        }
    }
}

/// The format-independent content of a persisted shadow set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShadowRecord {
    columns: Option<usize>,
    shaded: Vec<usize>,
}

impl ShadowRecord {
    pub fn new(columns: Option<usize>, shaded: Vec<usize>) -> Self {
        Self { columns, shaded }
    }

    /// The column count stored alongside the flags, if the format carries one.
    pub fn columns(&self) -> Option<usize> {
        self.columns
    }

    /// Shaded column indices in stream order.
    pub fn shaded(&self) -> &[usize] {
        &self.shaded
    }

    /// The column count needed to hold every index of this record.
    pub fn required_columns(&self) -> usize {
        self.columns.unwrap_or_else(|| {
            self.shaded
                .iter()
                .max()
                .map_or(0, |&index| index.saturating_add(1))
        })
    }

    /// Like [`ShadowRecord::required_columns`], but rejects counts derived
    /// from the indices alone that exceed [`MAX_DERIVED_COLUMNS`].
    pub fn checked_required_columns(&self) -> Result<usize, FormatError> {
        let required = self.required_columns();
        if self.columns.is_none() && required > MAX_DERIVED_COLUMNS {
            return Err(FormatError::ColumnLimit {
                required: required as u64,
                limit: MAX_DERIVED_COLUMNS as u64,
            });
        }

        Ok(required)
    }

    /// Materializes the record into a fresh shadow set with `columns`
    /// columns, or [`ShadowRecord::checked_required_columns`] if none are given.
    pub fn into_shadows(self, columns: Option<usize>) -> Result<ColumnShadowSet, ShadowError> {
        let columns = match columns {
            Some(columns) => columns,
            None => self.checked_required_columns()?,
        };
        let mut shadows = ColumnShadowSet::new(columns)?;
        shadows.apply(&self);

        Ok(shadows)
    }
}

/// A serializable snapshot of a [`ColumnShadowSet`].
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct ShadowSummary {
    pub columns: usize,
    pub shaded_count: usize,
    pub shaded: Vec<usize>,
}

impl ShadowSummary {
    pub fn to_json(&self) -> Result<String, anyhow::Error> {
        serde_json::to_string_pretty(self).map_err(anyhow::Error::from)
    }
}

/// Converts a column count read from a stream into `usize`.
pub(crate) fn checked_columns(columns: u64) -> Result<usize, FormatError> {
    usize::try_from(columns).map_err(|_| FormatError::ColumnOverflow(columns))
}
