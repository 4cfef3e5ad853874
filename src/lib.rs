use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Error};
use clap::ValueEnum;
use column_shadows::{
    ColumnShadowSet, PackedEncoder, PackedParser, ShadowError, ShadowRecord, TextEncoder,
    TextParser, generic::ShadowParser,
};

pub use column_shadows;

/// The persistence formats a shadow file can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Line-oriented text: magic number, shaded count, one index per line.
    Text,
    /// Binary header followed by the raw packed bitmap.
    Packed,
}

impl Format {
    fn parse<R: BufRead>(self, input: R) -> Result<ShadowRecord, ShadowError> {
        match self {
            Format::Text => TextParser::new().parse(input),
            Format::Packed => PackedParser::new().parse(input),
        }
    }

    fn save<W: Write>(self, shadows: &ColumnShadowSet, output: W) -> Result<(), ShadowError> {
        match self {
            Format::Text => shadows.save(&mut TextEncoder::new(), output),
            Format::Packed => shadows.save(&mut PackedEncoder::new(), output),
        }
    }
}

fn reader<P: AsRef<Path>>(path: P) -> Result<BufReader<File>, Error> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Could not open {}", path.display()))?;

    Ok(BufReader::new(file))
}

/// Parses the shadow file at `path` without materializing a shadow set.
pub fn parse_file<P: AsRef<Path>>(path: P, format: Format) -> Result<ShadowRecord, Error> {
    let path = path.as_ref();
    let record = format
        .parse(reader(path)?)
        .with_context(|| format!("Could not read shadow file {}", path.display()))?;

    log::debug!(
        "Parsed {} shaded columns from {}",
        record.shaded().len(),
        path.display()
    );

    Ok(record)
}

/// Opens the shadow file at `path` as a [`ColumnShadowSet`].
///
/// The set gets `columns` columns if given. Otherwise the column count stored
/// in the file is used, or, for formats without one, one past the highest
/// shaded index.
pub fn open<P: AsRef<Path>>(
    path: P,
    format: Format,
    columns: Option<usize>,
) -> Result<ColumnShadowSet, Error> {
    let shadows = parse_file(path, format)?.into_shadows(columns)?;

    log::info!(
        "Opened shadow set with {} of {} columns shaded",
        shadows.count_shaded(),
        shadows.columns()
    );

    Ok(shadows)
}

/// Writes `shadows` to `path`, replacing any existing file.
pub fn save<P: AsRef<Path>>(
    shadows: &ColumnShadowSet,
    path: P,
    format: Format,
) -> Result<(), Error> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(
        OpenOptions::new()
            .truncate(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("Could not create {}", path.display()))?,
    );

    format
        .save(shadows, &mut writer)
        .with_context(|| format!("Could not write shadow file {}", path.display()))?;
    writer.flush()?;

    log::info!("Saved {:?} shadow file {}", format, path.display());

    Ok(())
}

/// Loads every file of `inputs` in order into one shadow set.
///
/// The result holds the union of all shaded columns. Without an explicit
/// `columns` count the set is sized to fit the widest input.
pub fn merge<P: AsRef<Path>>(
    inputs: &[P],
    format: Format,
    columns: Option<usize>,
) -> Result<ColumnShadowSet, Error> {
    let records = inputs
        .iter()
        .map(|input| parse_file(input, format))
        .collect::<Result<Vec<_>, Error>>()?;

    let columns = match columns {
        Some(columns) => columns,
        None => records
            .iter()
            .map(ShadowRecord::checked_required_columns)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ShadowError::from)?
            .into_iter()
            .max()
            .unwrap_or(0),
    };

    let mut shadows = ColumnShadowSet::new(columns)?;
    for record in &records {
        shadows.apply(record);
    }

    log::info!(
        "Merged {} shadow files into {} shaded of {} columns",
        records.len(),
        shadows.count_shaded(),
        shadows.columns()
    );

    Ok(shadows)
}

/// Converts the shadow file `input` from format `from` into `output` in
/// format `to`.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    from: Format,
    output: Q,
    to: Format,
    columns: Option<usize>,
) -> Result<ColumnShadowSet, Error> {
    let shadows = open(input, from, columns)?;
    save(&shadows, output, to)?;

    Ok(shadows)
}
