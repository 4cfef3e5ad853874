use std::collections::TryReserveError;

use thiserror::Error;

/// Defines the process exit codes used by the colshade command line tool
pub mod exit_code {
    /// Command finished without error
    pub const SUCCESS: i32 = 0;

    /// I/O error: The underlying file or stream could not be read or written
    ///
    /// This is emitted if opening, reading or writing a shadow file failed
    /// on the operating system level.
    pub const IO_FAILURE: i32 = 1;

    /// Format error: The persisted data was not a valid shadow set
    ///
    /// This is emitted if the magic number did not match, the declared
    /// shaded count was negative or the stream ended prematurely.
    pub const FORMAT_FAILURE: i32 = 2;

    /// Allocation error: Backing storage for the bitset could not be obtained
    ///
    /// The shadow set that was about to be created or resized is left
    /// in its previous state.
    pub const ALLOCATION_FAILURE: i32 = 3;

    /// Any other failure, e.g. invalid command line usage or a broken
    /// logging configuration.
    pub const OTHER_FAILURE: i32 = 4;
}

/// Returns a string describing the exit code `code`
pub fn exit_code_description(code: i32) -> String {
    match code {
        0 => "No Error".into(),
        1 => "I/O Error: Shadow file could not be accessed".into(),
        2 => "Format Error: Shadow file is malformed".into(),
        3 => "Allocation Error: Not enough memory for the shadow set".into(),
        4 => "Error: Command failed".into(),
        _ => "Unknown error!".into(),
    }
}

/// Structural problems found while parsing a persisted shadow set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unexpected magic number {found:#x} (expected {expected:#x})")]
    BadMagic { expected: u64, found: u64 },

    #[error("shaded column count must not be negative, found {0}")]
    NegativeCount(i64),

    #[error("invalid {what}: `{token}`")]
    InvalidToken { what: &'static str, token: String },

    #[error("stream ended after {found} of {expected} expected {what}")]
    Truncated {
        what: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("column count {0} is not addressable on this platform")]
    ColumnOverflow(u64),

    #[error("{required} columns exceed the limit of {limit} for an implicit column count")]
    ColumnLimit { required: u64, limit: u64 },

    #[error("shadow text is not valid UTF-8")]
    NotUtf8,
}

/// Errors reported by the column shadow library.
#[derive(Debug, Error)]
pub enum ShadowError {
    #[error("could not allocate storage for {columns} columns")]
    Allocation {
        columns: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid shadow data: {0}")]
    Format(#[from] FormatError),

    #[error("shadow stream I/O failed")]
    Io(#[from] std::io::Error),
}

impl ShadowError {
    /// The process exit code that corresponds to this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ShadowError::Allocation { .. } => exit_code::ALLOCATION_FAILURE,
            ShadowError::Format(_) => exit_code::FORMAT_FAILURE,
            ShadowError::Io(_) => exit_code::IO_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FormatError, ShadowError, exit_code, exit_code_description};

    #[test]
    fn map_errors_to_exit_codes() {
        let format = ShadowError::from(FormatError::NegativeCount(-3));
        assert_eq!(format.exit_code(), exit_code::FORMAT_FAILURE);

        let io = ShadowError::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert_eq!(io.exit_code(), exit_code::IO_FAILURE);

        let allocation = ShadowError::Allocation {
            columns: usize::MAX,
            source: Vec::<u8>::new().try_reserve_exact(usize::MAX).unwrap_err(),
        };
        assert_eq!(allocation.exit_code(), exit_code::ALLOCATION_FAILURE);
    }

    #[test]
    fn describe_every_exit_code() {
        for code in 0..=4 {
            assert_ne!(exit_code_description(code), "Unknown error!");
        }
        assert_eq!(exit_code_description(42), "Unknown error!");
    }

    #[test]
    fn format_error_messages() {
        let magic = FormatError::BadMagic {
            expected: 0x10,
            found: 0x20,
        };
        assert_eq!(
            magic.to_string(),
            "unexpected magic number 0x20 (expected 0x10)"
        );

        let truncated = FormatError::Truncated {
            what: "column indices",
            expected: 3,
            found: 1,
        };
        assert_eq!(
            truncated.to_string(),
            "stream ended after 1 of 3 expected column indices"
        );

        let limit = FormatError::ColumnLimit {
            required: 100,
            limit: 10,
        };
        assert_eq!(
            limit.to_string(),
            "100 columns exceed the limit of 10 for an implicit column count"
        );
    }
}
