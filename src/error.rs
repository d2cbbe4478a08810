use thiserror::Error;

/// Field-specific codes carried by fatal row-level parse failures in the
/// bank layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorCode {
    InvalidDate,
    InvalidAmount,
}

impl ParseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDate => "INVALID_DATE",
            Self::InvalidAmount => "INVALID_AMOUNT",
        }
    }
}

impl std::fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    /// Fatal parse failure in a bank layout. `row` is the 1-based row number
    /// in the source file, so the user can locate the offending cell.
    #[error("{layout} row {row}: {code}")]
    Parse {
        layout: &'static str,
        row: usize,
        code: ParseErrorCode,
    },

    #[error("File does not match the {0} layout")]
    LayoutMismatch(&'static str),

    #[error("The {layout} layout does not accept .{extension} files")]
    UnsupportedFormat {
        layout: &'static str,
        extension: String,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
