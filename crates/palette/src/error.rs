//! Color table error types.

use thiserror::Error;

pub type PaletteResult<T> = Result<T, PaletteError>;

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("Unknown name '{name}' in color table '{source_name}', line {line}: {content}")]
    UnknownName {
        name: String,
        source_name: String,
        line: usize,
        content: String,
    },

    #[error("Could not parse '{value}' in color table '{source_name}', line {line} ({reason}): {content}")]
    InvalidValue {
        value: String,
        reason: String,
        source_name: String,
        line: usize,
        content: String,
    },

    #[error("Failed to read color table '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
