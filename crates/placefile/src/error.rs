use std::path::PathBuf;

use thiserror::Error;

pub type PlacefileResult<T> = Result<T, PlacefileError>;

#[derive(Debug, Error)]
pub enum PlacefileError {
    #[error("Placefile parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Failed to write placefile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
