use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuidingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuidingError {
    /// Training samples were already extracted from this path; clear() the buffer first.
    #[error("Path samples were already prepared; clear the vertex buffer before reuse")]
    AlreadyPrepared,

    /// Extraction was requested for a path that recorded no vertices.
    #[error("Cannot prepare samples from an empty path")]
    EmptyPath,

    /// A byte buffer does not hold a whole number of aligned observations.
    #[error("Byte buffer is not a valid array of training observations: {0}")]
    ObservationLayout(String),

    #[error("Invalid option: {0}")]
    InvalidOptions(String),
}
