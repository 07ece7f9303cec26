use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no input cloud was given")]
    MissingInput,
    #[error("no search method was given")]
    MissingSearchMethod,
    #[error("neither K nor a radius was given for the neighbor search")]
    MissingSearchParameter,
    #[error("{0} requires normals")]
    MissingNormals(&'static str),
    #[error("{0} requires intensity gradients")]
    MissingGradients(&'static str),
    #[error("{what} has {actual} elements, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("index {index} is out of bounds for a cloud of {len} points")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
