use crate::validate::ValidationFlags;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Im2colError {
    #[error("invalid convolution geometry")]
    InvalidGeometry,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("transaction rejected by validation ({0:?})")]
    Rejected(ValidationFlags),
    #[error("timeout waiting for completion")]
    Timeout,
    #[error("unsupported on this hardware")]
    Unsupported,
}
