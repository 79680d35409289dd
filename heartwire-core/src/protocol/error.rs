pub type ParseResult<T> = core::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("insufficient data: needed {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}
