use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("index name '{0}' exceeds the header page record width")]
    NameTooLong(String),

    #[error("invalid node size: {0}")]
    InvalidNodeSize(String),

    #[error("index registry is full")]
    RegistryFull,
}
