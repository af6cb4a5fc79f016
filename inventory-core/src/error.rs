use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("photo not found: {0}")]
    PhotoNotFound(String),

    #[error("invalid storage reference: {0}")]
    InvalidStorageRef(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl InventoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound(_) | Self::PhotoNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
