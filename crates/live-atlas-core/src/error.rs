use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to load `{key}`: {reason}")]
    Load { key: String, reason: String },
    #[error("No space left in the atlas for a {width}x{height} request")]
    OutOfSpace { width: u32, height: u32 },
    #[error("Surface backing has no CPU readback path")]
    ReadbackUnsupported,
    #[error("Malformed serialized atlas: {0}")]
    MalformedData(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Encoding error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, AtlasError>;
