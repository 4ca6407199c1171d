// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown cache scheme: {0}")]
    UnknownScheme(String),
    #[error("invalid cache url: {0}")]
    InvalidUrl(String),
    #[error("backend: {0}")]
    Backend(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;

pub use config::Settings;
