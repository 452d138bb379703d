use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identifier errors
    #[error("Invalid USB id pair: {0}")]
    InvalidUsbIds(String),

    #[error("Invalid bus identity: {0}")]
    InvalidBusIdentity(String),
}

pub type Result<T> = std::result::Result<T, Error>;
