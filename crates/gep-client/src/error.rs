//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("subscriber is already connected; disconnect first")]
    AlreadyConnected,

    #[error("subscriber is not connected")]
    NotConnected,

    #[error("failed to bind data channel: {0}")]
    DataChannelBind(String),

    #[error("transport error: {0}")]
    Transport(#[from] gep_transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] gep_core::Error),
}
