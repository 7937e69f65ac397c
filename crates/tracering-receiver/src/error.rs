use thiserror::Error;
use tracering_core::ShmError;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("failed to create the shared trace ring: {0}")]
    Shm(#[from] ShmError),
}
