use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("handler capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },
    #[error("handler not found")]
    NotFound,
}
