use thiserror::Error;

use crate::schema::JobId;

#[derive(Debug, Error)]
pub enum PullError {
    #[error("bad input: {0}")]
    BadInput(String),
    #[error("no such job: {0}")]
    NotFound(JobId),
}

pub type Result<T> = std::result::Result<T, PullError>;
