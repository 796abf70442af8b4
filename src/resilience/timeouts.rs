//! Deadline enforcement.
//!
//! The wrapped future is dropped when the deadline passes. For reqwest that
//! aborts the underlying connection, so an expired request stops consuming
//! the network as well as the caller's time.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::client::types::ApiError;

/// The task did not finish within its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {}ms exceeded", after.as_millis())]
pub struct DeadlineExceeded {
    pub after: Duration,
}

impl From<DeadlineExceeded> for ApiError {
    fn from(e: DeadlineExceeded) -> Self {
        ApiError::Timeout { after: e.after }
    }
}

/// Run `fut` with a deadline; a zero budget disables the deadline.
pub async fn with_deadline<Fut>(budget: Duration, fut: Fut) -> Result<Fut::Output, DeadlineExceeded>
where
    Fut: Future,
{
    if budget.is_zero() {
        return Ok(fut.await);
    }

    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| DeadlineExceeded { after: budget })
}
