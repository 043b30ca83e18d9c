//! Caller-side deadlines.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run a locator or store operation with a deadline.
///
/// A timed-out `create_value` may still have committed remotely; follow up
/// with `find_value` rather than assuming failure.
pub async fn with_timeout<T, F>(duration: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, operation)
        .await
        .map_err(|_| Error::Timeout(duration))?
}
