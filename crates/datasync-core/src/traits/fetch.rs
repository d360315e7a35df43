// # Fetch Function Trait
//
// The remote call behind a data source. The core never decides what to
// call; it only decides when.
//
// ## Usage
//
// ```rust,ignore
// use datasync_core::traits::fetch_fn;
//
// let fetch = fetch_fn(|| async { client.list_active_calls().await });
// ```

use async_trait::async_trait;
use std::future::Future;

use crate::error::Result;

/// Asynchronous fetch of a source's data
///
/// Implementations must not retry, schedule, or cache: a failure is
/// returned as-is and the scheduler decides when to try again.
#[async_trait]
pub trait FetchFunction<T>: Send + Sync {
    /// Perform one fetch
    async fn fetch(&self) -> Result<T>;
}

/// Adapter turning an async closure into a [`FetchFunction`]
pub struct FnFetch<F> {
    f: F,
}

/// Wrap an async closure as a [`FetchFunction`]
pub fn fetch_fn<F>(f: F) -> FnFetch<F> {
    FnFetch { f }
}

#[async_trait]
impl<T, F, Fut> FetchFunction<T> for FnFetch<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    async fn fetch(&self) -> Result<T> {
        (self.f)().await
    }
}
