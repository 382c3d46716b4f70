//! AWS SDK implementations of the adapter traits.
//!
//! Trait seams are synchronous, so every implementation funnels its SDK
//! calls through [`block_on`].

pub mod cfn;
pub mod clients;
pub mod code_staging;
pub mod evaluations;
pub mod inspection;
pub mod parameters;
pub mod provisioning;
pub mod state_table;

pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Existence checks: a not-found service error reads as "absent",
/// anything else propagates.
pub(crate) fn absent_on<T>(
    result: Result<T, String>,
    not_found_marker: &str,
) -> Result<Option<T>, String> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.contains(not_found_marker) => Ok(None),
        Err(error) => Err(error),
    }
}
