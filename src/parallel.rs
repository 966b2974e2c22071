//! Cancellation and order-preserving data-parallel passes.
//!
//! Every per-record pass in the engine runs through [`map_indexed`]: workers
//! compute disjoint output indices, so record order is preserved and no
//! shared mutation happens inside a pass. The cancellation token is polled
//! once per record; a cancelled pass surfaces [`FlatqError::ContextIsDone`]
//! and unwinds without touching the cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::error::FlatqError;

/// Record counts below this run sequentially; the pass is cheaper than the
/// fork/join overhead.
const MIN_PARALLEL_RECORDS: usize = 128;

/// Cooperative cancellation token shared by every pass of a statement.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), FlatqError> {
        if self.is_cancelled() {
            Err(FlatqError::ContextIsDone)
        } else {
            Ok(())
        }
    }
}

/// Build a worker pool of the given size.
pub fn build_pool(cpu: usize) -> Result<rayon::ThreadPool, FlatqError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(cpu.max(1))
        .build()
        .map_err(|e| FlatqError::InternalError(format!("worker pool: {e}")))
}

/// Apply `f` to every index in `0..len`, preserving order. Runs on the pool
/// when the input is large enough and the pass is marked parallel-safe,
/// sequentially otherwise. Passes whose expressions assign variables, call
/// user functions, or execute subqueries must set `sequential`: their
/// session-scope effects have to happen in record order on one thread.
/// The first error wins; cancellation is polled per record.
pub fn map_indexed<T, F>(
    pool: &rayon::ThreadPool,
    token: &CancellationToken,
    len: usize,
    sequential: bool,
    f: F,
) -> Result<Vec<T>, FlatqError>
where
    T: Send,
    F: Fn(usize) -> Result<T, FlatqError> + Sync,
{
    if sequential || len < MIN_PARALLEL_RECORDS || pool.current_num_threads() < 2 {
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            token.check()?;
            out.push(f(i)?);
        }
        return Ok(out);
    }
    pool.install(|| {
        (0..len)
            .into_par_iter()
            .map(|i| {
                token.check()?;
                f(i)
            })
            .collect::<Result<Vec<T>, FlatqError>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order() {
        let pool = build_pool(4).unwrap();
        let token = CancellationToken::new();
        let out = map_indexed(&pool, &token, 1000, false, |i| Ok(i * 2)).unwrap();
        assert_eq!(out.len(), 1000);
        assert_eq!(out[0], 0);
        assert_eq!(out[999], 1998);
    }

    #[test]
    fn surfaces_first_error() {
        let pool = build_pool(2).unwrap();
        let token = CancellationToken::new();
        let result = map_indexed(&pool, &token, 500, false, |i| {
            if i == 300 {
                Err(FlatqError::InternalError("boom".into()))
            } else {
                Ok(i)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn sequential_passes_stay_ordered_too() {
        let pool = build_pool(4).unwrap();
        let token = CancellationToken::new();
        let out = map_indexed(&pool, &token, 200, true, |i| Ok(i + 1)).unwrap();
        assert_eq!(out[199], 200);
    }

    #[test]
    fn cancelled_token_stops_the_pass() {
        let pool = build_pool(2).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = map_indexed(&pool, &token, 10, false, Ok);
        assert!(matches!(result, Err(FlatqError::ContextIsDone)));
    }
}
