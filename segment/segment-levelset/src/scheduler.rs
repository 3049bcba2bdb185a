//! Fork-join partitioning of the narrow band.

use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::LevelSetResult;

/// Runs a per-range job over contiguous slices of the narrow band.
///
/// The band is cut into the ranges of [`split`](Self::split). With more
/// than one thread the ranges run on a dedicated
/// [`rayon::ThreadPool`] built once per scheduler; otherwise the whole band
/// runs on the calling thread.
///
/// # Determinism
///
/// Each range writes only its own slice of the output buffer and reads only
/// shared immutable state, so the output is independent of the thread count
/// and of scheduling order.
#[derive(Debug)]
pub struct ThreadScheduler {
    threads: usize,
    pool: Option<ThreadPool>,
}

impl ThreadScheduler {
    /// Create a scheduler. `0` and `1` mean synchronous execution.
    ///
    /// # Errors
    ///
    /// Returns [`LevelSetError::ThreadPool`](crate::LevelSetError::ThreadPool)
    /// if the pool cannot be built.
    pub fn new(threads: usize) -> LevelSetResult<Self> {
        let threads = threads.max(1);
        let pool = if threads > 1 {
            Some(ThreadPoolBuilder::new().num_threads(threads).build()?)
        } else {
            None
        };
        Ok(Self { threads, pool })
    }

    /// Number of ranges the band is split into.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Contiguous ranges of `⌈len / parts⌉` elements covering `0..len`.
    ///
    /// The last range holds the remainder.
    ///
    /// # Example
    ///
    /// ```
    /// use segment_levelset::ThreadScheduler;
    ///
    /// let ranges = ThreadScheduler::split(10, 4);
    /// assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
    /// ```
    #[must_use]
    pub fn split(len: usize, parts: usize) -> Vec<Range<usize>> {
        if len == 0 {
            return Vec::new();
        }
        let chunk = len.div_ceil(parts.max(1));
        (0..len)
            .step_by(chunk)
            .map(|start| start..(start + chunk).min(len))
            .collect()
    }

    /// Run `job` over the [`split`](Self::split) ranges of `indices` and
    /// the aligned slices of `out`.
    ///
    /// Results are returned in range order. The first error aborts the pass
    /// and is returned after every started range has joined.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `job`.
    pub fn run<R, F>(&self, indices: &[usize], out: &mut [f32], job: F) -> LevelSetResult<Vec<R>>
    where
        R: Send,
        F: Fn(&[usize], &mut [f32]) -> LevelSetResult<R> + Sync,
    {
        debug_assert_eq!(indices.len(), out.len());
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        match &self.pool {
            None => Ok(vec![job(indices, out)?]),
            Some(pool) => {
                let mut jobs = Vec::with_capacity(self.threads);
                let mut rest = out;
                for range in Self::split(indices.len(), self.threads) {
                    let (slice, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
                    jobs.push((&indices[range], slice));
                    rest = tail;
                }
                pool.install(|| {
                    jobs.into_par_iter()
                        .map(|(range, slice)| job(range, slice))
                        .collect()
                })
            }
        }
    }
}
