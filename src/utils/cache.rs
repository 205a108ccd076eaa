//! Cipher program cache
//!
//! Programs are keyed by player version. A version names an immutable
//! script revision, so entries never expire. Extraction for an uncached
//! key runs at most once at a time: concurrent callers wait for the
//! in-flight extraction and share its result.
//!
//! Extraction failures are cached too, since the same script will fail the
//! same way. Transport errors and cancellation are not.

use crate::error::ResolveError;
use crate::platform::cipher::{CipherProgram, PlayerVersionKey};
use crate::Result;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type Outcome = std::result::Result<Arc<CipherProgram>, ResolveError>;

/// Process-wide store of extracted cipher programs
#[derive(Clone)]
pub struct CipherCache {
    programs: Cache<PlayerVersionKey, Outcome>,
}

impl CipherCache {
    /// Create an empty, unbounded cache
    pub fn new() -> Self {
        Self {
            programs: Cache::builder().build(),
        }
    }

    /// Get a cached program without extracting
    pub async fn get(&self, key: &PlayerVersionKey) -> Option<Arc<CipherProgram>> {
        self.programs.get(key).await.and_then(|outcome| outcome.ok())
    }

    /// Get the cached extraction failure for `key`, if any
    pub async fn failure(&self, key: &PlayerVersionKey) -> Option<ResolveError> {
        self.programs.get(key).await.and_then(|outcome| outcome.err())
    }

    /// Get the program for `key`, running `supplier` if it is not cached.
    ///
    /// Errors are shared with callers waiting on the same extraction. Only
    /// extraction failures are stored; after any other error, or if the
    /// extracting caller is dropped mid-flight, a later call retries.
    pub async fn get_or_extract<F, Fut>(
        &self,
        key: &PlayerVersionKey,
        supplier: F,
    ) -> Result<Arc<CipherProgram>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CipherProgram>>,
    {
        if let Some(outcome) = self.programs.get(key).await {
            debug!("Cipher cache hit for player {}", key);
            return outcome;
        }

        debug!("Cipher cache miss for player {}", key);
        self.programs
            .try_get_with(key.clone(), async move {
                match supplier().await {
                    Ok(program) => Ok(Ok(Arc::new(program))),
                    Err(e) if e.is_extraction_failure() => Ok(Err(e)),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(|error: Arc<ResolveError>| (*error).clone())?
    }

    /// Number of cached programs
    pub fn len(&self) -> u64 {
        self.programs.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached program
    pub async fn clear(&self) {
        self.programs.invalidate_all();
        self.programs.run_pending_tasks().await;
    }
}

impl Default for CipherCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::platform::cipher::CipherOperation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample_program() -> CipherProgram {
        CipherProgram::new(vec![
            CipherOperation::Reverse,
            CipherOperation::SwapAt(3),
            CipherOperation::SpliceFromIndex(2),
        ])
    }

    #[tokio::test]
    async fn test_concurrent_extraction_runs_once() {
        let cache = CipherCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = PlayerVersionKey::new("vflConcurrent");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_extract(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(sample_program())
                    })
                    .await
            }));
        }

        let mut programs = Vec::new();
        for handle in handles {
            programs.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(programs.iter().all(|p| **p == sample_program()));
        assert!(programs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_cached_program_is_reused() {
        let cache = CipherCache::new();
        let key = PlayerVersionKey::new("vflReuse");

        cache
            .get_or_extract(&key, || async { Ok(sample_program()) })
            .await
            .unwrap();
        let second = cache
            .get_or_extract(&key, || async {
                Err(ResolveError::Parse("should not run".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(*second, sample_program());
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_extraction_failures_are_cached() {
        let cache = CipherCache::new();
        let key = PlayerVersionKey::new("vflBroken");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let err = cache
                .get_or_extract(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ResolveError::CipherProgramNotFound {
                        version: "vflBroken".to_string(),
                    })
                })
                .await
                .unwrap_err();
            assert!(err.is_extraction_failure());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&key).await.is_none());
        assert!(cache.failure(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_transport_errors_are_not_cached() {
        let cache = CipherCache::new();
        let key = PlayerVersionKey::new("vflFlaky");

        let err = cache
            .get_or_extract(&key, || async {
                Err(ResolveError::Transport(TransportError::Status {
                    status: 503,
                    url: "https://host.test/base.js".to_string(),
                }))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Transport(_)));
        assert!(cache.failure(&key).await.is_none());

        let program = cache
            .get_or_extract(&key, || async { Ok(sample_program()) })
            .await
            .unwrap();
        assert_eq!(*program, sample_program());
    }

    #[tokio::test]
    async fn test_dropped_extraction_is_not_cached() {
        let cache = CipherCache::new();
        let key = PlayerVersionKey::new("vflDropped");

        let slow = cache.get_or_extract(&key, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(sample_program())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), slow).await;
        assert!(timed_out.is_err());
        assert!(cache.get(&key).await.is_none());

        let calls = AtomicUsize::new(0);
        cache
            .get_or_extract(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(sample_program())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_extract_separately() {
        let cache = CipherCache::new();
        for version in ["vflA", "vflB", "vflA"] {
            cache
                .get_or_extract(&PlayerVersionKey::new(version), || async {
                    Ok(sample_program())
                })
                .await
                .unwrap();
        }
        cache.programs.run_pending_tasks().await;
        assert_eq!(cache.len(), 2);

        cache.clear().await;
        assert!(cache.is_empty());
    }
}
