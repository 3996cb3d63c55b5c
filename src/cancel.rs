//! Cooperative cancellation
//!
//! Expensive loops poll a [`CancellationToken`]: STFT framing and CQT projection once per
//! frame, the HPSS median filters once per bin (time filter) or frame (frequency filter),
//! and band batches once per band. When the predicate returns true the
//! loop returns [`AnalysisError::Cancelled`] and its partial output is dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use spectral_mir::cancel::CancellationToken;
//!
//! let flag = Arc::new(AtomicBool::new(false));
//! let token = CancellationToken::from_flag(flag.clone());
//! assert!(token.check().is_ok());
//!
//! flag.store(true, Ordering::Relaxed);
//! assert!(token.check().is_err());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AnalysisError;

type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Polled cancellation predicate supplied by the caller
#[derive(Clone, Default)]
pub struct CancellationToken {
    predicate: Option<Predicate>,
}

impl CancellationToken {
    /// Token that never cancels
    pub fn none() -> Self {
        Self { predicate: None }
    }

    /// Wrap a zero-argument predicate
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Cancel once `flag` is set
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self::from_fn(move || flag.load(Ordering::Relaxed))
    }

    /// Current predicate value
    pub fn is_cancelled(&self) -> bool {
        self.predicate.as_ref().map(|p| p()).unwrap_or(false)
    }

    /// Return `Err(Cancelled)` if the predicate fires
    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            log::debug!("Cancellation observed");
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("armed", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_none_never_cancels() {
        let token = CancellationToken::none();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_predicate_polled_each_check() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let token = CancellationToken::from_fn(move || counter.fetch_add(1, Ordering::SeqCst) >= 2);

        assert!(token.check().is_ok());
        assert!(token.check().is_ok());
        assert_eq!(token.check(), Err(AnalysisError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
