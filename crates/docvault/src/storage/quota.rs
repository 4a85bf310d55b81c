//! Per-namespace storage quota
//!
//! Usage is derived on demand from the namespace directory, never cached.

use super::namespace::NamespaceHandle;
use crate::error::{Error, Result};
use crate::types::{QuotaStatus, StoredFileName};

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Bytes counted against the ceiling before the write
    pub used: u64,
    /// Bytes of the incoming write
    pub incoming: u64,
    /// Bytes of an existing same-named file that the write would replace
    pub released: u64,
    /// Configured ceiling
    pub ceiling: u64,
}

impl QuotaDecision {
    /// Usage after the write lands
    pub fn projected(&self) -> u64 {
        self.used
            .saturating_sub(self.released)
            .saturating_add(self.incoming)
    }

    /// True when the write fits under the ceiling
    pub fn admitted(&self) -> bool {
        self.projected() <= self.ceiling
    }

    /// Turn a rejection into `Error::QuotaExceeded`
    pub fn into_result(self, handle: &NamespaceHandle) -> Result<Self> {
        if self.admitted() {
            Ok(self)
        } else {
            Err(Error::QuotaExceeded {
                namespace: handle.namespace().to_string(),
                used: self.used.saturating_sub(self.released),
                incoming: self.incoming,
                ceiling: self.ceiling,
            })
        }
    }
}

/// Read-only quota accounting
///
/// No method writes. Callers that need the decision to stay true until their
/// write lands hold the namespace lock around check and write.
pub struct QuotaGuard;

impl QuotaGuard {
    /// Bytes of user content in the namespace; 0 when it does not exist
    pub async fn usage(handle: &NamespaceHandle) -> Result<u64> {
        let files = handle.user_files().await?;
        Ok(files.iter().map(|(_, size)| size).sum())
    }

    /// Whether `incoming` more bytes fit under `ceiling`
    ///
    /// An unreadable namespace rejects.
    pub async fn admit(handle: &NamespaceHandle, incoming: u64, ceiling: u64) -> bool {
        match Self::check(handle, None, incoming, ceiling).await {
            Ok(decision) => decision.admitted(),
            Err(e) => {
                tracing::error!("Quota check failed for '{}': {}", handle.namespace(), e);
                false
            }
        }
    }

    /// Like [`QuotaGuard::admit`], but bytes of an existing `filename` count as freed
    pub async fn admit_replacing(
        handle: &NamespaceHandle,
        filename: &StoredFileName,
        incoming: u64,
        ceiling: u64,
    ) -> bool {
        match Self::check(handle, Some(filename), incoming, ceiling).await {
            Ok(decision) => decision.admitted(),
            Err(e) => {
                tracing::error!("Quota check failed for '{}': {}", handle.namespace(), e);
                false
            }
        }
    }

    /// Full decision, for callers that report the numbers
    pub async fn check(
        handle: &NamespaceHandle,
        replacing: Option<&StoredFileName>,
        incoming: u64,
        ceiling: u64,
    ) -> Result<QuotaDecision> {
        let files = handle.user_files().await?;
        let used = files.iter().map(|(_, size)| size).sum();
        let released = replacing
            .and_then(|name| files.iter().find(|(f, _)| f == name.as_str()))
            .map(|(_, size)| *size)
            .unwrap_or(0);

        Ok(QuotaDecision {
            used,
            incoming,
            released,
            ceiling,
        })
    }

    /// Usage snapshot for reporting
    pub async fn status(handle: &NamespaceHandle, ceiling: u64) -> Result<QuotaStatus> {
        Ok(QuotaStatus::new(Self::usage(handle).await?, ceiling))
    }
}
