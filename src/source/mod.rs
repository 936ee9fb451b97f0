//! Extraction sources
//!
//! An [`ExtractionSource`] renders or fetches pages of a paginated table. The
//! traversal drives it through a session that lives for the whole run.

use crate::harvest::discovery::DiscoveryError;
use crate::PageResult;
use async_trait::async_trait;

pub mod datatables;
pub mod parser;

/// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Page did not arrive in time
    #[error("timed out fetching page {page}: {message}")]
    FetchTimeout {
        /// Page being fetched
        page: u64,
        /// Underlying error text
        message: String,
    },

    /// Session could not be established
    #[error("connect error: {0}")]
    ConnectError(String),

    /// HTTP transport or status error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response body could not be interpreted
    #[error("parse error: {0}")]
    ParseError(String),

    /// Source-side navigation failed
    #[error("navigation error: {0}")]
    NavigationError(String),
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Paginated data source contract
///
/// All operations take the run's session. `connect` is called once per run and
/// `disconnect` is always called before the run returns, success or failure.
#[async_trait]
pub trait ExtractionSource: Send + Sync {
    /// Per-run session state (browser page, HTTP client and cursor, ...)
    type Session: Send;

    /// Acquire the session
    async fn connect(&self) -> SourceResult<Self::Session>;

    /// Total number of pages, from the source's own pagination metadata
    async fn discover_total_pages(&self, session: &mut Self::Session)
        -> Result<u64, DiscoveryError>;

    /// Records on `page`
    ///
    /// Transient failures surface as [`SourceError::FetchTimeout`].
    async fn fetch_page(&self, session: &mut Self::Session, page: u64) -> SourceResult<PageResult>;

    /// Move to the next page; `false` means there is none
    async fn advance(&self, session: &mut Self::Session) -> SourceResult<bool>;

    /// Jump straight to `page`; `false` means it is not directly addressable
    async fn reposition(&self, session: &mut Self::Session, page: u64) -> SourceResult<bool>;

    /// Release the session
    async fn disconnect(&self, session: Self::Session);
}
