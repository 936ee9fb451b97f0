//! DataTables server-side-processing HTTP source
//!
//! Pages are addressed by offset: page `n` is
//! `GET <url>?draw=<k>&start=<(n-1)*page_size>&length=<page_size>`.

use crate::harvest::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::harvest::discovery::{self, DiscoveryError};
use crate::source::parser::{DataTablesParser, DataTablesResponse};
use crate::source::{ExtractionSource, SourceError, SourceResult};
use crate::PageResult;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Browser-like user agent; some table backends refuse unknown clients
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Column names of the UFO sighting report table
pub const DEFAULT_COLUMNS: [&str; 9] = [
    "Status",
    "Date_Time",
    "City",
    "State",
    "Country",
    "Shape",
    "Summary",
    "Has_Media",
    "Explanation",
];

/// HTTP source for a DataTables AJAX endpoint
#[derive(Debug, Clone)]
pub struct DataTablesHttpSource {
    url: String,
    page_size: u64,
    columns: Vec<String>,
    timeout: Duration,
    user_agent: String,
}

/// Per-run HTTP session
pub struct DataTablesSession {
    client: Client,
    current_page: u64,
    draw: u64,
    entries: Option<u64>,
    last_page_len: Option<usize>,
    cached: Option<(u64, DataTablesResponse)>,
}

impl DataTablesSession {
    /// Page the session is positioned on
    pub fn current_page(&self) -> u64 {
        self.current_page
    }
}

impl DataTablesHttpSource {
    /// Create a source for `url` with `page_size` rows per request
    pub fn new(url: impl Into<String>, page_size: u64) -> SourceResult<Self> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| SourceError::ConnectError(format!("Invalid source URL {url:?}: {e}")))?;
        if page_size == 0 {
            return Err(SourceError::ConnectError("page size must be at least 1".to_string()));
        }
        Ok(Self {
            url,
            page_size,
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    /// Override the column names rows are mapped onto
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Configured columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Query parameters for `page`
    pub fn page_params(
        &self,
        page: u64,
        draw: u64,
    ) -> SourceResult<Vec<(&'static str, String)>> {
        let start = page
            .saturating_sub(1)
            .checked_mul(self.page_size)
            .ok_or_else(|| {
                SourceError::NavigationError(format!(
                    "offset of page {page} overflows at {} rows per page",
                    self.page_size
                ))
            })?;
        Ok(vec![
            ("draw", draw.to_string()),
            ("start", start.to_string()),
            ("length", self.page_size.to_string()),
        ])
    }

    async fn request(
        &self,
        session: &mut DataTablesSession,
        page: u64,
    ) -> SourceResult<DataTablesResponse> {
        match session.cached.take() {
            Some((cached_page, response)) if cached_page == page => return Ok(response),
            _ => {}
        }

        session.draw += 1;
        let params = self.page_params(page, session.draw)?;
        debug!(page, draw = session.draw, url = %self.url, "Requesting page");

        let response = session
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| classify(e, page))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpError(format!(
                "page {page}: unexpected status {status}"
            )));
        }

        let body = response.text().await.map_err(|e| classify(e, page))?;
        let parsed = DataTablesParser::parse_response(&body)?;
        if let Some(entries) = parsed.entry_count() {
            session.entries = Some(entries);
        }
        Ok(parsed)
    }
}

fn classify(error: reqwest::Error, page: u64) -> SourceError {
    if error.is_timeout() {
        SourceError::FetchTimeout {
            page,
            message: error.to_string(),
        }
    } else if error.is_connect() {
        SourceError::ConnectError(error.to_string())
    } else {
        SourceError::HttpError(error.to_string())
    }
}

#[async_trait]
impl ExtractionSource for DataTablesHttpSource {
    type Session = DataTablesSession;

    async fn connect(&self) -> SourceResult<DataTablesSession> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| SourceError::ConnectError(e.to_string()))?;
        info!(url = %self.url, page_size = self.page_size, "Opened source session");
        Ok(DataTablesSession {
            client,
            current_page: 1,
            draw: 0,
            entries: None,
            last_page_len: None,
            cached: None,
        })
    }

    async fn discover_total_pages(
        &self,
        session: &mut DataTablesSession,
    ) -> Result<u64, DiscoveryError> {
        let response = self
            .request(session, 1)
            .await
            .map_err(|e| DiscoveryError::Source(e.to_string()))?;
        let entries = response.entry_count().ok_or(DiscoveryError::MissingCounts)?;
        session.cached = Some((1, response));

        // Render the info line the table widget would show and read it back.
        let info = discovery::format_info(1, self.page_size, entries);
        debug!(info = %info, "Pagination info");
        discovery::total_pages_from_info(&info, self.page_size)
    }

    async fn fetch_page(
        &self,
        session: &mut DataTablesSession,
        page: u64,
    ) -> SourceResult<PageResult> {
        let response = self.request(session, page).await?;
        let records = DataTablesParser::parse_rows(&response.data, &self.columns)?;
        session.current_page = page;
        session.last_page_len = Some(response.data.len());
        Ok(PageResult::new(page, records))
    }

    async fn advance(&self, session: &mut DataTablesSession) -> SourceResult<bool> {
        let has_next = match (session.entries, session.last_page_len) {
            (Some(entries), _) => session.current_page.saturating_mul(self.page_size) < entries,
            (None, Some(len)) => len as u64 >= self.page_size,
            (None, None) => true,
        };
        if has_next {
            session.current_page += 1;
            session.last_page_len = None;
        }
        Ok(has_next)
    }

    async fn reposition(&self, session: &mut DataTablesSession, page: u64) -> SourceResult<bool> {
        if page == 0 {
            return Ok(false);
        }
        if let Some(entries) = session.entries {
            if page > discovery::total_pages(entries, self.page_size).max(1) {
                return Ok(false);
            }
        }
        session.current_page = page;
        session.last_page_len = None;
        Ok(true)
    }

    async fn disconnect(&self, session: DataTablesSession) {
        debug!(requests = session.draw, "Closed source session");
    }
}
