//! Record buffering between flush points

use crate::{PageResult, Record};

/// A page arrived out of order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page {page} does not follow buffered page {last}")]
pub struct OutOfOrderPage {
    /// Page that was rejected
    pub page: u64,
    /// Last page already buffered
    pub last: u64,
}

/// Records drained from the accumulator in one flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Records in page order
    pub records: Vec<Record>,
    /// Last page covered by the batch, if any page was buffered
    pub last_page: Option<u64>,
    /// Number of pages covered
    pub pages: u64,
}

/// Buffers records between flushes
///
/// Pages must be added with strictly increasing page numbers; records keep the
/// order they were fetched in.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    records: Vec<Record>,
    last_page: Option<u64>,
    pages: u64,
}

impl BatchAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page's records
    pub fn add(&mut self, page: PageResult) -> Result<(), OutOfOrderPage> {
        if let Some(last) = self.last_page {
            if page.page_number <= last {
                return Err(OutOfOrderPage {
                    page: page.page_number,
                    last,
                });
            }
        }
        self.last_page = Some(page.page_number);
        self.pages += 1;
        self.records.extend(page.records);
        Ok(())
    }

    /// Take everything buffered, leaving the accumulator empty
    ///
    /// The page ordering guard carries over so later pages must still follow.
    pub fn drain(&mut self) -> Batch {
        let pages = std::mem::take(&mut self.pages);
        Batch {
            records: std::mem::take(&mut self.records),
            last_page: if pages > 0 { self.last_page } else { None },
            pages,
        }
    }

    /// Whether a flush would write nothing
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Buffered record count
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Buffered page count
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Buffered records
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Last page added, including pages already drained
    pub fn last_page(&self) -> Option<u64> {
        self.last_page
    }
}
