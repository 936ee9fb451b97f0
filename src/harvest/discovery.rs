//! Total-page discovery from table info text
//!
//! Table widgets report their size as `"Showing 1 to 100 of 17,056 entries"`.
//! The entry total is the number after the first standalone `of`.

/// Page-count metadata could not be determined
///
/// Never fatal: the traversal falls back to an unbounded scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// Info text did not have the expected shape
    #[error("unparsable pagination info: {0:?}")]
    Unparsable(String),

    /// The source did not report entry counts at all
    #[error("source reported no entry counts")]
    MissingCounts,

    /// The source failed while fetching metadata
    #[error("discovery request failed: {0}")]
    Source(String),
}

/// Parse the total entry count out of an info string
///
/// Thousands separators (`,` `.` `'` and non-breaking spaces) are ignored.
pub fn parse_entry_total(info: &str) -> Result<u64, DiscoveryError> {
    let normalized = join_digit_groups(info);
    let mut tokens = normalized.split_whitespace();
    tokens
        .by_ref()
        .find(|t| t.eq_ignore_ascii_case("of"))
        .ok_or_else(|| DiscoveryError::Unparsable(info.to_string()))?;

    let raw = tokens
        .next()
        .ok_or_else(|| DiscoveryError::Unparsable(info.to_string()))?;
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '\''))
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DiscoveryError::Unparsable(info.to_string()));
    }
    digits
        .parse()
        .map_err(|_| DiscoveryError::Unparsable(info.to_string()))
}

/// Drop non-breaking spaces used as digit group separators
fn join_digit_groups(info: &str) -> String {
    let chars: Vec<char> = info.chars().collect();
    let mut out = String::with_capacity(info.len());
    for (i, &c) in chars.iter().enumerate() {
        let grouping = matches!(c, '\u{a0}' | '\u{202f}')
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if !grouping {
            out.push(c);
        }
    }
    out
}

/// Pages needed to show `entries` at `page_size` per page
pub fn total_pages(entries: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    entries.div_ceil(page_size)
}

/// Parse info text straight to a page count
pub fn total_pages_from_info(info: &str, page_size: u64) -> Result<u64, DiscoveryError> {
    parse_entry_total(info).map(|entries| total_pages(entries, page_size))
}

/// Render the info text a table widget would show for a page
pub fn format_info(page: u64, page_size: u64, entries: u64) -> String {
    let first = page
        .saturating_sub(1)
        .saturating_mul(page_size)
        .saturating_add(1)
        .min(entries);
    let last = page.saturating_mul(page_size).min(entries);
    format!(
        "Showing {} to {} of {} entries",
        group_thousands(first),
        group_thousands(last),
        group_thousands(entries)
    )
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
