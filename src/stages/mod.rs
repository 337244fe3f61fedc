//! The concrete pipeline stages.

mod close;
mod complete;
mod filter;
mod initiate;
mod join;
mod metadata;
mod split;
mod transfer;

pub use close::CloseFiles;
pub use complete::AemCompleteUpload;
pub use filter::FilterUnsupported;
pub use initiate::AemInitiateUpload;
pub use join::JoinTransferParts;
pub use metadata::GetAssetMetadata;
pub use split::CreateTransferParts;
pub use transfer::Transfer;

use reqwest::header::HeaderMap;

use crate::error::{Result, TransferError};
use crate::pipeline::stage::StageContext;
use crate::types::asset::Asset;

/// Merge the run-wide headers with an asset's own headers.
///
/// Asset headers win on conflict.
pub(crate) fn merged_headers(ctx: &StageContext, asset: &Asset) -> HeaderMap {
    let mut headers = ctx.headers.clone();
    for (name, value) in asset.headers() {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// Parse a `Content-Range: bytes <start>-<end>/<total>` header.
///
/// Returns `(start, end_inclusive, total)`.
pub(crate) fn parse_content_range(value: &str) -> Result<(u64, u64, u64)> {
    let invalid = || TransferError::ContentRange(value.to_string());

    let rest = value.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
    let (range, total) = rest.split_once('/').ok_or_else(invalid)?;
    let (start, end) = range.split_once('-').ok_or_else(invalid)?;
    let start: u64 = start.trim().parse().map_err(|_| invalid())?;
    let end: u64 = end.trim().parse().map_err(|_| invalid())?;
    let total: u64 = total.trim().parse().map_err(|_| invalid())?;
    if start > end || end >= total {
        return Err(invalid());
    }
    Ok((start, end, total))
}

/// Format a timestamp as an HTTP-date (RFC 7231).
pub(crate) fn http_date(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_content_range_accepts_valid_header() {
        assert_eq!(
            parse_content_range("bytes 0-199/1000").unwrap(),
            (0, 199, 1000)
        );
        assert_eq!(
            parse_content_range("bytes 350-999/1000").unwrap(),
            (350, 999, 1000)
        );
    }

    #[test]
    fn parse_content_range_rejects_malformed() {
        for header in [
            "0-199/1000",
            "bytes 0-199",
            "bytes x-199/1000",
            "bytes 200-100/1000",
            "bytes 0-1000/1000",
            "bytes */1000",
        ] {
            assert!(
                parse_content_range(header).is_err(),
                "accepted invalid header {header:?}"
            );
        }
    }

    #[test]
    fn http_date_format() {
        let timestamp = chrono::DateTime::parse_from_rfc3339("2024-03-15T10:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(http_date(&timestamp), "Fri, 15 Mar 2024 10:30:00 GMT");
    }
}
