//! Rejects assets the direct upload service cannot accept.

use async_trait::async_trait;

use crate::error::{Result, TransferError};
use crate::pipeline::stage::{Stage, StageContext, WorkItem};

// The character set the target service rejects on the wire. An opaque
// contract, not a style rule.
const ILLEGAL_FILENAME_CHARS: &[char] = &[
    '[', ']', '{', '}', '&', ':', '\\', '?', '#', '|', '*', '%',
];

/// Withdraws empty assets and assets with filenames the service rejects.
///
/// Rejected assets are reported as error events and consumed; the rest of
/// the batch continues.
#[derive(Debug, Default)]
pub struct FilterUnsupported;

fn rejection_reason(filename: &str, content_length: Option<u64>) -> Option<String> {
    if let Some(length) = content_length
        && length < 1
    {
        return Some(format!("{filename}: file is empty"));
    }
    if let Some(illegal) = filename.chars().find(|c| ILLEGAL_FILENAME_CHARS.contains(c)) {
        return Some(format!(
            "{filename}: filename contains unsupported character {illegal:?}"
        ));
    }
    None
}

#[async_trait]
impl Stage for FilterUnsupported {
    fn name(&self) -> &'static str {
        "filter-unsupported"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            let asset = item.into_asset()?;
            let filename = asset.filename().unwrap_or_default();
            match rejection_reason(&filename, asset.content_length()) {
                Some(reason) => {
                    ctx.controller.notify_error(
                        self.name(),
                        &TransferError::UnsupportedFile(reason),
                        &asset,
                    );
                }
                None => out.push(WorkItem::Asset(asset)),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_filenames() {
        assert!(rejection_reason("file-1.jpg", Some(12)).is_none());
        assert!(rejection_reason("photo (1).png", Some(1)).is_none());
        assert!(rejection_reason("über.png", Some(1)).is_none());
    }

    #[test]
    fn rejects_empty_files() {
        let reason = rejection_reason("file.jpg", Some(0)).unwrap();
        assert!(reason.contains("empty"));
    }

    #[test]
    fn rejects_each_illegal_character() {
        for c in ILLEGAL_FILENAME_CHARS {
            let filename = format!("file{c}name.jpg");
            assert!(
                rejection_reason(&filename, Some(10)).is_some(),
                "accepted {filename:?}"
            );
        }
    }

    #[test]
    fn unknown_length_passes_size_check() {
        assert!(rejection_reason("file.jpg", None).is_none());
    }
}
