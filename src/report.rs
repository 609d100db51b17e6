use serde::{Deserialize, Serialize};

use crate::record::RowError;

pub const MSG_PARSE_FAILED: &str = "Failed to parse CSV file. Please check the file format.";
pub const MSG_VALIDATION_FAILED: &str =
    "Some rows had validation errors. Please fix them and try again.";
pub const MSG_NO_RECORDS: &str = "No valid offering records were found in the file.";
pub const MSG_ADDED: &str = "File parsed and offerings added successfully.";

/// Outcome of one upload attempt, shaped for JSON callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub success: bool,
    pub message: String,
    pub added_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<RowError>>,
}

impl IngestionResult {
    pub fn parse_failed(errors: Vec<RowError>) -> Self {
        Self::failed(MSG_PARSE_FAILED, Some(errors))
    }

    pub fn validation_failed(errors: Vec<RowError>) -> Self {
        Self::failed(MSG_VALIDATION_FAILED, Some(errors))
    }

    pub fn no_records() -> Self {
        Self::failed(MSG_NO_RECORDS, None)
    }

    pub fn commit_failed(detail: &str) -> Self {
        let detail = detail.trim().trim_end_matches('.');
        Self::failed(
            &format!("An unexpected error occurred during processing: {detail}."),
            None,
        )
    }

    pub fn added(count: usize) -> Self {
        Self {
            success: true,
            message: MSG_ADDED.to_string(),
            added_count: count,
            errors: None,
        }
    }

    fn failed(message: &str, errors: Option<Vec<RowError>>) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            added_count: 0,
            errors,
        }
    }

    pub fn row_errors(&self) -> &[RowError] {
        self.errors.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_shape() {
        let r = IngestionResult::validation_failed(vec![RowError::new(2, "amount: bad")]);
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({
                "success": false,
                "message": MSG_VALIDATION_FAILED,
                "addedCount": 0,
                "errors": [{"row": 2, "message": "amount: bad"}]
            })
        );

        let ok = serde_json::to_value(IngestionResult::added(3)).unwrap();
        assert_eq!(ok["addedCount"], 3);
        assert!(ok.get("errors").is_none());
    }

    #[test]
    fn commit_detail_is_not_double_punctuated() {
        let r = IngestionResult::commit_failed("store unavailable: connection reset.");
        assert_eq!(
            r.message,
            "An unexpected error occurred during processing: store unavailable: connection reset."
        );
        assert_eq!(r.added_count, 0);
        assert!(!r.success);
    }
}
