use serde::{Deserialize, Serialize};

/// Outcome reported by a processor for a single task.
///
/// `success == false` is treated by the queue exactly like a returned error
/// and goes through the retry policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub processed_path: Option<String>,
    pub processed_size: Option<u64>,
    pub thumbnail_path: Option<String>,
    pub error: Option<String>,
    /// Processor-reported duration in milliseconds.
    pub processing_time_ms: Option<u64>,
    /// Free-form processor metadata (dimensions, codecs, ratios...).
    pub data: Option<serde_json::Value>,
}

impl ProcessingResult {
    /// A successful result pointing at the produced file.
    pub fn ok(processed_path: impl Into<String>) -> Self {
        Self {
            success: true,
            processed_path: Some(processed_path.into()),
            ..Default::default()
        }
    }

    /// A failed result carrying an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.processed_size = Some(size);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let ok = ProcessingResult::ok("/out/a.webp").with_size(1024);
        assert!(ok.success);
        assert_eq!(ok.processed_path.as_deref(), Some("/out/a.webp"));
        assert_eq!(ok.processed_size, Some(1024));
        assert!(ok.error.is_none());

        let failed = ProcessingResult::failed("decoder crashed");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("decoder crashed"));
        assert!(failed.processed_path.is_none());
    }

    #[test]
    fn serializes_optional_fields() {
        let result = ProcessingResult::ok("/out/b.mp3")
            .with_data(serde_json::json!({"bitrate": 192}));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["bitrate"], 192);
        assert!(json["error"].is_null());
    }
}
