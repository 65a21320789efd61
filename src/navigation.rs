//! Payloads handed from one view to another
//!
//! A [`Navigation`] carries at most one pending file open. Whoever handles it
//! takes the payload out, so the same event can never be processed twice.

use serde::{Deserialize, Serialize};

/// A file the user opened from the explorer and wants to ask about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOpen {
    pub source_id: i64,
    pub file_id: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    file_open: Option<FileOpen>,
}

impl Navigation {
    /// Plain navigation without a payload
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_file(file: FileOpen) -> Self {
        Self {
            file_open: Some(file),
        }
    }

    /// Consume the pending file open, if any
    pub fn take_file_open(&mut self) -> Option<FileOpen> {
        self.file_open.take()
    }

    pub fn is_pending(&self) -> bool {
        self.file_open.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_consumed_once() {
        let mut nav = Navigation::open_file(FileOpen {
            source_id: 1,
            file_id: "abc".to_string(),
            file_name: "plan.pdf".to_string(),
        });
        assert!(nav.is_pending());
        assert_eq!(nav.take_file_open().map(|f| f.file_name), Some("plan.pdf".to_string()));
        assert!(!nav.is_pending());
        assert_eq!(nav.take_file_open(), None);
    }
}
