use serde_derive::{Deserialize, Serialize};

use crate::{
    grid::JournalEntry,
    leds::{InteractiveEntry, LedStatus},
    scan::ScanEvent,
};

/// Dashboard request to the LED coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LedCommand {
    /// Show the filtered and selected entries
    UpdateInteractive { entries: Vec<InteractiveEntry> },
    SetMode {
        mode: String,
        /// The whole journal, needed by the visualization
        #[serde(default, rename = "allEntries", skip_serializing_if = "Option::is_none")]
        all_entries: Option<Vec<JournalEntry>>,
        #[serde(
            default,
            rename = "interactiveLedData",
            skip_serializing_if = "Option::is_none"
        )]
        interactive_led_data: Option<Vec<InteractiveEntry>>,
    },
    ClearAll,
    /// The user touched the dashboard
    Activity,
    SetBrightness { brightness: f32 },
    GetStatus,
}

/// Reply to a [LedCommand]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LedReply {
    SuccessResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<LedStatus>,
    },
    ErrorResponse {
        success: bool,
        error: String,
    },
}

impl LedReply {
    pub fn success(status: Option<LedStatus>) -> Self {
        Self::SuccessResponse {
            success: true,
            status,
        }
    }

    pub fn error(error: &impl std::fmt::Display) -> Self {
        Self::ErrorResponse {
            success: false,
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::SuccessResponse { .. })
    }
}

/// Unsolicited notification pushed to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanMessage {
    TagScanned {
        #[serde(rename = "tagId")]
        tag_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl From<ScanEvent> for ScanMessage {
    fn from(event: ScanEvent) -> Self {
        Self::TagScanned {
            tag_id: event.tag_id,
            timestamp: event.detected_at,
        }
    }
}
