use serde_derive::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::models::Color;

mod device;
pub use device::*;

mod manager;
pub use manager::*;

mod visualization;
pub use visualization::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedError {
    #[error("unknown LED mode '{0}'")]
    InvalidMode(String),
}

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedMode {
    /// The grid mirrors the dashboard's filtered and selected entries
    #[default]
    Interactive,
    /// The grid runs an animation on its own
    Visualization,
}

impl LedMode {
    pub fn parse(mode: &str) -> Result<Self, LedError> {
        mode.parse()
            .map_err(|_| LedError::InvalidMode(mode.to_owned()))
    }
}

/// One lit cell of an interactive update, as sent by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveEntry {
    #[serde(rename = "index")]
    pub logical_index: usize,
    #[serde(
        serialize_with = "crate::color::serialize_hex",
        deserialize_with = "crate::color::deserialize_hex"
    )]
    pub color: Color,
    #[serde(default)]
    pub is_selected: bool,
}

impl InteractiveEntry {
    pub fn new(logical_index: usize, color: Color, is_selected: bool) -> Self {
        Self {
            logical_index,
            color,
            is_selected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractiveCell {
    pub color: Color,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationStatus {
    pub highlighted_type: Option<String>,
    pub elapsed_ms: u64,
    pub auto_off_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedStatus {
    pub hardware_available: bool,
    pub total_pixels: usize,
    pub lit_count: usize,
    pub selected_index: Option<usize>,
    pub current_mode: LedMode,
    pub brightness: f32,
    pub visualization: Option<VisualizationStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings() {
        assert_eq!(LedMode::parse("interactive"), Ok(LedMode::Interactive));
        assert_eq!(LedMode::parse("visualization"), Ok(LedMode::Visualization));
        assert_eq!(
            LedMode::parse("disco"),
            Err(LedError::InvalidMode("disco".to_owned()))
        );
        assert_eq!(LedMode::Visualization.to_string(), "visualization");
        assert_eq!(
            serde_json::to_string(&LedMode::Interactive).unwrap(),
            "\"interactive\""
        );
    }

    #[test]
    fn interactive_entry_wire_format() {
        let entry: InteractiveEntry =
            serde_json::from_str(r##"{"index": 30, "color": "#FFFF00", "isSelected": true}"##)
                .unwrap();

        assert_eq!(entry, InteractiveEntry::new(30, Color::new(255, 255, 0), true));

        let entry: InteractiveEntry =
            serde_json::from_str(r##"{"index": 10, "color": "#00FF00"}"##).unwrap();
        assert!(!entry.is_selected);
    }
}
