use std::{collections::BTreeMap, path::Path, time::Duration};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::grid::GridLayout;

mod devices;
pub use devices::*;

pub type Color = palette::rgb::LinSrgb<u8>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_true() -> bool {
    true
}

fn millis(value: u32) -> Duration {
    Duration::from_millis(value as _)
}

/// `0` means disabled
fn optional_millis(value: u32) -> Option<Duration> {
    if value == 0 {
        None
    } else {
        Some(millis(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Grid {
    #[validate(range(min = 1))]
    pub rows: u32,
    #[validate(range(min = 1))]
    pub cols: u32,
    #[serde(default = "default_true")]
    pub serpentine: bool,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 20,
            serpentine: true,
        }
    }
}

impl Grid {
    pub fn layout(&self) -> GridLayout {
        GridLayout {
            rows: self.rows as _,
            cols: self.cols as _,
            serpentine: self.serpentine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Scan {
    /// Continuous absence in milliseconds before a tag counts as removed
    pub grace_period: u32,
    #[validate(range(min = 10))]
    pub poll_interval: u32,
    #[validate(range(min = 1))]
    pub queue_capacity: u32,
    /// Usable NDEF capacity of the tags in bytes (NTAG213: 144)
    #[validate(range(min = 16, max = 888))]
    pub max_tag_data_size: u32,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            grace_period: 1500,
            poll_interval: 100,
            queue_capacity: 16,
            max_tag_data_size: 144,
        }
    }
}

impl Scan {
    pub fn grace_period(&self) -> Duration {
        millis(self.grace_period)
    }

    pub fn poll_interval(&self) -> Duration {
        millis(self.poll_interval)
    }
}

fn default_palette() -> BTreeMap<String, Color> {
    [
        ("Beach", Color::new(255, 160, 40)),
        ("Desert", Color::new(255, 90, 60)),
        ("Lake", Color::new(0, 180, 200)),
        ("Mountain", Color::new(80, 200, 120)),
        ("River", Color::new(90, 90, 255)),
        ("Ruin", Color::new(180, 60, 220)),
    ]
    .into_iter()
    .map(|(name, color)| (name.to_owned(), color))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Leds {
    /// Idle time in milliseconds before switching to the visualization, `0` to disable
    pub inactivity_timeout: u32,
    #[validate(range(min = 100))]
    pub check_interval: u32,
    #[validate(range(min = 10))]
    pub frame_interval: u32,
    #[validate(range(min = 1000))]
    pub cycle_duration: u32,
    /// Running time in milliseconds after which the visualization goes dark, `0` to disable
    pub auto_off: u32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub selected_brightness: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub filtered_brightness: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub ambient_brightness: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub brightness: f32,
    #[serde(
        serialize_with = "crate::color::serialize_palette",
        deserialize_with = "crate::color::deserialize_palette"
    )]
    pub palette: BTreeMap<String, Color>,
}

impl Default for Leds {
    fn default() -> Self {
        Self {
            inactivity_timeout: 5 * 60 * 1000,
            check_interval: 2000,
            frame_interval: 100,
            cycle_duration: 15000,
            auto_off: 15 * 60 * 1000,
            selected_brightness: 0.8,
            filtered_brightness: 0.05,
            ambient_brightness: 0.02,
            brightness: 1.0,
            palette: default_palette(),
        }
    }
}

impl Leds {
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        optional_millis(self.inactivity_timeout)
    }

    pub fn check_interval(&self) -> Duration {
        millis(self.check_interval)
    }

    pub fn frame_interval(&self) -> Duration {
        millis(self.frame_interval)
    }

    pub fn cycle_duration(&self) -> Duration {
        millis(self.cycle_duration)
    }

    pub fn auto_off(&self) -> Option<Duration> {
        optional_millis(self.auto_off)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[validate(nested)]
    pub grid: Grid,
    #[validate(nested)]
    pub scan: Scan,
    #[validate(nested)]
    pub leds: Leds,
    #[validate(nested)]
    pub device: Device,
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let full = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&full)
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
