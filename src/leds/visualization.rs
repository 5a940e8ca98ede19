use std::{
    collections::BTreeMap,
    f32::consts::PI,
    time::{Duration, Instant},
};

use crate::{
    color,
    grid::{self, GridLayout, JournalEntry},
    models::{self, Color},
};

/// A lit cell of a visualization frame, keyed by logical index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualizationCell {
    pub color: Color,
    pub brightness: f32,
}

impl VisualizationCell {
    pub fn scaled(&self) -> Color {
        color::scale(self.color, self.brightness)
    }
}

struct TypeGroup {
    kind: String,
    cells: Vec<(usize, Color)>,
}

/// Cycles a highlight over the entry types present on the grid
///
/// Each type gets an equal share of the cycle, during which its cells ramp from the low to
/// the high brightness and back on a half sine. All other cells sit at the ambient level.
pub struct VisualizationEngine {
    groups: Vec<TypeGroup>,
    started_at: Instant,
    cycle_duration: Duration,
    low: f32,
    high: f32,
    ambient: f32,
}

impl VisualizationEngine {
    pub fn new(
        entries: &[JournalEntry],
        layout: &GridLayout,
        config: &models::Leds,
        started_at: Instant,
    ) -> Self {
        let mut this = Self {
            groups: Vec::new(),
            started_at,
            cycle_duration: config.cycle_duration(),
            low: config.filtered_brightness,
            high: config.selected_brightness,
            ambient: config.ambient_brightness,
        };

        this.set_entries(entries, layout, &config.palette);
        this
    }

    /// Replaces the entry set without restarting the cycle
    pub fn set_entries(
        &mut self,
        entries: &[JournalEntry],
        layout: &GridLayout,
        palette: &BTreeMap<String, Color>,
    ) {
        let indices = grid::logical_indices(entries);
        let mut groups: BTreeMap<&str, Vec<(usize, Color)>> = BTreeMap::new();

        for entry in entries {
            let Some(&logical) = indices.get(&entry.id) else {
                continue;
            };

            if layout.physical_index(logical).is_none() {
                trace!(id = %entry.id, logical, "entry does not fit on the grid");
                continue;
            }

            let color = entry
                .color
                .or_else(|| palette.get(&entry.kind).copied())
                .unwrap_or(color::WHITE);

            groups.entry(entry.kind.as_str()).or_default().push((logical, color));
        }

        self.groups = groups
            .into_iter()
            .map(|(kind, cells)| TypeGroup {
                kind: kind.to_owned(),
                cells,
            })
            .collect();

        debug!(
            entries = entries.len(),
            types = self.groups.len(),
            "visualization entries updated"
        );
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Index of the highlighted group and the position within its slot, in `[0, 1)`
    fn phase(&self, now: Instant) -> Option<(usize, f32)> {
        if self.groups.is_empty() {
            return None;
        }

        let cycle = self.cycle_duration.as_millis().max(1);
        let offset = (self.elapsed(now).as_millis() % cycle) as f32 / cycle as f32;
        let position = offset * self.groups.len() as f32;

        let index = (position.floor() as usize).min(self.groups.len() - 1);
        Some((index, position - index as f32))
    }

    pub fn highlighted_type(&self, now: Instant) -> Option<&str> {
        self.phase(now)
            .map(|(index, _)| self.groups[index].kind.as_str())
    }

    pub fn tick(&self, now: Instant) -> BTreeMap<usize, VisualizationCell> {
        let Some((highlighted, local)) = self.phase(now) else {
            return BTreeMap::new();
        };

        let ramp = self.low + (local * PI).sin() * (self.high - self.low);

        let mut frame = BTreeMap::new();
        for (i, group) in self.groups.iter().enumerate() {
            let brightness = if i == highlighted { ramp } else { self.ambient };

            for &(index, color) in &group.cells {
                frame.insert(index, VisualizationCell { color, brightness });
            }
        }

        frame
    }
}
