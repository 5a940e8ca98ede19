use std::{collections::BTreeMap, time::Instant};

use super::{
    InteractiveCell, InteractiveEntry, LedError, LedMode, LedOutput, LedStatus,
    VisualizationEngine, VisualizationStatus,
};
use crate::{
    color,
    grid::{GridLayout, JournalEntry},
    models::{self, Color},
};

/// Ticket for one animation frame, valid until the visualization is stopped or restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualizationTick {
    generation: u64,
}

/// Owns the LED output and decides what it shows
///
/// Exactly one source drives the pixels at a time: the retained interactive frame, or the
/// visualization engine of the current generation.
pub struct LedModeManager {
    layout: GridLayout,
    config: models::Leds,
    output: LedOutput,
    mode: LedMode,
    last_activity_at: Instant,
    interactive_frame: BTreeMap<usize, InteractiveCell>,
    all_entries: Vec<JournalEntry>,
    visualization: Option<VisualizationEngine>,
    generation: u64,
    brightness: f32,
    displayed: Vec<Color>,
}

fn interactive_frame(entries: &[InteractiveEntry]) -> BTreeMap<usize, InteractiveCell> {
    let mut frame = BTreeMap::new();
    let mut selected = None;
    let mut selected_count = 0;

    for entry in entries {
        frame.insert(
            entry.logical_index,
            InteractiveCell {
                color: entry.color,
                selected: false,
            },
        );

        if entry.is_selected {
            selected = Some(entry.logical_index);
            selected_count += 1;
        }
    }

    if selected_count > 1 {
        warn!(
            count = selected_count,
            kept = ?selected,
            "multiple selected entries, keeping the last one"
        );
    }

    if let Some(cell) = selected.and_then(|index| frame.get_mut(&index)) {
        cell.selected = true;
    }

    frame
}

impl LedModeManager {
    pub fn new(layout: GridLayout, config: models::Leds, output: LedOutput, now: Instant) -> Self {
        let brightness = config.brightness;

        Self {
            layout,
            config,
            output,
            mode: LedMode::Interactive,
            last_activity_at: now,
            interactive_frame: BTreeMap::new(),
            all_entries: Vec::new(),
            visualization: None,
            generation: 0,
            brightness,
            displayed: vec![color::BLACK; layout.capacity()],
        }
    }

    pub fn mode(&self) -> LedMode {
        self.mode
    }

    fn interactive_pixels(&self) -> Vec<Color> {
        self.layout
            .render(self.interactive_frame.iter().map(|(&index, cell)| {
                let factor = if cell.selected {
                    self.config.selected_brightness
                } else {
                    self.config.filtered_brightness
                };

                (index, color::scale(cell.color, factor))
            }))
    }

    fn visualization_pixels(&self, engine: &VisualizationEngine, now: Instant) -> Vec<Color> {
        self.layout.render(
            engine
                .tick(now)
                .into_iter()
                .map(|(index, cell)| (index, cell.scaled())),
        )
    }

    /// Sends a full frame to the device
    ///
    /// A failed write is not retried, the next frame resynchronizes the strip. `displayed`
    /// only tracks frames the device accepted.
    async fn write(&mut self, pixels: Vec<Color>) {
        let pixels: Vec<Color> = pixels
            .into_iter()
            .map(|pixel| color::scale(pixel, self.brightness))
            .collect();

        match self.output.set_led_data(&pixels).await {
            Ok(()) => self.displayed = pixels,
            Err(error) => warn!(error = %error, "failed to write LED frame"),
        }
    }

    async fn start_visualization(&mut self, now: Instant) {
        self.generation += 1;

        let engine = VisualizationEngine::new(&self.all_entries, &self.layout, &self.config, now);
        let pixels = self.visualization_pixels(&engine, now);

        self.visualization = Some(engine);
        self.mode = LedMode::Visualization;

        info!(
            generation = self.generation,
            entries = self.all_entries.len(),
            "entering visualization mode"
        );

        self.write(pixels).await;
    }

    fn stop_visualization(&mut self) {
        if self.visualization.take().is_some() {
            self.generation += 1;
            debug!(generation = self.generation, "stopped visualization");
        }
    }

    async fn enter_interactive(&mut self, entries: Option<Vec<InteractiveEntry>>, now: Instant) {
        self.stop_visualization();

        if let Some(entries) = entries {
            self.interactive_frame = interactive_frame(&entries);
        }

        self.mode = LedMode::Interactive;
        self.last_activity_at = now;

        info!(cells = self.interactive_frame.len(), "entering interactive mode");

        let pixels = self.interactive_pixels();
        self.write(pixels).await;
    }

    /// Replaces the retained interactive frame, showing it unless the visualization runs
    pub async fn update_interactive(&mut self, entries: Vec<InteractiveEntry>, now: Instant) {
        self.interactive_frame = interactive_frame(&entries);
        self.last_activity_at = now;

        match self.mode {
            LedMode::Interactive => {
                let pixels = self.interactive_pixels();
                self.write(pixels).await;
            }
            LedMode::Visualization => {
                debug!(
                    cells = self.interactive_frame.len(),
                    "stored interactive frame during visualization"
                );
            }
        }
    }

    pub async fn set_mode_str(
        &mut self,
        mode: &str,
        all_entries: Option<Vec<JournalEntry>>,
        interactive_entries: Option<Vec<InteractiveEntry>>,
        now: Instant,
    ) -> Result<(), LedError> {
        let mode = LedMode::parse(mode)?;
        self.set_mode(mode, all_entries, interactive_entries, now)
            .await;
        Ok(())
    }

    pub async fn set_mode(
        &mut self,
        mode: LedMode,
        all_entries: Option<Vec<JournalEntry>>,
        interactive_entries: Option<Vec<InteractiveEntry>>,
        now: Instant,
    ) {
        if let Some(all_entries) = all_entries {
            self.all_entries = all_entries;

            if let Some(engine) = &mut self.visualization {
                engine.set_entries(&self.all_entries, &self.layout, &self.config.palette);
            }
        }

        match (self.mode, mode) {
            (LedMode::Interactive, LedMode::Interactive) => {
                if let Some(entries) = interactive_entries {
                    self.update_interactive(entries, now).await;
                } else {
                    self.last_activity_at = now;
                }
            }

            (LedMode::Interactive, LedMode::Visualization) => {
                if let Some(entries) = interactive_entries {
                    self.interactive_frame = interactive_frame(&entries);
                }

                self.start_visualization(now).await;
            }

            (LedMode::Visualization, LedMode::Visualization) => {
                if let Some(entries) = interactive_entries {
                    self.interactive_frame = interactive_frame(&entries);
                }

                // Wake up after auto-off
                if self.visualization.is_none() {
                    self.start_visualization(now).await;
                }
            }

            (LedMode::Visualization, LedMode::Interactive) => {
                self.enter_interactive(interactive_entries, now).await;
            }
        }
    }

    /// User interaction on the dashboard
    pub async fn record_activity(&mut self, now: Instant) {
        self.last_activity_at = now;

        if self.mode == LedMode::Visualization {
            self.enter_interactive(None, now).await;
        }
    }

    /// Turns every pixel off, without changing the mode
    pub async fn clear_all(&mut self) {
        info!("clearing all LEDs");
        self.write(vec![color::BLACK; self.layout.capacity()]).await;
    }

    pub async fn set_brightness(&mut self, brightness: f32, now: Instant) {
        if brightness.is_nan() {
            warn!("ignoring NaN brightness");
            return;
        }

        self.brightness = brightness.clamp(0.0, 1.0);
        debug!(brightness = self.brightness, "master brightness changed");

        let pixels = match (self.mode, &self.visualization) {
            (LedMode::Interactive, _) => self.interactive_pixels(),
            (LedMode::Visualization, Some(engine)) => self.visualization_pixels(engine, now),
            // Dormant visualization stays dark
            (LedMode::Visualization, None) => return,
        };

        self.write(pixels).await;
    }

    /// Periodic inactivity and auto-off check
    pub async fn tick(&mut self, now: Instant) {
        match self.mode {
            LedMode::Interactive => {
                let Some(timeout) = self.config.inactivity_timeout() else {
                    return;
                };

                let idle = now.saturating_duration_since(self.last_activity_at);
                if idle >= timeout {
                    info!(idle = ?idle, "no activity, starting visualization");
                    self.start_visualization(now).await;
                }
            }

            LedMode::Visualization => {
                let (Some(auto_off), Some(engine)) = (self.config.auto_off(), &self.visualization)
                else {
                    return;
                };

                if engine.elapsed(now) >= auto_off {
                    info!(after = ?auto_off, "visualization auto-off");
                    self.stop_visualization();
                    self.write(vec![color::BLACK; self.layout.capacity()]).await;
                }
            }
        }
    }

    /// The ticket for the next animation frame, if the visualization is running
    pub fn next_visualization_tick(&self) -> Option<VisualizationTick> {
        match (self.mode, &self.visualization) {
            (LedMode::Visualization, Some(_)) => Some(VisualizationTick {
                generation: self.generation,
            }),
            _ => None,
        }
    }

    /// Renders one animation frame. Returns `false` if `tick` was superseded.
    pub async fn on_visualization_tick(&mut self, tick: VisualizationTick, now: Instant) -> bool {
        if tick != (VisualizationTick { generation: self.generation }) {
            trace!(
                tick = tick.generation,
                current = self.generation,
                "dropping stale visualization tick"
            );
            return false;
        }

        let pixels = match (self.mode, &self.visualization) {
            (LedMode::Visualization, Some(engine)) => self.visualization_pixels(engine, now),
            _ => return false,
        };

        self.write(pixels).await;
        true
    }

    /// Waits for and performs periodic device rewrites
    pub async fn update_device(&mut self) {
        if let Err(error) = self.output.update().await {
            // A device update shouldn't error, disable it
            error!(error = %error, "device update failed, disabling device");
            self.output.disable(error);
        }
    }

    pub fn status(&self, now: Instant) -> LedStatus {
        let visualization = match self.mode {
            LedMode::Interactive => None,
            LedMode::Visualization => {
                let engine = self.visualization.as_ref();
                let elapsed = engine.map(|engine| engine.elapsed(now)).unwrap_or_default();

                Some(VisualizationStatus {
                    highlighted_type: engine
                        .and_then(|engine| engine.highlighted_type(now))
                        .map(str::to_owned),
                    elapsed_ms: elapsed.as_millis() as u64,
                    auto_off_remaining_ms: engine.and(self.config.auto_off()).map(|auto_off| {
                        auto_off.saturating_sub(elapsed).as_millis() as u64
                    }),
                })
            }
        };

        LedStatus {
            hardware_available: self.output.is_available(),
            total_pixels: self.layout.capacity(),
            lit_count: self
                .displayed
                .iter()
                .filter(|pixel| !color::is_black(**pixel))
                .count(),
            selected_index: self
                .interactive_frame
                .iter()
                .find(|(_, cell)| cell.selected)
                .map(|(&index, _)| index),
            current_mode: self.mode,
            brightness: self.brightness,
            visualization,
        }
    }
}
