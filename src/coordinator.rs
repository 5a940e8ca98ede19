use std::time::Duration;

use thiserror::Error;
use tokio::{
    select,
    sync::{broadcast, mpsc, oneshot},
    time::MissedTickBehavior,
};

use crate::{
    api::{LedCommand, LedReply},
    leds::{LedModeManager, LedOutput},
    models::Config,
    scan::ScanEvent,
};

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// Single owner of the LED state
///
/// Commands, scan events, inactivity checks, animation frames and device rewrites are all
/// serialized through [Coordinator::run].
pub struct Coordinator {
    manager: LedModeManager,
    handle_rx: mpsc::Receiver<CoordinatorMessage>,
    scan_rx: mpsc::Receiver<ScanEvent>,
    scan_tx: broadcast::Sender<ScanEvent>,
    check_interval: Duration,
    frame_interval: Duration,
}

impl Coordinator {
    pub fn new(
        config: &Config,
        output: LedOutput,
        scan_rx: mpsc::Receiver<ScanEvent>,
    ) -> (Self, CoordinatorHandle) {
        let manager = LedModeManager::new(config.grid.layout(), config.leds.clone(), output, now());

        let (tx, handle_rx) = mpsc::channel(4);
        let (scan_tx, _) = broadcast::channel(config.scan.queue_capacity as usize);

        let handle = CoordinatorHandle {
            tx,
            scan_tx: scan_tx.clone(),
        };

        (
            Self {
                manager,
                handle_rx,
                scan_rx,
                scan_tx,
                check_interval: config.leds.check_interval(),
                frame_interval: config.leds.frame_interval(),
            },
            handle,
        )
    }

    async fn handle_command(&mut self, command: LedCommand) -> LedReply {
        let now = now();

        match command {
            LedCommand::UpdateInteractive { entries } => {
                self.manager.update_interactive(entries, now).await;
            }

            LedCommand::SetMode {
                mode,
                all_entries,
                interactive_led_data,
            } => {
                if let Err(error) = self
                    .manager
                    .set_mode_str(&mode, all_entries, interactive_led_data, now)
                    .await
                {
                    warn!(error = %error, "rejected mode change");
                    return LedReply::error(&error);
                }
            }

            LedCommand::ClearAll => {
                self.manager.clear_all().await;
            }

            LedCommand::Activity => {
                self.manager.record_activity(now).await;
            }

            LedCommand::SetBrightness { brightness } => {
                self.manager.set_brightness(brightness, now).await;
            }

            LedCommand::GetStatus => {
                return LedReply::success(Some(self.manager.status(now)));
            }
        }

        LedReply::success(None)
    }

    async fn handle_message(&mut self, message: CoordinatorMessage) -> CoordinatorControl {
        // ok: the coordinator shouldn't care if the receiver dropped

        match message {
            CoordinatorMessage::Command(command, tx) => {
                let reply = self.handle_command(command).await;
                tx.send(reply).ok();
            }
            CoordinatorMessage::Stop(tx) => {
                self.manager.clear_all().await;
                tx.send(()).ok();
                return CoordinatorControl::Break;
            }
        }

        CoordinatorControl::Continue
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        let mut checks = tokio::time::interval(self.check_interval);
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut frames = tokio::time::interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut scans_open = true;

        info!("starting LED coordinator");

        loop {
            let visualization_tick = self.manager.next_visualization_tick();

            select! {
                _ = self.manager.update_device() => {
                    trace!("device update");
                },
                _ = checks.tick() => {
                    self.manager.tick(now()).await;
                },
                _ = frames.tick(), if visualization_tick.is_some() => {
                    if let Some(tick) = visualization_tick {
                        self.manager.on_visualization_tick(tick, now()).await;
                    }
                },
                event = self.scan_rx.recv(), if scans_open => {
                    if let Some(event) = event {
                        debug!(tag_id = %event.tag_id, "forwarding scan event");
                        // ok: nobody listening is not an error
                        self.scan_tx.send(event).ok();
                    } else {
                        debug!("scan event source closed");
                        scans_open = false;
                    }
                },
                message = self.handle_rx.recv() => {
                    trace!(message = ?message, "handle_rx msg");

                    if let Some(message) = message {
                        if CoordinatorControl::Break == self.handle_message(message).await {
                            break;
                        }
                    } else {
                        // All handles dropped
                        self.manager.clear_all().await;
                        break;
                    }
                }
            }
        }

        info!("stopped LED coordinator");
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("mode", &self.manager.mode())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CoordinatorControl {
    Continue,
    Break,
}

#[derive(Debug)]
enum CoordinatorMessage {
    Command(LedCommand, oneshot::Sender<LedReply>),
    Stop(oneshot::Sender<()>),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("the LED coordinator is no longer running")]
    Dropped,
}

impl<T> From<mpsc::error::SendError<T>> for CoordinatorError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Dropped
    }
}

impl From<oneshot::error::RecvError> for CoordinatorError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Dropped
    }
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMessage>,
    scan_tx: broadcast::Sender<ScanEvent>,
}

impl CoordinatorHandle {
    pub async fn command(&self, command: LedCommand) -> Result<LedReply, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(CoordinatorMessage::Command(command, tx)).await?;
        Ok(rx.await?)
    }

    /// Tag arrivals, in detection order
    pub fn subscribe_scans(&self) -> broadcast::Receiver<ScanEvent> {
        self.scan_tx.subscribe()
    }

    /// Turns the LEDs off and ends the coordinator
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(CoordinatorMessage::Stop(tx)).await?;
        Ok(rx.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        color,
        leds::{testing::RecordingDevice, InteractiveEntry, LedMode, LedStatus},
        models::{self, Color},
    };

    struct Fixture {
        handle: CoordinatorHandle,
        recording: RecordingDevice,
        scan_tx: mpsc::Sender<ScanEvent>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(config: Config) -> Fixture {
        let recording = RecordingDevice::default();
        let (scan_tx, scan_rx) = mpsc::channel(4);
        let (coordinator, handle) = Coordinator::new(
            &config,
            recording.output(config.grid.layout().capacity()),
            scan_rx,
        );

        Fixture {
            handle,
            recording,
            scan_tx,
            task: tokio::spawn(coordinator.run()),
        }
    }

    async fn status(handle: &CoordinatorHandle) -> LedStatus {
        match handle.command(LedCommand::GetStatus).await.unwrap() {
            LedReply::SuccessResponse {
                status: Some(status),
                ..
            } => status,
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    fn update() -> LedCommand {
        LedCommand::UpdateInteractive {
            entries: vec![
                InteractiveEntry::new(10, Color::new(0, 255, 0), false),
                InteractiveEntry::new(30, Color::new(255, 255, 0), true),
            ],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_applied_in_order() {
        let fixture = start(Config::default());

        assert!(fixture.handle.command(update()).await.unwrap().is_success());

        let snapshot = status(&fixture.handle).await;
        assert_eq!(snapshot.lit_count, 2);
        assert_eq!(snapshot.selected_index, Some(30));
        assert_eq!(snapshot.current_mode, LedMode::Interactive);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_mode_reply() {
        let fixture = start(Config::default());

        let reply = fixture
            .handle
            .command(LedCommand::SetMode {
                mode: "disco".to_owned(),
                all_entries: None,
                interactive_led_data: None,
            })
            .await
            .unwrap();

        assert_eq!(reply, LedReply::error(&"unknown LED mode 'disco'"));
        assert_eq!(
            status(&fixture.handle).await.current_mode,
            LedMode::Interactive
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_grid_starts_animating() {
        let fixture = start(Config {
            leds: models::Leds {
                inactivity_timeout: 5000,
                check_interval: 1000,
                ..Default::default()
            },
            ..Default::default()
        });

        fixture.handle.command(update()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(
            status(&fixture.handle).await.current_mode,
            LedMode::Interactive
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snapshot = status(&fixture.handle).await;
        assert_eq!(snapshot.current_mode, LedMode::Visualization);
        assert!(snapshot.visualization.is_some());

        // Frames keep coming while the visualization runs
        let writes = fixture.recording.write_count();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(fixture.recording.write_count() > writes);

        fixture.handle.command(LedCommand::Activity).await.unwrap();
        assert_eq!(
            status(&fixture.handle).await.current_mode,
            LedMode::Interactive
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scan_events_are_broadcast() {
        let fixture = start(Config::default());
        let mut scans = fixture.handle.subscribe_scans();

        fixture
            .scan_tx
            .send(ScanEvent::new("04:A2:2B:1A"))
            .await
            .unwrap();

        assert_eq!(scans.recv().await.unwrap().tag_id, "04:A2:2B:1A");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_the_grid() {
        let fixture = start(Config::default());
        fixture.handle.command(update()).await.unwrap();

        fixture.handle.stop().await.unwrap();
        fixture.task.await.unwrap();

        assert!(fixture
            .recording
            .last_frame()
            .unwrap()
            .iter()
            .all(|pixel| color::is_black(*pixel)));
        assert!(matches!(
            fixture.handle.command(LedCommand::GetStatus).await,
            Err(CoordinatorError::Dropped)
        ));
    }
}
