use async_trait::async_trait;
use thiserror::Error;

use crate::models::{self, Color};

mod common;

// Device implementation modules

mod dummy;
mod ws2812spi;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not supported: {0}")]
    NotSupported(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait DeviceImpl: Send {
    /// Set the device implementation's view of the LED data to the given values
    ///
    /// # Panics
    ///
    /// Implementations are allowed to panic if led_data.len() != led_count. The [Device]
    /// wrapper is responsible for ensuring the given slice is the right size.
    async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError>;

    /// Update the device implementation's temporal data. For devices that require regular rewrites
    /// (regardless of actual changes in the LED data), this should return a future that performs
    /// the required work.
    async fn update(&mut self) -> Result<(), DeviceError>;
}

/// The physical pixel buffer, in wiring order
pub struct Device {
    name: String,
    inner: Box<dyn DeviceImpl>,
    led_data: Vec<Color>,
    notified_inconsistent_led_data: bool,
}

impl Device {
    fn build_inner(
        config: models::Device,
        led_count: usize,
    ) -> Result<Box<dyn DeviceImpl>, DeviceError> {
        let inner: Box<dyn DeviceImpl> = match config {
            models::Device::Dummy(dummy) => Box::new(dummy::DummyDevice::create(dummy, led_count)?),
            models::Device::Ws2812Spi(ws2812spi) => Box::new(ws2812spi::Ws2812SpiDevice::create(
                ws2812spi, led_count,
            )?),
        };

        Ok(inner)
    }

    #[instrument(skip(config))]
    pub fn new(name: &str, config: models::Device, led_count: usize) -> Result<Self, DeviceError> {
        let inner = Self::build_inner(config, led_count)?;
        Ok(Self::with_impl(name, inner, led_count))
    }

    pub fn with_impl(name: &str, inner: Box<dyn DeviceImpl>, led_count: usize) -> Self {
        Self {
            name: name.to_owned(),
            inner,
            led_data: vec![Default::default(); led_count],
            notified_inconsistent_led_data: false,
        }
    }

    #[instrument(skip(led_data))]
    pub async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError> {
        let led_count = led_data.len();
        let hw_led_count = self.led_data.len();

        if led_count == hw_led_count {
            self.led_data.copy_from_slice(led_data);
            self.notified_inconsistent_led_data = false;
        } else if led_count > hw_led_count {
            self.led_data.copy_from_slice(&led_data[..hw_led_count]);

            if !self.notified_inconsistent_led_data {
                self.notified_inconsistent_led_data = true;
                warn!(
                    "too much LED data for device: {} extra",
                    led_count - hw_led_count
                );
            }
        } else {
            self.led_data[..led_count].copy_from_slice(led_data);
            self.led_data[led_count..].fill(Default::default());

            if !self.notified_inconsistent_led_data {
                self.notified_inconsistent_led_data = true;
                warn!(
                    "not enough LED data for device: {} missing",
                    hw_led_count - led_count
                );
            }
        }

        // Some devices write immediately
        self.inner.set_led_data(&self.led_data).await
    }

    #[instrument]
    pub async fn update(&mut self) -> Result<(), DeviceError> {
        self.inner.update().await
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("name", &self.name).finish()
    }
}

/// A device that may have failed initializing
///
/// Without hardware the coordination logic keeps running and every write is a no-op.
pub struct LedOutput {
    inner: Result<Device, DeviceError>,
}

impl LedOutput {
    pub fn is_available(&self) -> bool {
        self.inner.is_ok()
    }

    pub async fn update(&mut self) -> Result<(), DeviceError> {
        if let Ok(device) = &mut self.inner {
            device.update().await
        } else {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    pub async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError> {
        if let Ok(device) = &mut self.inner {
            device.set_led_data(led_data).await
        } else {
            Ok(())
        }
    }

    /// Drops the device after a failed update, later writes are no-ops
    pub fn disable(&mut self, error: DeviceError) {
        self.inner = Err(error);
    }
}

impl From<Result<Device, DeviceError>> for LedOutput {
    fn from(inner: Result<Device, DeviceError>) -> Self {
        if let Err(error) = &inner {
            error!(error = %error, "LED device unavailable, running without hardware");
        }

        Self { inner }
    }
}

impl From<Device> for LedOutput {
    fn from(device: Device) -> Self {
        Self { inner: Ok(device) }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Recording {
        frames: Vec<Vec<Color>>,
        fail: bool,
    }

    /// Records every frame written to it
    #[derive(Clone, Default)]
    pub struct RecordingDevice(Arc<Mutex<Recording>>);

    impl RecordingDevice {
        pub fn output(&self, led_count: usize) -> LedOutput {
            Device::with_impl("recording", Box::new(self.clone()), led_count).into()
        }

        pub fn frames(&self) -> Vec<Vec<Color>> {
            self.0.lock().unwrap().frames.clone()
        }

        pub fn write_count(&self) -> usize {
            self.0.lock().unwrap().frames.len()
        }

        pub fn last_frame(&self) -> Option<Vec<Color>> {
            self.0.lock().unwrap().frames.last().cloned()
        }

        pub fn set_failing(&self, fail: bool) {
            self.0.lock().unwrap().fail = fail;
        }
    }

    #[async_trait]
    impl DeviceImpl for RecordingDevice {
        async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError> {
            let mut recording = self.0.lock().unwrap();
            if recording.fail {
                return Err(DeviceError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "strip unplugged",
                )));
            }

            recording.frames.push(led_data.to_vec());
            Ok(())
        }

        async fn update(&mut self) -> Result<(), DeviceError> {
            futures::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::RecordingDevice, *};

    #[tokio::test]
    async fn pads_short_frames() {
        let recording = RecordingDevice::default();
        let mut output = recording.output(4);

        let red = Color::new(255, 0, 0);
        output.set_led_data(&[red, red]).await.unwrap();

        assert_eq!(
            recording.last_frame().unwrap(),
            vec![red, red, Color::default(), Color::default()]
        );
    }

    #[tokio::test]
    async fn unavailable_output_swallows_writes() {
        let mut output = LedOutput::from(Err(DeviceError::NotSupported("test")));

        assert!(!output.is_available());
        assert!(output.set_led_data(&[Color::default()]).await.is_ok());
    }
}
