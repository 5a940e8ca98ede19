use async_trait::async_trait;
use tokio::time::Instant;

use super::{DeviceError, DeviceImpl};
use crate::models::{Color, DeviceConfig};

/// A device whose frames are pushed out by an explicit write
#[async_trait]
pub trait WritingDevice: Send + Sized {
    type Config: DeviceConfig;

    fn new(config: &Self::Config, led_count: usize) -> Result<Self, DeviceError>;

    async fn set_led_data(
        &mut self,
        config: &Self::Config,
        led_data: &[Color],
    ) -> Result<(), DeviceError>;

    async fn write(&mut self) -> Result<(), DeviceError>;
}

/// Writes every frame immediately, then again every `rewrite_time` if configured
pub struct Rewriter<D: WritingDevice> {
    inner: D,
    config: D::Config,
    last_write_time: Option<Instant>,
}

impl<D: WritingDevice> Rewriter<D> {
    pub fn create(config: D::Config, led_count: usize) -> Result<Self, DeviceError> {
        let inner = D::new(&config, led_count)?;

        Ok(Self {
            inner,
            config,
            last_write_time: None,
        })
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        self.inner.write().await?;
        self.last_write_time = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl<D: WritingDevice> DeviceImpl for Rewriter<D> {
    async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError> {
        self.inner.set_led_data(&self.config, led_data).await?;

        // Immediately write to device
        self.write().await?;

        Ok(())
    }

    async fn update(&mut self) -> Result<(), DeviceError> {
        if let Some(rewrite_time) = self.config.rewrite_time() {
            let now = Instant::now();
            let next_rewrite_time = self
                .last_write_time
                .map(|lwt| lwt + rewrite_time)
                .unwrap_or(now);

            // Wait until the next rewrite cycle if necessary
            if next_rewrite_time > now {
                tokio::time::sleep_until(next_rewrite_time).await;
            }

            self.write().await
        } else {
            futures::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models;

    struct Counter {
        writes: usize,
    }

    #[async_trait]
    impl WritingDevice for Counter {
        type Config = models::Dummy;

        fn new(_config: &Self::Config, _led_count: usize) -> Result<Self, DeviceError> {
            Ok(Self { writes: 0 })
        }

        async fn set_led_data(
            &mut self,
            _config: &Self::Config,
            _led_data: &[Color],
        ) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn write(&mut self) -> Result<(), DeviceError> {
            self.writes += 1;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rewrites_after_rewrite_time() {
        let config = models::Dummy {
            rewrite_time: 1000,
            ..Default::default()
        };
        let mut device = Rewriter::<Counter>::create(config, 2).unwrap();

        device.set_led_data(&[Color::default(); 2]).await.unwrap();
        assert_eq!(device.inner.writes, 1);

        let start = Instant::now();
        device.update().await.unwrap();
        assert_eq!(device.inner.writes, 2);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn no_rewrites_without_rewrite_time() {
        let mut device = Rewriter::<Counter>::create(models::Dummy::default(), 2).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(60), device.update()).await;
        assert!(result.is_err());
        assert_eq!(device.inner.writes, 0);
    }
}
