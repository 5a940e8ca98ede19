use async_trait::async_trait;

use super::{common::*, DeviceError};
use crate::{color, models};

pub type DummyDevice = Rewriter<DummyDeviceImpl>;

/// Logs frames instead of driving hardware
pub struct DummyDeviceImpl {
    leds: Vec<models::Color>,
    mode: models::DummyDeviceMode,
    ansi_buf: String,
}

#[async_trait]
impl WritingDevice for DummyDeviceImpl {
    type Config = models::Dummy;

    fn new(config: &Self::Config, led_count: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            leds: vec![Default::default(); led_count],
            mode: config.mode,
            ansi_buf: String::new(),
        })
    }

    async fn set_led_data(
        &mut self,
        _config: &Self::Config,
        led_data: &[models::Color],
    ) -> Result<(), DeviceError> {
        self.leds.copy_from_slice(led_data);
        Ok(())
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        match self.mode {
            models::DummyDeviceMode::Text => {
                let lit = self.leds.iter().filter(|led| !color::is_black(**led)).count();
                debug!(lit, "frame");

                for (i, led) in self.leds.iter().enumerate() {
                    if color::is_black(*led) {
                        continue;
                    }

                    trace!(
                        led = %format_args!("{:3}", i),
                        red = %format_args!("{:3}", led.red),
                        green = %format_args!("{:3}", led.green),
                        blue = %format_args!("{:3}", led.blue),
                    );
                }
            }

            models::DummyDeviceMode::Ansi => {
                self.ansi_buf.clear();
                color::write_ansi_truecolor(&mut self.ansi_buf, self.leds.iter().copied());
                info!("{}", &self.ansi_buf);
            }
        }

        Ok(())
    }
}
