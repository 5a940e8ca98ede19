use async_trait::async_trait;
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use super::{common::*, DeviceError};
use crate::models::{self, Color, ColorOrder};

pub type Ws2812SpiDevice = Rewriter<Ws2812SpiImpl>;

/// WS2812B strip driven through the SPI MOSI line
///
/// Each data bit pair becomes one SPI byte, so every LED takes 12 bytes on the wire.
pub struct Ws2812SpiImpl {
    dev: ImplState,
    notified_error: bool,
    buf: Vec<u8>,
}

const SPI_BYTES_PER_LED: usize = 3 * SPI_BYTES_PER_COLOUR;
const SPI_BYTES_PER_COLOUR: usize = 4;
const SPI_FRAME_END_LATCH_BYTES: usize = 116;
const BITPAIR_TO_BYTE: [u8; 4] = [0b10001000, 0b10001100, 0b11001000, 0b11001100];

enum ImplState {
    Pending(models::Ws2812Spi),
    Ready(Spidev),
}

impl ImplState {
    fn open(config: &models::Ws2812Spi) -> Result<Spidev, DeviceError> {
        let mut dev = Spidev::open(&config.output)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.rate)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&options)?;

        info!(path = %config.output, "initialized SPI device");
        Ok(dev)
    }

    fn try_init(&mut self) -> Result<&Spidev, DeviceError> {
        if let ImplState::Pending(config) = self {
            *self = ImplState::Ready(Self::open(config)?);
        }

        match self {
            ImplState::Ready(dev) => Ok(dev),
            ImplState::Pending(_) => Err(DeviceError::NotSupported("SPI device not initialized")),
        }
    }
}

/// Encodes `led_data` into `buf`, zeroing the trailing latch bytes
fn encode_frame(buf: &mut [u8], color_order: ColorOrder, invert: bool, led_data: &[Color]) {
    let mut ptr = 0;
    for led in led_data {
        let (r, g, b) = color_order.reorder_from_rgb(*led).into_components();
        let mut color_bits = ((r as u32) << 16) | ((g as u32) << 8) | (b as u32);

        for j in (0..SPI_BYTES_PER_LED).rev() {
            buf[ptr + j] = BITPAIR_TO_BYTE[(color_bits & 0x3) as usize];
            color_bits >>= 2;
        }

        ptr += SPI_BYTES_PER_LED;
    }

    buf[ptr..].fill(0);

    if invert {
        for byte in buf.iter_mut() {
            *byte = !*byte;
        }
    }
}

#[async_trait]
impl WritingDevice for Ws2812SpiImpl {
    type Config = models::Ws2812Spi;

    fn new(config: &models::Ws2812Spi, led_count: usize) -> Result<Self, DeviceError> {
        let buf = vec![0; led_count * SPI_BYTES_PER_LED + SPI_FRAME_END_LATCH_BYTES];

        let mut dev = ImplState::Pending(config.clone());

        // Try to open the device early
        if let Err(error) = dev.try_init() {
            warn!(%error, path = %config.output, "failed to initialize SPI device, will try again later");
        }

        Ok(Self {
            dev,
            notified_error: false,
            buf,
        })
    }

    async fn set_led_data(
        &mut self,
        config: &Self::Config,
        led_data: &[Color],
    ) -> Result<(), DeviceError> {
        encode_frame(&mut self.buf, config.color_order, config.invert, led_data);
        Ok(())
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        let mut transfer = SpidevTransfer::write(&self.buf);

        match self.dev.try_init() {
            Ok(dev) => {
                self.notified_error = false;
                dev.transfer(&mut transfer)?;
            }
            Err(err) => {
                if !self.notified_error {
                    self.notified_error = true;
                    error!(error = %err, "failed to initialize SPI device");
                }
            }
        }

        Ok(())
    }
}
