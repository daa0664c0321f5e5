//! Lighting Node CORE frame layout.
//!
//! Every packet sent to the controller is exactly [`FRAME_SIZE`] bytes. Colors are transmitted as
//! one frame per channel, with one intensity byte per LED.

use std::ops::Deref;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::Rgb;

/// Size of every frame accepted by the controller.
pub const FRAME_SIZE: usize = 64;

/// Timeout for a single endpoint write.
pub const TIMEOUT: Duration = Duration::from_millis(5000);

/// Maximum number of fans connected to one controller.
pub const MAX_FANS: u8 = 6;

/// Maximum number of LEDs per fan.
pub const MAX_LEDS_PER_FAN: u8 = 8;

/// Offset of the first LED intensity byte in a color frame.
pub const LED_OFFSET: usize = 5;

/// Header of the color frames, followed by the channel index.
const COLOR_HEADER: [u8; 4] = [0x32, 0x00, 0x00, 0x18];

/// Headers of the handshake frames, in transmission order.
const MAGIC_HEADERS: [&[u8]; 5] =
    [&[0x33, 0xff], &[0x38, 0x01, 0x02], &[0x34, 0x01], &[0x33, 0xff], &[0x38, 0x00, 0x02]];

/// Handshake which must precede color frames.
pub fn magic_frames() -> Vec<Bytes> {
    MAGIC_HEADERS.iter().map(|header| padded(header).freeze()).collect()
}

/// Zero-pad a header to a full frame.
fn padded(header: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_SIZE);
    buf.put_slice(header);
    buf.put_bytes(0, FRAME_SIZE - header.len());
    buf
}

/// Color plane.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Channel selector used in the frame header.
    pub fn index(self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }

    /// Intensity of this channel in a color.
    pub fn of(self, rgb: Rgb) -> u8 {
        match self {
            Self::Red => rgb.r,
            Self::Green => rgb.g,
            Self::Blue => rgb.b,
        }
    }
}

/// Intensities of one color channel for every LED.
#[derive(Debug, Clone)]
pub struct ColorFrame {
    channel: Channel,
    buf: BytesMut,
}

impl ColorFrame {
    pub fn new(channel: Channel) -> Self {
        let mut header = [0; LED_OFFSET];
        header[..COLOR_HEADER.len()].copy_from_slice(&COLOR_HEADER);
        header[COLOR_HEADER.len()] = channel.index();

        Self { channel, buf: padded(&header) }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Set the intensity at a frame offset obtained from [`Topology::offset`].
    pub fn set(&mut self, offset: usize, value: u8) {
        self.buf[offset] = value;
    }
}

impl Deref for ColorFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

/// Fans and LEDs connected to the controller.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Topology {
    fan_count: u8,
    led_per_fan: u8,
}

impl Topology {
    pub fn new(fan_count: u8, led_per_fan: u8) -> Result<Self> {
        if fan_count > MAX_FANS {
            return Err(Error::InvalidFanCount(fan_count));
        }

        if led_per_fan > MAX_LEDS_PER_FAN {
            return Err(Error::InvalidLedsPerFan(led_per_fan));
        }

        Ok(Self { fan_count, led_per_fan })
    }

    pub fn fan_count(&self) -> u8 {
        self.fan_count
    }

    pub fn led_per_fan(&self) -> u8 {
        self.led_per_fan
    }

    pub fn check_fan(&self, fan: u8) -> Result<()> {
        if fan >= self.fan_count {
            return Err(Error::FanOutOfRange { fan, fan_count: self.fan_count });
        }
        Ok(())
    }

    pub fn check_led(&self, led: u8) -> Result<()> {
        if led >= self.led_per_fan {
            return Err(Error::LedOutOfRange { led, led_per_fan: self.led_per_fan });
        }
        Ok(())
    }

    /// Frame offset of an LED.
    ///
    /// Indices must have been validated, the result is then always inside of the LED area.
    pub fn offset(&self, fan: u8, led: u8) -> usize {
        fan as usize * self.led_per_fan as usize + led as usize + LED_OFFSET
    }

    /// Frame offsets of all LEDs on one fan.
    pub fn fan_offsets(self, fan: u8) -> impl Iterator<Item = usize> + Clone {
        (0..self.led_per_fan).map(move |led| self.offset(fan, led))
    }

    /// Frame offsets of the same LED on every fan.
    pub fn led_offsets(self, led: u8) -> impl Iterator<Item = usize> + Clone {
        (0..self.fan_count).map(move |fan| self.offset(fan, led))
    }

    /// Frame offsets of every LED.
    pub fn offsets(self) -> impl Iterator<Item = usize> + Clone {
        (0..self.fan_count).flat_map(move |fan| self.fan_offsets(fan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn magic_frame_order() {
        let frames = magic_frames();
        assert_eq!(frames.len(), 5);

        let expected: [&[u8]; 5] =
            [&[0x33, 0xff], &[0x38, 0x01, 0x02], &[0x34, 0x01], &[0x33, 0xff], &[0x38, 0x00, 0x02]];
        for (frame, header) in frames.iter().zip(expected.iter()) {
            assert_eq!(frame.len(), FRAME_SIZE);
            assert_eq!(&frame[..header.len()], *header);
            assert!(frame[header.len()..].iter().all(|&byte| byte == 0));
        }
    }

    #[test]
    fn color_frame_header() {
        for channel in Channel::ALL.iter().copied() {
            let frame = ColorFrame::new(channel);
            assert_eq!(frame.len(), FRAME_SIZE);
            assert_eq!(frame[..LED_OFFSET], [0x32, 0x00, 0x00, 0x18, channel.index()]);
            assert!(frame[LED_OFFSET..].iter().all(|&byte| byte == 0));
        }
    }

    #[test]
    fn offsets_stay_in_led_area() {
        for fan_count in 0..=MAX_FANS {
            for led_per_fan in 0..=MAX_LEDS_PER_FAN {
                let topology = Topology::new(fan_count, led_per_fan).unwrap();
                for fan in 0..fan_count {
                    for led in 0..led_per_fan {
                        let offset = topology.offset(fan, led);
                        let expected = fan as usize * led_per_fan as usize + led as usize + 5;
                        assert_eq!(offset, expected);
                        assert!((5..=60).contains(&offset));
                    }
                }
            }
        }
    }

    #[test]
    fn offsets_cover_every_led_once() {
        let topology = Topology::new(3, 4).unwrap();
        let offsets: Vec<usize> = topology.offsets().collect();
        assert_eq!(offsets, (5..17).collect::<Vec<_>>());

        let fan: Vec<usize> = topology.fan_offsets(1).collect();
        assert_eq!(fan, vec![9, 10, 11, 12]);

        let led: Vec<usize> = topology.led_offsets(2).collect();
        assert_eq!(led, vec![7, 11, 15]);
    }

    #[test]
    fn topology_bounds() {
        assert!(Topology::new(0, 0).is_ok());
        assert!(Topology::new(6, 8).is_ok());

        let err = Topology::new(7, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(err, Error::InvalidFanCount(7)));

        let err = Topology::new(6, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(err, Error::InvalidLedsPerFan(9)));
    }

    #[test]
    fn index_checks() {
        let topology = Topology::new(2, 4).unwrap();
        assert!(topology.check_fan(1).is_ok());
        assert!(topology.check_led(3).is_ok());

        let err = topology.check_fan(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        let err = topology.check_led(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }
}
