//! Corsair Lighting Node CORE control.

use clap::ValueEnum;
use tracing::{debug, info, warn};

use crate::controller::UsbTransport;
use crate::error::Result;
use crate::frame::{self, Channel, ColorFrame, Topology, FRAME_SIZE, TIMEOUT};
use crate::Rgb;

/// Interface hosting the controller's OUT endpoint.
const INTERFACE: u8 = 0;

/// Point in time at which color changes are sent to the device.
#[derive(ValueEnum, Default, PartialEq, Eq, Debug, Copy, Clone)]
pub enum WriteMode {
    /// Accumulate changes until [`LightingNodeCore::push`].
    #[default]
    Batched,
    /// Send all frames after every change.
    Immediate,
}

pub struct LightingNodeCore<T: UsbTransport> {
    transport: T,
    topology: Topology,
    mode: WriteMode,
    frames: [ColorFrame; 3],
    driver_detached: bool,
    closed: bool,
}

impl<T: UsbTransport> LightingNodeCore<T> {
    /// Take control over the device, detaching the kernel driver if necessary.
    pub fn new(mut transport: T, topology: Topology, mode: WriteMode) -> Result<Self> {
        // Detach kernel drivers, otherwise the interface is busy.
        let driver_detached = if transport.kernel_driver_active(INTERFACE)? {
            info!("Kernel driver is attached, detaching it");
            transport.detach_kernel_driver(INTERFACE)?;
            true
        } else {
            info!("Kernel driver is not attached, continuing without detaching");
            false
        };

        if let Err(err) = transport.claim_interface(INTERFACE) {
            if driver_detached {
                info!("Could not claim interface, reattaching kernel driver");
                if let Err(err) = transport.attach_kernel_driver(INTERFACE) {
                    warn!("Could not reattach kernel driver: {}", err);
                }
            }
            return Err(err);
        }
        debug!("Claimed interface {}", INTERFACE);
        debug!("{} fans with {} LEDs each", topology.fan_count(), topology.led_per_fan());

        let [red, green, blue] = Channel::ALL;
        let frames = [ColorFrame::new(red), ColorFrame::new(green), ColorFrame::new(blue)];

        Ok(Self { transport, topology, mode, frames, driver_detached, closed: false })
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Set the color of a single LED.
    pub fn set_led(&mut self, fan: u8, led: u8, rgb: Rgb) -> Result<()> {
        self.topology.check_fan(fan)?;
        self.topology.check_led(led)?;

        let offset = self.topology.offset(fan, led);
        self.paint(rgb, std::iter::once(offset))
    }

    /// Set the color of the same LED on every fan.
    pub fn set_leds(&mut self, led: u8, rgb: Rgb) -> Result<()> {
        self.topology.check_led(led)?;

        self.paint(rgb, self.topology.led_offsets(led))
    }

    /// Set the color of every LED on a fan.
    pub fn set_fan(&mut self, fan: u8, rgb: Rgb) -> Result<()> {
        self.topology.check_fan(fan)?;

        self.paint(rgb, self.topology.fan_offsets(fan))
    }

    /// Set the color of every LED.
    pub fn set_all(&mut self, rgb: Rgb) -> Result<()> {
        self.paint(rgb, self.topology.offsets())
    }

    /// Send the handshake followed by all color frames.
    pub fn push(&mut self) -> Result<()> {
        self.send_magic_frames()?;

        for frame in &self.frames {
            debug!("Writing {:?} color frame", frame.channel());
            write_frame(&mut self.transport, frame)?;
        }

        Ok(())
    }

    /// Release the device, reattaching the kernel driver if it was detached.
    pub fn close(mut self) {
        self.release();
    }

    fn paint(&mut self, rgb: Rgb, offsets: impl Iterator<Item = usize> + Clone) -> Result<()> {
        for frame in &mut self.frames {
            let value = frame.channel().of(rgb);
            for offset in offsets.clone() {
                frame.set(offset, value);
            }
        }

        match self.mode {
            WriteMode::Batched => Ok(()),
            WriteMode::Immediate => self.push(),
        }
    }

    fn send_magic_frames(&mut self) -> Result<()> {
        debug!("Sending magic frames");
        for frame in frame::magic_frames() {
            write_frame(&mut self.transport, &frame)?;
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(err) = self.transport.release_interface(INTERFACE) {
            warn!("Could not release interface {}: {}", INTERFACE, err);
        }

        if self.driver_detached {
            info!("Kernel driver is detached, trying to reattach it");
            if let Err(err) = self.transport.attach_kernel_driver(INTERFACE) {
                warn!("Could not reattach kernel driver: {}", err);
            }
        }
    }
}

impl<T: UsbTransport> Drop for LightingNodeCore<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Write a frame, every transfer must be accepted as a whole.
fn write_frame<T: UsbTransport>(transport: &mut T, frame: &[u8]) -> Result<()> {
    let written = transport.write(frame, TIMEOUT)?;
    assert_eq!(written, FRAME_SIZE, "short write to Lighting Node CORE");
    Ok(())
}
