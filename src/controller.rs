//! USB transport abstraction.

use std::time::Duration;

use crate::error::Result;

/// Opened USB interface with an OUT endpoint.
pub trait UsbTransport {
    /// Check if a kernel driver is bound to the interface.
    fn kernel_driver_active(&self, interface: u8) -> Result<bool>;

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<()>;

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<()>;

    fn claim_interface(&mut self, interface: u8) -> Result<()>;

    fn release_interface(&mut self, interface: u8) -> Result<()>;

    /// Write one frame to the OUT endpoint, returning the number of bytes written.
    fn write(&mut self, frame: &[u8], timeout: Duration) -> Result<usize>;
}

/// Transport which only records the frames written to it.
#[derive(Default)]
pub struct MemoryTransport {
    pub frames: Vec<Vec<u8>>,
}

impl UsbTransport for MemoryTransport {
    fn kernel_driver_active(&self, _interface: u8) -> Result<bool> {
        Ok(false)
    }

    fn detach_kernel_driver(&mut self, _interface: u8) -> Result<()> {
        Ok(())
    }

    fn attach_kernel_driver(&mut self, _interface: u8) -> Result<()> {
        Ok(())
    }

    fn claim_interface(&mut self, _interface: u8) -> Result<()> {
        Ok(())
    }

    fn release_interface(&mut self, _interface: u8) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, frame: &[u8], _timeout: Duration) -> Result<usize> {
        self.frames.push(frame.to_vec());
        Ok(frame.len())
    }
}
