//! libusb device access.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use tracing::{debug, info};

use crate::controller::UsbTransport;
use crate::error::{Error, Result};

/// Corsair USB vendor ID.
pub const CORSAIR_VENDOR_ID: u16 = 0x1b1c;

/// Lighting Node CORE USB product ID.
pub const LIGHTING_NODE_CORE_PRODUCT_ID: u16 = 0x0c1a;

/// Interface hosting the OUT endpoint.
const INTERFACE: u8 = 0;

/// Opened USB device with a located OUT endpoint.
pub struct UsbDevice {
    handle: DeviceHandle<Context>,
    endpoint: u8,
    transfer_type: TransferType,
}

impl UsbDevice {
    /// Open the first device matching the vendor and optional product ID.
    pub fn open(vendor_id: u16, product_id: Option<u16>) -> Result<Self> {
        let context = Context::new()?;

        let device = context
            .devices()?
            .iter()
            .find(|device| matches_ids(device, vendor_id, product_id))
            .ok_or(Error::DeviceNotFound { vendor_id, product_id })?;

        debug!("Found device on bus {} address {}", device.bus_number(), device.address());

        let (endpoint, transfer_type) = out_endpoint(&device)?;
        info!("Corsair output endpoint found: {:#04x} ({:?})", endpoint, transfer_type);

        let handle = device.open()?;

        Ok(Self { handle, endpoint, transfer_type })
    }

    /// List all devices with the given vendor ID.
    pub fn list(vendor_id: u16) -> Result<Vec<DeviceSummary>> {
        let context = Context::new()?;

        let devices = context.devices()?;
        let summaries = devices.iter().map(|device| summary(&device));

        Ok(vendor_summaries(summaries, vendor_id))
    }
}

impl UsbTransport for UsbDevice {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool> {
        match self.handle.kernel_driver_active(interface) {
            Ok(active) => Ok(active),
            // Platforms without kernel driver control never have one bound.
            Err(rusb::Error::NotSupported) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<()> {
        Ok(self.handle.detach_kernel_driver(interface)?)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<()> {
        Ok(self.handle.attach_kernel_driver(interface)?)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<()> {
        // Select the first configuration before claiming.
        let config = self.handle.device().config_descriptor(0)?;
        self.handle.set_active_configuration(config.number())?;

        Ok(self.handle.claim_interface(interface)?)
    }

    fn release_interface(&mut self, interface: u8) -> Result<()> {
        Ok(self.handle.release_interface(interface)?)
    }

    fn write(&mut self, frame: &[u8], timeout: Duration) -> Result<usize> {
        let written = match self.transfer_type {
            TransferType::Interrupt => self.handle.write_interrupt(self.endpoint, frame, timeout)?,
            _ => self.handle.write_bulk(self.endpoint, frame, timeout)?,
        };
        Ok(written)
    }
}

/// USB device matching the vendor filter.
#[derive(Debug, Copy, Clone)]
pub struct DeviceSummary {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Display for DeviceSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: ID {:04x}:{:04x}",
            self.bus, self.address, self.vendor_id, self.product_id
        )
    }
}

fn summary<T: UsbContext>(device: &Device<T>) -> rusb::Result<DeviceSummary> {
    let descriptor = device.device_descriptor()?;

    Ok(DeviceSummary {
        bus: device.bus_number(),
        address: device.address(),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
    })
}

/// Keep devices of one vendor, skipping devices whose descriptor could not be read.
fn vendor_summaries<I>(summaries: I, vendor_id: u16) -> Vec<DeviceSummary>
where
    I: Iterator<Item = rusb::Result<DeviceSummary>>,
{
    summaries
        .filter_map(|summary| match summary {
            Ok(summary) => Some(summary),
            Err(err) => {
                debug!("Skipping device with unreadable descriptor: {}", err);
                None
            },
        })
        .filter(|summary| summary.vendor_id == vendor_id)
        .collect()
}

fn matches_ids<T: UsbContext>(device: &Device<T>, vendor_id: u16, product_id: Option<u16>) -> bool {
    match device.device_descriptor() {
        Ok(descriptor) => {
            descriptor.vendor_id() == vendor_id
                && product_id.map_or(true, |id| descriptor.product_id() == id)
        },
        Err(_) => false,
    }
}

/// Find the first OUT endpoint of the first alternate setting on the controller's interface.
fn out_endpoint<T: UsbContext>(device: &Device<T>) -> Result<(u8, TransferType)> {
    let config = device.config_descriptor(0)?;

    for interface in config.interfaces().filter(|interface| interface.number() == INTERFACE) {
        for descriptor in interface.descriptors().filter(|descriptor| descriptor.setting_number() == 0) {
            let mut endpoints = descriptor.endpoint_descriptors();
            if let Some(endpoint) = endpoints.find(|endpoint| endpoint.direction() == Direction::Out) {
                return Ok((endpoint.address(), endpoint.transfer_type()));
            }
        }
    }

    Err(Error::EndpointNotFound(INTERFACE))
}
