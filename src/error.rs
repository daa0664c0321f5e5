//! Driver errors.

use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ErrorKind {
    /// Invalid topology or missing device, raised during construction.
    Config,
    /// Fan or LED index outside of the configured topology.
    Index,
    /// Failure reported by the USB stack.
    Usb,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("fan_count should be an integer between 0 and 6, found: {0}")]
    InvalidFanCount(u8),

    #[error("led_per_fan should be an integer between 0 and 8, found: {0}")]
    InvalidLedsPerFan(u8),

    #[error("could not find Corsair Lighting Node CORE ({vendor_id:04x}:{})", product_label(.product_id))]
    DeviceNotFound { vendor_id: u16, product_id: Option<u16> },

    #[error("Corsair output endpoint not found on interface {0}")]
    EndpointNotFound(u8),

    #[error("fan should be an integer between 0 and {fan_count}, found: {fan}")]
    FanOutOfRange { fan: u8, fan_count: u8 },

    #[error("led should be an integer between 0 and {led_per_fan}, found: {led}")]
    LedOutOfRange { led: u8, led_per_fan: u8 },

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFanCount(_)
            | Self::InvalidLedsPerFan(_)
            | Self::DeviceNotFound { .. }
            | Self::EndpointNotFound(_) => ErrorKind::Config,
            Self::FanOutOfRange { .. } | Self::LedOutOfRange { .. } => ErrorKind::Index,
            Self::Usb(_) => ErrorKind::Usb,
        }
    }
}

fn product_label(product_id: &Option<u16>) -> String {
    match product_id {
        Some(id) => format!("{id:04x}"),
        None => String::from("*"),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::InvalidFanCount(7).kind(), ErrorKind::Config);
        assert_eq!(Error::EndpointNotFound(0).kind(), ErrorKind::Config);
        assert_eq!(Error::LedOutOfRange { led: 8, led_per_fan: 8 }.kind(), ErrorKind::Index);
        assert_eq!(Error::Usb(rusb::Error::Pipe).kind(), ErrorKind::Usb);
    }

    #[test]
    fn device_not_found_message() {
        let err = Error::DeviceNotFound { vendor_id: 0x1b1c, product_id: None };
        assert_eq!(err.to_string(), "could not find Corsair Lighting Node CORE (1b1c:*)");

        let err = Error::DeviceNotFound { vendor_id: 0x1b1c, product_id: Some(0x0c1a) };
        assert_eq!(err.to_string(), "could not find Corsair Lighting Node CORE (1b1c:0c1a)");
    }
}
