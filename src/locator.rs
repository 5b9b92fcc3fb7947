//! Supported device discovery.

use std::ffi::{CStr, CString};

use hidapi::{DeviceInfo, HidApi};
use log::debug;

use crate::controller::HidController;
use crate::error::Error;

/// Product name used when the device does not report one.
const DEFAULT_PRODUCT: &str = "ViewSonic Monitor";

/// Serial number used when the device does not report one.
const DEFAULT_SERIAL: &str = "Unknown";

const MANUFACTURER: &str = "ViewSonic";

/// Located HID device.
#[derive(PartialEq, Eq, Debug, Clone)]
pub(crate) struct DeviceDescriptor {
    /// Position in the enumeration, used by `--device`.
    pub index: usize,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: String,
    pub serial: String,
    pub manufacturer: String,
    /// Platform path used to open the device.
    pub path: CString,
}

/// Enumerated HID device, before filtering.
#[derive(Debug, Copy, Clone)]
pub(crate) struct DeviceEntry<'a> {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<&'a str>,
    pub serial: Option<&'a str>,
    pub path: &'a CStr,
}

impl<'a> From<&'a DeviceInfo> for DeviceEntry<'a> {
    fn from(info: &'a DeviceInfo) -> Self {
        Self {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            product: info.product_string(),
            serial: info.serial_number(),
            path: info.path(),
        }
    }
}

impl DeviceDescriptor {
    fn from_entry(index: usize, entry: DeviceEntry<'_>) -> Self {
        let product = entry.product.filter(|product| !product.is_empty());
        let serial = entry.serial.filter(|serial| !serial.is_empty());

        Self {
            index,
            vendor_id: entry.vendor_id,
            product_id: entry.product_id,
            product: product.unwrap_or(DEFAULT_PRODUCT).into(),
            serial: serial.unwrap_or(DEFAULT_SERIAL).into(),
            manufacturer: MANUFACTURER.into(),
            path: entry.path.into(),
        }
    }
}

/// Find all devices supported by a controller on the HID bus.
///
/// The order follows the platform's enumeration, which is not guaranteed to be stable.
pub(crate) fn find_devices(api: &HidApi, controller: &dyn HidController) -> Vec<DeviceDescriptor> {
    locate(api.device_list().map(DeviceEntry::from), controller)
}

/// Keep the entries supported by a controller, numbered in enumeration order.
pub(crate) fn locate<'a, I>(entries: I, controller: &dyn HidController) -> Vec<DeviceDescriptor>
where
    I: IntoIterator<Item = DeviceEntry<'a>>,
{
    let devices: Vec<_> = entries
        .into_iter()
        .filter(|entry| controller.supports(entry.vendor_id, entry.product_id))
        .enumerate()
        .map(|(index, entry)| DeviceDescriptor::from_entry(index, entry))
        .collect();

    for device in &devices {
        debug!(
            "Found {} ({:04x}:{:04x}) at {:?}",
            device.product, device.vendor_id, device.product_id, device.path
        );
    }

    devices
}

/// Narrow located devices down to the requested one, or all of them.
pub(crate) fn select_devices(
    devices: Vec<DeviceDescriptor>,
    index: Option<usize>,
) -> Result<Vec<DeviceDescriptor>, Error> {
    if devices.is_empty() {
        return Err(Error::NoDeviceFound);
    }

    match index {
        Some(index) => match devices.into_iter().find(|device| device.index == index) {
            Some(device) => Ok(vec![device]),
            None => Err(Error::DeviceNotFound(index)),
        },
        None => Ok(devices),
    }
}

#[cfg(test)]
pub(crate) fn test_device(index: usize) -> DeviceDescriptor {
    DeviceDescriptor {
        index,
        vendor_id: 0x0543,
        product_id: 0xa002,
        product: DEFAULT_PRODUCT.into(),
        serial: format!("SN{index:04}"),
        manufacturer: MANUFACTURER.into(),
        path: CString::new(format!("/dev/hidraw{index}")).unwrap(),
    }
}
