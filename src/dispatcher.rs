//! Report delivery to located devices.

use std::sync::Arc;

use hidapi::HidApi;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::controller::HidController;
use crate::error::Error;
use crate::locator::{self, DeviceDescriptor};

/// Destination for HID reports.
pub(crate) trait ReportSink: Send + 'static {
    /// Deliver a feature report to a device.
    fn send_feature_report(&self, device: &DeviceDescriptor, report: &[u8]) -> Result<(), Error>;

    /// Deliver a raw output report to a device.
    fn write(&self, device: &DeviceDescriptor, report: &[u8]) -> Result<(), Error>;
}

/// Shared handle to the platform HID bus.
///
/// Devices are only held open for the duration of a single report.
#[derive(Clone)]
pub(crate) struct HidBus {
    api: Arc<Mutex<HidApi>>,
}

impl HidBus {
    pub fn new() -> Result<Self, Error> {
        let api = HidApi::new().map_err(|err| Error::HidInit(err.to_string()))?;
        Ok(Self { api: Arc::new(Mutex::new(api)) })
    }

    /// Find all devices supported by a controller.
    pub fn find_devices(&self, controller: &dyn HidController) -> Vec<DeviceDescriptor> {
        let mut api = self.api.lock();

        // Fall back to the last enumeration if the bus can't be rescanned.
        if let Err(err) = api.refresh_devices() {
            warn!("Unable to refresh HID devices: {err}");
        }

        locator::find_devices(&api, controller)
    }

    /// Open a device, hand it to `f` and close it again.
    fn with_device<F>(&self, device: &DeviceDescriptor, f: F) -> Result<(), Error>
    where
        F: FnOnce(&hidapi::HidDevice) -> Result<(), hidapi::HidError>,
    {
        let api = self.api.lock();
        let hid_device = api.open_path(&device.path)?;
        f(&hid_device)?;
        Ok(())
    }
}

impl ReportSink for HidBus {
    fn send_feature_report(&self, device: &DeviceDescriptor, report: &[u8]) -> Result<(), Error> {
        debug!(
            "Sending {} byte feature report to {:04x}:{:04x} at {:?}",
            report.len(),
            device.vendor_id,
            device.product_id,
            device.path
        );
        self.with_device(device, |hid_device| hid_device.send_feature_report(report))
    }

    fn write(&self, device: &DeviceDescriptor, report: &[u8]) -> Result<(), Error> {
        self.with_device(device, |hid_device| hid_device.write(report).map(drop))
    }
}

/// Per-device result of a broadcast.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub device: DeviceDescriptor,
    pub result: Result<(), Error>,
}

/// Attempt a delivery on every device.
///
/// Device I/O failures are recorded per device and do not stop the remaining attempts. Any other
/// error aborts the broadcast.
pub(crate) fn broadcast<F>(
    devices: &[DeviceDescriptor],
    mut send: F,
) -> Result<Vec<Delivery>, Error>
where
    F: FnMut(&DeviceDescriptor) -> Result<(), Error>,
{
    if devices.is_empty() {
        return Err(Error::NoDeviceFound);
    }

    let mut deliveries = Vec::with_capacity(devices.len());
    for device in devices {
        match send(device) {
            Err(err) if !err.is_device_io() => return Err(err),
            result => deliveries.push(Delivery { device: device.clone(), result }),
        }
    }

    Ok(deliveries)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::locator::test_device;

    /// Report sink recording every delivery.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub feature_reports: Arc<Mutex<Vec<(usize, Vec<u8>)>>>,
        pub writes: Arc<Mutex<Vec<(usize, Vec<u8>)>>>,
        /// Device indices whose reports fail.
        pub failing: Vec<usize>,
    }

    impl RecordingSink {
        fn check(&self, device: &DeviceDescriptor) -> Result<(), Error> {
            if self.failing.contains(&device.index) {
                Err(Error::DeviceIo(format!("device #{} disconnected", device.index)))
            } else {
                Ok(())
            }
        }
    }

    impl ReportSink for RecordingSink {
        fn send_feature_report(
            &self,
            device: &DeviceDescriptor,
            report: &[u8],
        ) -> Result<(), Error> {
            self.check(device)?;
            self.feature_reports.lock().push((device.index, report.to_vec()));
            Ok(())
        }

        fn write(&self, device: &DeviceDescriptor, report: &[u8]) -> Result<(), Error> {
            self.check(device)?;
            self.writes.lock().push((device.index, report.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn broadcast_without_devices_fails() {
        let mut attempts = 0;
        let result = broadcast(&[], |_| {
            attempts += 1;
            Ok(())
        });

        assert!(matches!(result, Err(Error::NoDeviceFound)));
        assert_eq!(attempts, 0);
    }

    #[test]
    fn broadcast_continues_past_device_errors() {
        let devices = [test_device(0), test_device(1), test_device(2)];
        let sink = RecordingSink { failing: vec![1], ..Default::default() };

        let deliveries =
            broadcast(&devices, |device| sink.send_feature_report(device, &[0x02])).unwrap();

        assert_eq!(deliveries.len(), 3);
        assert!(deliveries[0].result.is_ok());
        assert!(matches!(deliveries[1].result, Err(Error::DeviceIo(_))));
        assert!(deliveries[2].result.is_ok());

        let indices: Vec<_> = sink.feature_reports.lock().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn broadcast_aborts_on_other_errors() {
        let devices = [test_device(0), test_device(1)];
        let mut attempts = 0;
        let result = broadcast(&devices, |_| {
            attempts += 1;
            Err(Error::UnknownColor("mauve".into()))
        });

        assert!(matches!(result, Err(Error::UnknownColor(_))));
        assert_eq!(attempts, 1);
    }
}
