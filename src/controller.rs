//! RGB controller abstraction.

use bytes::Bytes;

use crate::color::Rgb;
use crate::error::Error;
use crate::music::MusicLevels;
use crate::Mode;

/// Colors for the two lighting zones.
///
/// A `None` zone keeps the color baked into the mode template.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub(crate) struct ZoneColors {
    pub base: Option<Rgb>,
    pub rear: Option<Rgb>,
}

impl ZoneColors {
    /// Both zones from optional arguments, mirroring the base color into the rear zone.
    pub fn new(base: Option<Rgb>, rear: Option<Rgb>) -> Self {
        Self { base, rear: rear.or(base) }
    }
}

/// HID RGB controller.
pub(crate) trait HidController: Send {
    /// HID vendor ID.
    fn vendor_id(&self) -> u16;

    /// HID product IDs of all supported models.
    fn product_ids(&self) -> &'static [u16];

    /// Feature report selecting a lighting mode.
    fn mode_report(&self, mode: Mode, colors: ZoneColors) -> Bytes;

    /// Feature report from captured bytes, zero-padded to the report length.
    fn raw_report(&self, bytes: &[u8]) -> Result<Bytes, Error>;

    /// Raw output report carrying one frame of music levels.
    fn music_frame(&self, levels: MusicLevels) -> Bytes;

    /// Check if a device belongs to this controller.
    fn supports(&self, vendor_id: u16, product_id: u16) -> bool {
        vendor_id == self.vendor_id() && self.product_ids().contains(&product_id)
    }
}
