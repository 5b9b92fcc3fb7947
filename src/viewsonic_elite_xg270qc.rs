//! ViewSonic Elite XG270QC lighting control.

use bytes::{BufMut, Bytes, BytesMut};

use crate::color::Rgb;
use crate::controller::{HidController, ZoneColors};
use crate::error::Error;
use crate::music::MusicLevels;
use crate::Mode;

/// Feature report ID used for mode selection.
const REPORT_ID: u8 = 0x02;

/// Length of the mode feature report, including the report ID.
pub(crate) const FEATURE_REPORT_LEN: usize = 167;

/// Length of the music output report, including the report ID.
pub(crate) const MUSIC_REPORT_LEN: usize = 64;

/// Offset of the base zone RGB triplet.
pub(crate) const BASE_OFFSET: usize = 2;

/// Offset of the rear zone RGB triplet.
pub(crate) const REAR_OFFSET: usize = 9;

/// Music report ID and command prefix.
const MUSIC_HEADER: [u8; 3] = [0x01, 0xc0, 0x00];

/// Color baked into the templates of color-capable modes.
const DEFAULT_COLOR: Rgb = Rgb::new(0x00, 0x53, 0xf7);

const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);

const STATIC: [u8; FEATURE_REPORT_LEN] = template(0x01, 0x01, DEFAULT_COLOR);
const RAINBOW: [u8; FEATURE_REPORT_LEN] = template(0x07, 0x07, BLACK);
const BREATHING: [u8; FEATURE_REPORT_LEN] = template(0x02, 0x02, DEFAULT_COLOR);
const STACK: [u8; FEATURE_REPORT_LEN] = template(0x09, 0x09, DEFAULT_COLOR);
const WARP_SPEED: [u8; FEATURE_REPORT_LEN] = template(0x06, 0x06, BLACK);
const MUSIC: [u8; FEATURE_REPORT_LEN] = template(0x12, 0x13, DEFAULT_COLOR);
const MUSIC_PULSE: [u8; FEATURE_REPORT_LEN] = template(0x12, 0x14, DEFAULT_COLOR);

/// Mode report template.
///
/// Each zone is described by an effect byte, followed by the zone color and the effect speed.
const fn template(base_effect: u8, rear_effect: u8, color: Rgb) -> [u8; FEATURE_REPORT_LEN] {
    let mut report = [0; FEATURE_REPORT_LEN];
    report[0] = REPORT_ID;

    // Base zone.
    report[1] = base_effect;
    report[BASE_OFFSET] = color.r;
    report[BASE_OFFSET + 1] = color.g;
    report[BASE_OFFSET + 2] = color.b;
    report[6] = 0x0a;

    // Rear zone.
    report[8] = rear_effect;
    report[REAR_OFFSET] = color.r;
    report[REAR_OFFSET + 1] = color.g;
    report[REAR_OFFSET + 2] = color.b;
    report[13] = 0x0a;

    // Apply to all zones.
    report[15] = 0x01;

    report
}

/// Unmodified report template for a mode.
pub(crate) fn mode_template(mode: Mode) -> &'static [u8; FEATURE_REPORT_LEN] {
    match mode {
        Mode::Static => &STATIC,
        Mode::Rainbow => &RAINBOW,
        Mode::Breathing => &BREATHING,
        Mode::Stack => &STACK,
        Mode::WarpSpeed => &WARP_SPEED,
        Mode::Music => &MUSIC,
        Mode::MusicPulse => &MUSIC_PULSE,
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct ViewSonicEliteXg270qc;

impl HidController for ViewSonicEliteXg270qc {
    fn vendor_id(&self) -> u16 {
        0x0543
    }

    fn product_ids(&self) -> &'static [u16] {
        &[0xa002]
    }

    fn mode_report(&self, mode: Mode, colors: ZoneColors) -> Bytes {
        let mut buf = BytesMut::from(&mode_template(mode)[..]);

        if let Some(base) = colors.base {
            buf[BASE_OFFSET..BASE_OFFSET + 3].copy_from_slice(&base.to_bytes());
        }

        if let Some(rear) = colors.rear {
            buf[REAR_OFFSET..REAR_OFFSET + 3].copy_from_slice(&rear.to_bytes());
        }

        buf.freeze()
    }

    fn raw_report(&self, bytes: &[u8]) -> Result<Bytes, Error> {
        match bytes.first() {
            Some(&REPORT_ID) => (),
            Some(id) => {
                return Err(Error::InvalidReport(format!(
                    "report ID must be 0x{REPORT_ID:02x}, got 0x{id:02x}"
                )))
            },
            None => return Err(Error::InvalidReport("report is empty".into())),
        }

        if bytes.len() > FEATURE_REPORT_LEN {
            return Err(Error::InvalidReport(format!(
                "report is {} bytes long, maximum is {FEATURE_REPORT_LEN}",
                bytes.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(FEATURE_REPORT_LEN);
        buf.put_slice(bytes);

        // Padding.
        buf.put_bytes(0, FEATURE_REPORT_LEN - bytes.len());

        Ok(buf.freeze())
    }

    fn music_frame(&self, levels: MusicLevels) -> Bytes {
        let mut buf = BytesMut::with_capacity(MUSIC_REPORT_LEN);

        buf.put_slice(&MUSIC_HEADER);

        // Audio levels.
        buf.put_u8(levels.bass);
        buf.put_u8(levels.left);
        buf.put_u8(levels.right);

        // Padding.
        buf.put_bytes(0, MUSIC_REPORT_LEN - buf.len());

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    const RED: Rgb = Rgb::new(0xff, 0x00, 0x00);
    const BLUE: Rgb = Rgb::new(0x00, 0x00, 0xff);

    fn zone_bytes(report: &[u8], offset: usize) -> [u8; 3] {
        [report[offset], report[offset + 1], report[offset + 2]]
    }

    #[test]
    fn static_template_layout() {
        assert_eq!(
            &STATIC[..16],
            &[
                0x02, 0x01, 0x00, 0x53, 0xf7, 0x00, 0x0a, 0x00, 0x01, 0x00, 0x53, 0xf7, 0x00,
                0x0a, 0x00, 0x01
            ]
        );
        assert!(STATIC[16..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn music_templates_differ_in_rear_effect() {
        assert_eq!(MUSIC[1], 0x12);
        assert_eq!(MUSIC[8], 0x13);
        assert_eq!(MUSIC_PULSE[1], 0x12);
        assert_eq!(MUSIC_PULSE[8], 0x14);
    }

    #[test]
    fn no_colors_keeps_template() {
        for &mode in Mode::value_variants() {
            let report = ViewSonicEliteXg270qc.mode_report(mode, ZoneColors::default());
            assert_eq!(&report[..], &mode_template(mode)[..], "{mode:?}");
        }
    }

    #[test]
    fn colors_only_touch_zone_offsets() {
        let colors = ZoneColors::new(Some(RED), Some(RED));

        for &mode in Mode::value_variants() {
            let template = mode_template(mode);
            let report = ViewSonicEliteXg270qc.mode_report(mode, colors);

            assert_eq!(report.len(), FEATURE_REPORT_LEN);
            assert_eq!(zone_bytes(&report, BASE_OFFSET), RED.to_bytes());
            assert_eq!(zone_bytes(&report, REAR_OFFSET), RED.to_bytes());

            let zones = [BASE_OFFSET..BASE_OFFSET + 3, REAR_OFFSET..REAR_OFFSET + 3];
            for (i, (&byte, &expected)) in report.iter().zip(template.iter()).enumerate() {
                if !zones.iter().any(|zone| zone.contains(&i)) {
                    assert_eq!(byte, expected, "{mode:?} byte {i}");
                }
            }
        }
    }

    #[test]
    fn rear_mirrors_base() {
        let colors = ZoneColors::new(Some(RED), None);
        let report = ViewSonicEliteXg270qc.mode_report(Mode::Static, colors);
        assert_eq!(zone_bytes(&report, BASE_OFFSET), RED.to_bytes());
        assert_eq!(zone_bytes(&report, REAR_OFFSET), RED.to_bytes());
    }

    #[test]
    fn separate_zone_colors() {
        let colors = ZoneColors::new(Some(RED), Some(BLUE));
        let report = ViewSonicEliteXg270qc.mode_report(Mode::Static, colors);
        assert_eq!(zone_bytes(&report, BASE_OFFSET), [255, 0, 0]);
        assert_eq!(zone_bytes(&report, REAR_OFFSET), [0, 0, 255]);
    }

    #[test]
    fn rear_only_keeps_base_template() {
        let colors = ZoneColors { base: None, rear: Some(BLUE) };
        let report = ViewSonicEliteXg270qc.mode_report(Mode::Breathing, colors);
        assert_eq!(zone_bytes(&report, BASE_OFFSET), DEFAULT_COLOR.to_bytes());
        assert_eq!(zone_bytes(&report, REAR_OFFSET), BLUE.to_bytes());
    }

    #[test]
    fn music_frame_layout() {
        let levels = MusicLevels { bass: 0x80, left: 0x81, right: 0xe4 };
        let frame = ViewSonicEliteXg270qc.music_frame(levels);

        assert_eq!(frame.len(), MUSIC_REPORT_LEN);
        assert_eq!(&frame[..6], &[0x01, 0xc0, 0x00, 0x80, 0x81, 0xe4]);
        assert!(frame[6..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn raw_report_is_padded() {
        let report = ViewSonicEliteXg270qc.raw_report(&[0x02, 0x01, 0x93, 0x17, 0xff]).unwrap();
        assert_eq!(report.len(), FEATURE_REPORT_LEN);
        assert_eq!(&report[..5], &[0x02, 0x01, 0x93, 0x17, 0xff]);
        assert!(report[5..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn raw_report_is_validated() {
        let controller = ViewSonicEliteXg270qc;
        assert!(matches!(controller.raw_report(&[]), Err(Error::InvalidReport(_))));
        assert!(matches!(controller.raw_report(&[0x01, 0x00]), Err(Error::InvalidReport(_))));

        let oversized = [REPORT_ID; FEATURE_REPORT_LEN + 1];
        assert!(matches!(controller.raw_report(&oversized), Err(Error::InvalidReport(_))));
    }

    #[test]
    fn supports_known_models_only() {
        let controller = ViewSonicEliteXg270qc;
        assert!(controller.supports(0x0543, 0xa002));
        assert!(!controller.supports(0x0543, 0xa003));
        assert!(!controller.supports(0x048d, 0xa002));
    }
}
