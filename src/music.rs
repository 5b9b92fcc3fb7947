//! Synthetic music visualization stream.
//!
//! Music modes expect the host to push level frames continuously. Levels are generated from a
//! tick counter, no audio is captured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::controller::{HidController, ZoneColors};
use crate::dispatcher::{self, Delivery, ReportSink};
use crate::error::Error;
use crate::locator::DeviceDescriptor;
use crate::Mode;

/// Interval between two music frames.
pub(crate) const TICK_PERIOD: Duration = Duration::from_millis(10);

/// Music visualization variant.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub(crate) enum MusicVariant {
    Music,
    MusicPulse,
}

impl MusicVariant {
    /// Music variant of a mode, if it has one.
    pub fn from_mode(mode: Mode) -> Option<Self> {
        match mode {
            Mode::Music => Some(Self::Music),
            Mode::MusicPulse => Some(Self::MusicPulse),
            _ => None,
        }
    }

    pub fn mode(self) -> Mode {
        match self {
            Self::Music => Mode::Music,
            Self::MusicPulse => Mode::MusicPulse,
        }
    }
}

/// Levels carried by one music frame.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub(crate) struct MusicLevels {
    pub bass: u8,
    pub left: u8,
    pub right: u8,
}

impl MusicLevels {
    /// Synthesized levels for a tick.
    ///
    /// Left and right run at the same frequency, a quarter period apart.
    pub fn at_tick(tick: u64) -> Self {
        let t = tick as f64;
        Self {
            bass: (128. + 127. * (t * 0.02).sin()) as u8,
            left: (128. + 100. * (t * 0.03).sin()) as u8,
            right: (128. + 100. * (t * 0.03).cos()) as u8,
        }
    }
}

/// Cooperative cancellation signal.
///
/// Stopping a token also stops all of its children.
#[derive(Clone, Default, Debug)]
pub(crate) struct StopToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token stopped together with this one, which can also be stopped on its own.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.flag.clone());
        Self { flag: Default::default(), ancestors }
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.ancestors.iter().any(|flag| flag.load(Ordering::SeqCst))
    }

    /// Sleep for `duration`, waking up early when stopped.
    ///
    /// Returns `false` if the token was stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        while !self.is_stopped() {
            match duration.checked_sub(start.elapsed()) {
                Some(remaining) if !remaining.is_zero() => {
                    thread::sleep(remaining.min(TICK_PERIOD));
                },
                _ => return true,
            }
        }
        false
    }
}

/// Running music stream.
///
/// The stream owns the report sink while active, it is handed back once the worker exits.
pub(crate) struct MusicStream<S> {
    stop: StopToken,
    worker: JoinHandle<S>,
}

impl<S: ReportSink> MusicStream<S> {
    /// Select the music mode on all devices, then start streaming frames to them.
    ///
    /// The stream ends when `stop` is stopped or after `duration` has elapsed.
    pub fn start<C>(
        sink: S,
        controller: C,
        variant: MusicVariant,
        duration: Option<Duration>,
        devices: Vec<DeviceDescriptor>,
        stop: StopToken,
    ) -> Result<(Self, Vec<Delivery>), Error>
    where
        C: HidController + 'static,
    {
        let report = controller.mode_report(variant.mode(), ZoneColors::default());
        let deliveries =
            dispatcher::broadcast(&devices, |device| sink.send_feature_report(device, &report))?;

        let worker_stop = stop.clone();
        let worker = thread::spawn(move || {
            stream_worker(&sink, &controller, &devices, duration, &worker_stop);
            sink
        });

        Ok((Self { stop, worker }, deliveries))
    }

    /// Signal the worker to stop and wait for it.
    ///
    /// The worker notices the signal within one tick.
    pub fn stop(self) -> S {
        self.stop.stop();
        self.wait()
    }

    /// Wait for the worker to exit on its own.
    pub fn wait(self) -> S {
        match self.worker.join() {
            Ok(sink) => sink,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Push music frames until stopped or out of time.
fn stream_worker<S, C>(
    sink: &S,
    controller: &C,
    devices: &[DeviceDescriptor],
    duration: Option<Duration>,
    stop: &StopToken,
) where
    S: ReportSink,
    C: HidController,
{
    let start = Instant::now();
    let mut tick = 0;

    while !stop.is_stopped() {
        if duration.map_or(false, |duration| start.elapsed() > duration) {
            break;
        }

        let frame = controller.music_frame(MusicLevels::at_tick(tick));

        // Frames are best-effort, a lost frame is replaced by the next one.
        for device in devices {
            if let Err(err) = sink.write(device, &frame) {
                trace!("Dropped music frame {tick} for device #{}: {err}", device.index);
            }
        }

        tick += 1;
        thread::sleep(TICK_PERIOD);
    }

    debug!("Music stream ended after {tick} frames");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::RecordingSink;
    use crate::locator::test_device;
    use crate::viewsonic_elite_xg270qc::{mode_template, ViewSonicEliteXg270qc};

    #[test]
    fn levels_at_tick_zero() {
        assert_eq!(MusicLevels::at_tick(0), MusicLevels { bass: 128, left: 128, right: 228 });
    }

    #[test]
    fn levels_follow_sinusoids() {
        // Quarter period of the bass channel: sin(0.02 * 78.54) = 1.
        let levels = MusicLevels::at_tick(79);
        assert_eq!(levels.bass, 254);

        for tick in 0..1000 {
            let levels = MusicLevels::at_tick(tick);
            assert!((1..=255).contains(&levels.bass));
            assert!((28..=228).contains(&levels.left));
            assert!((28..=228).contains(&levels.right));
        }
    }

    #[test]
    fn child_token_follows_parent() {
        let parent = StopToken::new();
        let child = parent.child();
        let grandchild = child.child();

        child.stop();
        assert!(child.is_stopped());
        assert!(grandchild.is_stopped());
        assert!(!parent.is_stopped());

        let sibling = parent.child();
        parent.stop();
        assert!(sibling.is_stopped());
    }

    #[test]
    fn sleep_returns_early_when_stopped() {
        let token = StopToken::new();
        assert!(token.sleep(Duration::from_millis(1)));

        token.stop();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stream_without_devices_fails() {
        let result = MusicStream::start(
            RecordingSink::default(),
            ViewSonicEliteXg270qc,
            MusicVariant::Music,
            None,
            Vec::new(),
            StopToken::new(),
        );

        assert!(matches!(result, Err(Error::NoDeviceFound)));
    }

    #[test]
    fn mode_report_precedes_frames() {
        let sink = RecordingSink::default();
        let devices = vec![test_device(0), test_device(1)];

        let (stream, deliveries) = MusicStream::start(
            sink.clone(),
            ViewSonicEliteXg270qc,
            MusicVariant::MusicPulse,
            Some(Duration::from_millis(50)),
            devices,
            StopToken::new(),
        )
        .unwrap();
        assert_eq!(deliveries.len(), 2);

        stream.wait();

        let feature_reports = sink.feature_reports.lock();
        assert_eq!(feature_reports.len(), 2);
        assert_eq!(&feature_reports[0].1[..], &mode_template(Mode::MusicPulse)[..]);

        let writes = sink.writes.lock();
        assert!(writes.len() >= 2);
        let first_frame = ViewSonicEliteXg270qc.music_frame(MusicLevels::at_tick(0));
        assert_eq!(writes[0], (0, first_frame.to_vec()));
        assert_eq!(writes[1], (1, first_frame.to_vec()));
    }

    #[test]
    fn stop_ends_stream() {
        let sink = RecordingSink::default();
        let (stream, _) = MusicStream::start(
            sink.clone(),
            ViewSonicEliteXg270qc,
            MusicVariant::Music,
            None,
            vec![test_device(0)],
            StopToken::new(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        stream.stop();

        let frames = sink.writes.lock().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.writes.lock().len(), frames);
    }

    #[test]
    fn parent_token_ends_stream() {
        let interrupt = StopToken::new();
        let (stream, _) = MusicStream::start(
            RecordingSink::default(),
            ViewSonicEliteXg270qc,
            MusicVariant::Music,
            None,
            vec![test_device(0)],
            interrupt.child(),
        )
        .unwrap();

        interrupt.stop();
        stream.wait();
    }

    #[test]
    fn frame_errors_do_not_end_stream() {
        let sink = RecordingSink { failing: vec![0], ..Default::default() };
        let devices = vec![test_device(0), test_device(1)];

        // Device #0 fails the mode report, but is still part of the stream.
        let (stream, deliveries) = MusicStream::start(
            sink.clone(),
            ViewSonicEliteXg270qc,
            MusicVariant::Music,
            Some(Duration::from_millis(50)),
            devices,
            StopToken::new(),
        )
        .unwrap();
        assert!(deliveries[0].result.is_err());

        stream.wait();

        let writes = sink.writes.lock();
        assert!(writes.len() >= 2);
        assert!(writes.iter().all(|(index, _)| *index == 1));
    }

    #[test]
    fn music_variants_map_to_modes() {
        assert_eq!(MusicVariant::from_mode(Mode::Music), Some(MusicVariant::Music));
        assert_eq!(MusicVariant::from_mode(Mode::MusicPulse), Some(MusicVariant::MusicPulse));
        assert_eq!(MusicVariant::from_mode(Mode::Static), None);
        assert_eq!(MusicVariant::MusicPulse.mode(), Mode::MusicPulse);
    }
}
