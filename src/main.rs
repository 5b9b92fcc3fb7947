//! ViewSonic Elite RGB CLI tool
//!
//! The lighting controller of ViewSonic Elite monitors is driven through HID feature reports, one
//! report selects the lighting mode and colors of both zones. Music modes additionally expect a
//! steady stream of level frames as raw output reports.

use std::fmt::{self, Display, Formatter};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use clap::{crate_description, crate_name, crate_version, value_parser};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueEnum};
use log::{info, warn, LevelFilter};

use crate::color::{ColorArg, PALETTE};
use crate::controller::{HidController, ZoneColors};
use crate::dispatcher::{Delivery, HidBus, ReportSink};
use crate::error::Error;
use crate::locator::DeviceDescriptor;
use crate::music::{MusicStream, MusicVariant, StopToken};
use crate::viewsonic_elite_xg270qc::ViewSonicEliteXg270qc;

mod color;
mod controller;
mod dispatcher;
mod error;
mod locator;
mod music;
mod viewsonic_elite_xg270qc;

/// Time each mode is shown during the demo.
const MODE_DWELL: Duration = Duration::from_secs(5);

/// Time each palette color is shown during the demo.
const COLOR_DWELL: Duration = Duration::from_secs(3);

/// Lighting mode.
#[derive(ValueEnum, PartialEq, Eq, Debug, Copy, Clone)]
enum Mode {
    Static,
    Rainbow,
    Breathing,
    Stack,
    WarpSpeed,
    Music,
    MusicPulse,
}

impl Mode {
    /// Name used on the command line.
    fn name(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rainbow => "rainbow",
            Self::Breathing => "breathing",
            Self::Stack => "stack",
            Self::WarpSpeed => "warp-speed",
            Self::Music => "music",
            Self::MusicPulse => "music-pulse",
        }
    }

    /// Check if the mode is rendered with the zone colors.
    fn uses_colors(self) -> bool {
        !matches!(self, Self::Rainbow | Self::WarpSpeed)
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        <Self as ValueEnum>::from_str(s, true).map_err(|_| Error::UnknownMode(s.into()))
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Top-level command.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
enum Action {
    /// Print all supported devices.
    List,
    /// Cycle through all modes and palette colors.
    Demo,
    /// Replay a captured feature report.
    Raw,
    /// Select a lighting mode.
    Mode(Mode),
}

impl Action {
    /// Check if the command runs until stopped by Ctrl+C.
    fn is_long_running(self) -> bool {
        match self {
            Self::Demo => true,
            Self::Mode(mode) => MusicVariant::from_mode(mode).is_some(),
            Self::List | Self::Raw => false,
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(Self::List),
            "demo" => Ok(Self::Demo),
            "raw" => Ok(Self::Raw),
            _ => s.parse().map(Self::Mode),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Demo => write!(f, "demo"),
            Self::Raw => write!(f, "raw"),
            Self::Mode(mode) => write!(f, "{mode}"),
        }
    }
}

/// Run configuration.
#[derive(Debug)]
struct Config {
    action: Action,
    color: Option<ColorArg>,
    rear: Option<ColorArg>,
    device: Option<usize>,
    duration: Option<Duration>,
    report: Vec<u8>,
}

impl Config {
    fn from_cli(matches: &ArgMatches) -> Result<Self, Error> {
        let mut config = Config::default();

        if let Some(action) = cli_from_str(matches, "command") {
            config.action = action?;
        }

        config.color = cli_from_str(matches, "color").transpose()?;
        config.rear = cli_from_str(matches, "rear").transpose()?;
        config.device = matches.get_one::<usize>("device").copied();
        config.duration = matches.get_one::<u64>("duration").copied().map(Duration::from_secs);

        if let Some(mut bytes) = matches.get_many::<String>("bytes") {
            if config.action != Action::Raw {
                let first = bytes.next().cloned().unwrap_or_default();
                return Err(Error::UnexpectedArgument(first));
            }
            config.report = parse_hex(bytes.map(String::as_str))?;
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            action: Action::Demo,
            color: Default::default(),
            rear: Default::default(),
            device: Default::default(),
            duration: Default::default(),
            report: Default::default(),
        }
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", crate_name!(), self.action)?;

        if let Some(color) = &self.color {
            write!(f, " --color {color}")?;
        }

        if let Some(rear) = &self.rear {
            write!(f, " --rear {rear}")?;
        }

        if let Some(device) = self.device {
            write!(f, " --device {device}")?;
        }

        if let Some(duration) = self.duration {
            write!(f, " --duration {}", duration.as_secs())?;
        }

        for byte in &self.report {
            write!(f, " {byte:02x}")?;
        }

        Ok(())
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logger(matches.get_count("verbose"));

    match Config::from_cli(&matches).and_then(|config| run(&config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\x1b[31mError:\x1b[0m {err}");
            if let Error::UnknownMode(_) = err {
                eprintln!("Available commands: list, demo, raw, {}", mode_names().join(", "));
            }
            ExitCode::FAILURE
        },
    }
}

/// Execute the configured command.
fn run(config: &Config) -> Result<(), Error> {
    info!("Running: {config}");

    let bus = HidBus::new()?;

    // One-shot commands keep the default handler, so Ctrl+C still kills them while blocked on I/O.
    let interrupt = StopToken::new();
    if config.action.is_long_running() {
        let handler_interrupt = interrupt.clone();
        if let Err(err) = ctrlc::set_handler(move || handler_interrupt.stop()) {
            warn!("Unable to install Ctrl+C handler: {err}");
        }
    }

    match config.action {
        Action::List => {
            list(&bus);
            Ok(())
        },
        Action::Demo => demo(&bus, config, &interrupt),
        Action::Raw => raw(&bus, config),
        Action::Mode(mode) => match MusicVariant::from_mode(mode) {
            Some(variant) => music(&bus, variant, config, &interrupt),
            None => set_mode(&bus, mode, config),
        },
    }
}

/// Print all supported devices.
fn list(bus: &HidBus) {
    let devices = bus.find_devices(&ViewSonicEliteXg270qc);

    if devices.is_empty() {
        println!("\nNo ViewSonic devices found!");
        return;
    }

    println!("\nFound {} ViewSonic device(s):\n", devices.len());
    println!("{:<8} {:<30} {:<20} {:<15}", "Index", "Device", "Serial", "Manufacturer");
    println!("{}", "-".repeat(73));

    for device in devices {
        println!(
            "{:<8} {:<30} {:<20} {:<15}",
            device.index, device.product, device.serial, device.manufacturer
        );
    }
}

/// Select a non-music lighting mode.
fn set_mode(bus: &HidBus, mode: Mode, config: &Config) -> Result<(), Error> {
    if config.duration.is_some() {
        warn!("Ignoring --duration, {mode} is not a music mode");
    }

    let controller = ViewSonicEliteXg270qc;
    let (report, colors) =
        build_report(&controller, mode, config.color.as_ref(), config.rear.as_ref())?;

    if !mode.uses_colors() && colors != ZoneColors::default() {
        warn!("Mode {mode} does not use zone colors");
    }

    let devices = target_devices(bus, &controller, config.device)?;
    send_report(bus, &devices, &report, |device| {
        format!("Set {} (#{}) to {mode}{}", device.product, device.index, describe_colors(colors))
    })
}

/// Select a music mode and stream levels to it.
fn music(
    bus: &HidBus,
    variant: MusicVariant,
    config: &Config,
    interrupt: &StopToken,
) -> Result<(), Error> {
    if config.color.is_some() || config.rear.is_some() {
        warn!("Ignoring colors, {} uses the built-in palette", variant.mode());
    }

    let controller = ViewSonicEliteXg270qc;
    let devices = target_devices(bus, &controller, config.device)?;

    let (stream, deliveries) = MusicStream::start(
        bus.clone(),
        controller,
        variant,
        config.duration,
        devices,
        interrupt.child(),
    )?;

    let mode = variant.mode();
    let result = print_deliveries(&deliveries, |device| {
        format!("Set {} (#{}) to {mode}", device.product, device.index)
    });

    match config.duration {
        Some(duration) => {
            println!("Streaming music levels for {}s.", duration.as_secs());
            interrupt.sleep(duration);
            stream.stop();
        },
        None => {
            println!("Streaming music levels, press Ctrl+C to stop.");
            stream.wait();
        },
    }

    println!("Music mode stopped");

    result
}

/// Cycle through all modes, then through all palette colors.
fn demo(bus: &HidBus, config: &Config, interrupt: &StopToken) -> Result<(), Error> {
    let controller = ViewSonicEliteXg270qc;
    let devices = target_devices(bus, &controller, config.device)?;

    println!("Running demo, press Ctrl+C to stop.\n");

    for &mode in Mode::value_variants() {
        if interrupt.is_stopped() {
            return Ok(());
        }

        println!("Mode: {mode}");

        match MusicVariant::from_mode(mode) {
            Some(variant) => {
                let (stream, deliveries) = MusicStream::start(
                    bus.clone(),
                    controller,
                    variant,
                    Some(MODE_DWELL),
                    devices.clone(),
                    interrupt.child(),
                )?;
                report_demo_failures(&deliveries);
                stream.wait();
            },
            None => {
                let report = controller.mode_report(mode, ZoneColors::default());
                let deliveries = dispatcher::broadcast(&devices, |device| {
                    bus.send_feature_report(device, &report)
                })?;
                report_demo_failures(&deliveries);
                interrupt.sleep(MODE_DWELL);
            },
        }
    }

    for (name, color) in PALETTE {
        if interrupt.is_stopped() {
            return Ok(());
        }

        println!("Color {name}: {color}");

        let report = controller.mode_report(Mode::Static, ZoneColors::new(Some(color), None));
        let deliveries =
            dispatcher::broadcast(&devices, |device| bus.send_feature_report(device, &report))?;
        report_demo_failures(&deliveries);
        interrupt.sleep(COLOR_DWELL);
    }

    Ok(())
}

/// Send a captured feature report.
fn raw(bus: &HidBus, config: &Config) -> Result<(), Error> {
    if config.report.is_empty() {
        return Err(Error::InvalidReport("no report bytes given".into()));
    }

    let controller = ViewSonicEliteXg270qc;
    let report = controller.raw_report(&config.report)?;

    let devices = target_devices(bus, &controller, config.device)?;
    send_report(bus, &devices, &report, |device| {
        format!("Sent {} byte report to {} (#{})", report.len(), device.product, device.index)
    })
}

/// Build the feature report for a mode.
///
/// Without a rear color, the base color is used for both zones.
fn build_report(
    controller: &dyn HidController,
    mode: Mode,
    color: Option<&ColorArg>,
    rear: Option<&ColorArg>,
) -> Result<(Bytes, ZoneColors), Error> {
    let base = color.map(ColorArg::resolve).transpose()?;
    let rear = rear.map(ColorArg::resolve).transpose()?;

    let colors = ZoneColors::new(base, rear);
    Ok((controller.mode_report(mode, colors), colors))
}

/// Located devices narrowed down to the `--device` selection.
fn target_devices(
    bus: &HidBus,
    controller: &dyn HidController,
    index: Option<usize>,
) -> Result<Vec<DeviceDescriptor>, Error> {
    locator::select_devices(bus.find_devices(controller), index)
}

/// Broadcast a feature report and print the outcome for every device.
fn send_report<F>(
    bus: &HidBus,
    devices: &[DeviceDescriptor],
    report: &[u8],
    describe: F,
) -> Result<(), Error>
where
    F: Fn(&DeviceDescriptor) -> String,
{
    let deliveries =
        dispatcher::broadcast(devices, |device| bus.send_feature_report(device, report))?;
    print_deliveries(&deliveries, describe)
}

/// Print broadcast results, failing if any device could not be updated.
fn print_deliveries<F>(deliveries: &[Delivery], describe: F) -> Result<(), Error>
where
    F: Fn(&DeviceDescriptor) -> String,
{
    let mut failed = 0;

    for delivery in deliveries {
        match &delivery.result {
            Ok(()) => println!("{}", describe(&delivery.device)),
            Err(err) => {
                failed += 1;
                eprintln!("\x1b[31mError:\x1b[0m device #{}: {err}", delivery.device.index);
            },
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(Error::DeviceIo(format!("{failed} of {} device(s) failed", deliveries.len())))
    }
}

/// Report failed devices without interrupting the demo.
fn report_demo_failures(deliveries: &[Delivery]) {
    for delivery in deliveries {
        if let Err(err) = &delivery.result {
            eprintln!("Skipping device #{}: {err}", delivery.device.index);
        }
    }
}

/// Human-readable zone colors for status output.
fn describe_colors(colors: ZoneColors) -> String {
    match (colors.base, colors.rear) {
        (Some(base), Some(rear)) if base != rear => format!(" (base: {base}, rear: {rear})"),
        (Some(base), _) => format!(" ({base})"),
        (None, Some(rear)) => format!(" (rear: {rear})"),
        (None, None) => String::new(),
    }
}

/// Names of all lighting modes.
fn mode_names() -> Vec<&'static str> {
    Mode::value_variants().iter().map(|mode| mode.name()).collect()
}

/// Parse hex report bytes, either as separate tokens or as one continuous string.
fn parse_hex<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();

    for token in tokens.flat_map(str::split_whitespace) {
        let digits = token.strip_prefix("0x").unwrap_or(token);
        if digits.is_empty() || digits.len() % 2 != 0 {
            return Err(Error::InvalidReport(format!("'{token}' is not a sequence of hex bytes")));
        }

        for i in (0..digits.len()).step_by(2) {
            let byte = digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| Error::InvalidReport(format!("invalid hex byte in '{token}'")))?;
            bytes.push(byte);
        }
    }

    Ok(bytes)
}

/// Setup log output.
fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

/// Get clap CLI parameters.
fn cli() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("command")
                .help(format!(
                    "Command or lighting mode [possible values: list, demo, raw, {}]",
                    mode_names().join(", ")
                ))
                .index(1),
        )
        .arg(
            Arg::new("bytes")
                .help("Feature report bytes in hex, used by `raw`")
                .index(2)
                .num_args(1..),
        )
        .arg(
            Arg::new("color")
                .help("Base zone color, also used for the rear zone unless --rear is given \
                       [palette name, 0xRRGGBB or R,G,B]")
                .long("color")
                .short('c')
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("rear")
                .help("Rear zone color [palette name, 0xRRGGBB or R,G,B]")
                .long("rear")
                .short('r')
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("device")
                .help("Device index as shown by `list` [default: all devices]")
                .long("device")
                .short('d')
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("duration")
                .help("Music streaming duration in seconds [default: until Ctrl+C]")
                .long("duration")
                .short('t')
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("verbose")
                .help("Increase log verbosity")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
        .after_help(format!(
            "Palette colors: {}",
            PALETTE.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ")
        ))
}

/// Convert a CLI option from the parameter string.
#[inline]
fn cli_from_str<T>(matches: &ArgMatches, name: &str) -> Option<Result<T, <T as FromStr>::Err>>
where
    T: FromStr,
{
    matches.get_one::<String>(name).map(|value| T::from_str(value))
}
