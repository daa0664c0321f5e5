//! Corsair Lighting Node CORE CLI tool
//!
//! The controller accepts 64 byte frames on the first OUT endpoint of interface 0. Colors are
//! applied by sending a fixed handshake followed by one frame per color channel.

use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};
use std::num::ParseIntError;
use std::process;
use std::str::FromStr;

use clap::builder::EnumValueParser;
use clap::{
    crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command,
};
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

use crate::controller::{MemoryTransport, UsbTransport};
use crate::error::{Error, ErrorKind};
use crate::frame::{Topology, MAX_FANS, MAX_LEDS_PER_FAN};
use crate::lighting_node_core::{LightingNodeCore, WriteMode};
use crate::usb::{UsbDevice, CORSAIR_VENDOR_ID, LIGHTING_NODE_CORE_PRODUCT_ID};

mod controller;
mod error;
mod frame;
mod lighting_node_core;
mod usb;

/// Colors used to tell the connected fans apart.
const TESTCOLORS: [Rgb; 6] = [
    Rgb { r: 0xff, g: 0x00, b: 0x00 },
    Rgb { r: 0x00, g: 0xff, b: 0x00 },
    Rgb { r: 0x00, g: 0x00, b: 0xff },
    Rgb { r: 0xff, g: 0x00, b: 0xff },
    Rgb { r: 0xff, g: 0xff, b: 0x00 },
    Rgb { r: 0xff, g: 0xff, b: 0xff },
];

/// RGB color.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
}

impl FromStr for Rgb {
    type Err = ();

    fn from_str(s: &str) -> Result<Rgb, ()> {
        let chars = if s.starts_with("0x")
            && s.len() == 8
            && s[2..].bytes().all(|byte| byte.is_ascii_hexdigit())
        {
            &s[2..]
        } else {
            return Err(());
        };

        match u32::from_str_radix(chars, 16) {
            Ok(mut color) => {
                let b = (color & 0xff) as u8;
                color >>= 8;
                let g = (color & 0xff) as u8;
                color >>= 8;
                let r = color as u8;
                Ok(Rgb { r, g, b })
            },
            Err(_) => Err(()),
        }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Device and topology config.
struct Config {
    vendor_id: u16,
    product_id: Option<u16>,
    fans: u8,
    leds_per_fan: u8,
    mode: WriteMode,
    dry_run: bool,
    verbose: bool,
}

impl Config {
    fn from_cli(matches: &ArgMatches) -> Self {
        let mut config = Config::default();

        replace_from_arg(&mut config.vendor_id, matches, "vendor-id");
        replace_from_arg(&mut config.product_id, matches, "product-id");
        replace_from_arg(&mut config.fans, matches, "fans");
        replace_from_arg(&mut config.leds_per_fan, matches, "leds-per-fan");
        replace_from_arg(&mut config.mode, matches, "mode");

        config.dry_run = matches.get_flag("dry-run");
        config.verbose = matches.get_flag("verbose");

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor_id: CORSAIR_VENDOR_ID,
            product_id: Some(LIGHTING_NODE_CORE_PRODUCT_ID),
            fans: MAX_FANS,
            leds_per_fan: MAX_LEDS_PER_FAN,
            mode: Default::default(),
            dry_run: Default::default(),
            verbose: Default::default(),
        }
    }
}

/// Color change requested on the command line.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
enum Action {
    All(Rgb),
    Fan(u8, Rgb),
    Led(u8, u8, Rgb),
    Leds(u8, Rgb),
    FanTest,
}

fn main() {
    let matches = cli();
    let config = Config::from_cli(&matches);

    setup_logging(config.verbose);

    let action = match matches.subcommand() {
        Some(("list", _)) => return list(&config),
        Some(("fantest", _)) => {
            if !confirm_fantest() {
                println!("Bailing out.");
                return;
            }
            Action::FanTest
        },
        Some((name, submatches)) => match action_from_cli(name, submatches) {
            Some(action) => action,
            None => {
                println!("Bailing out.");
                return;
            },
        },
        None => unreachable!("subcommand is required"),
    };

    match run(&config, action) {
        Ok(()) => println!("\x1b[32mSuccessfully applied changes.\x1b[0m"),
        Err(err) => {
            eprintln!("\x1b[31mError:\x1b[0m {err}");
            process::exit(exit_code(&err));
        },
    }
}

/// Install the tracing subscriber, `RUST_LOG` takes precedence over the verbosity flag.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(io::stderr))
        .init();
}

/// Print all devices of the configured vendor.
fn list(config: &Config) {
    match UsbDevice::list(config.vendor_id) {
        Ok(devices) if devices.is_empty() => {
            println!("No devices found for vendor {:04x}.", config.vendor_id)
        },
        Ok(devices) => {
            for device in devices {
                let marker =
                    if device.product_id == LIGHTING_NODE_CORE_PRODUCT_ID { " *" } else { "" };
                println!("{device}{marker}");
            }
        },
        Err(err) => {
            eprintln!("\x1b[31mError:\x1b[0m {err}");
            process::exit(exit_code(&err));
        },
    }
}

/// Ask before overwriting the current lighting with test colors.
fn confirm_fantest() -> bool {
    println!("Are you sure you want to test the connected fans?");
    println!("\x1b[31mThis will overwrite your current lighting\x1b[0m.");
    print!(" [y/N] > ");
    let _ = io::stdout().flush();

    stdin_nextline().map_or(false, |input| input.to_lowercase() == "y")
}

/// Build the requested color change from a subcommand.
fn action_from_cli(name: &str, matches: &ArgMatches) -> Option<Action> {
    let fan = || *matches.get_one::<u8>("fan").expect("fan is required");
    let led = || *matches.get_one::<u8>("led").expect("led is required");

    let action = match name {
        "off" => Action::All(Rgb::BLACK),
        "all" => Action::All(required_color(matches)?),
        "fan" => Action::Fan(fan(), required_color(matches)?),
        "led" => Action::Led(fan(), led(), required_color(matches)?),
        "leds" => Action::Leds(led(), required_color(matches)?),
        _ => unreachable!("unknown subcommand {}", name),
    };

    Some(action)
}

/// Open the controller and apply a color change.
fn run(config: &Config, action: Action) -> Result<(), Error> {
    let topology = Topology::new(config.fans, config.leds_per_fan)?;

    if config.dry_run {
        let mut node = LightingNodeCore::new(MemoryTransport::default(), topology, config.mode)?;
        apply(&mut node, action)?;

        for frame in &node.transport().frames {
            println!("{}", hex(frame));
        }

        return Ok(());
    }

    let device = UsbDevice::open(config.vendor_id, config.product_id)?;
    let mut node = LightingNodeCore::new(device, topology, config.mode)?;
    apply(&mut node, action)?;
    node.close();

    Ok(())
}

/// Apply a color change, pushing it to the device unless that already happened.
fn apply<T: UsbTransport>(node: &mut LightingNodeCore<T>, action: Action) -> Result<(), Error> {
    match action {
        Action::All(color) => node.set_all(color)?,
        Action::Fan(fan, color) => node.set_fan(fan, color)?,
        Action::Led(fan, led, color) => node.set_led(fan, led, color)?,
        Action::Leds(led, color) => node.set_leds(led, color)?,
        Action::FanTest => {
            for fan in 0..node.topology().fan_count() {
                let color = TESTCOLORS[fan as usize];
                println!("Color for fan {fan}: {color}");
                node.set_fan(fan, color)?;
            }
        },
    }

    if node.mode() == WriteMode::Batched {
        node.push()?;
    }

    Ok(())
}

/// Process exit code for an error.
fn exit_code(err: &Error) -> i32 {
    match err.kind() {
        ErrorKind::Config | ErrorKind::Index => 2,
        ErrorKind::Usb => 1,
    }
}

/// Format a frame as space separated hex bytes.
fn hex(frame: &[u8]) -> String {
    frame.iter().map(|byte| format!("{byte:02x}")).collect::<Vec<_>>().join(" ")
}

/// Parse a USB ID in hexadecimal (`0x` prefix) or decimal notation.
fn parse_id(s: &str) -> Result<u16, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => u16::from_str(s),
    }
}

/// Parse a product ID, `any` matches every product of the vendor.
fn parse_product_id(s: &str) -> Result<Option<u16>, ParseIntError> {
    if s.eq_ignore_ascii_case("any") {
        return Ok(None);
    }
    parse_id(s).map(Some)
}

/// Get clap CLI parameters.
fn cli() -> ArgMatches {
    let color = Arg::new("color").help("LED color in RGB [0xRRGGBB]").long("color").short('c');
    let fan = Arg::new("fan")
        .help(format!("Fan index [possible values: 0..{}]", MAX_FANS))
        .long("fan")
        .short('f')
        .required(true)
        .value_parser(value_parser!(u8));
    let led = Arg::new("led")
        .help(format!("LED index on the fan [possible values: 0..{}]", MAX_LEDS_PER_FAN))
        .long("led")
        .short('l')
        .required(true)
        .value_parser(value_parser!(u8));

    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .subcommand_required(true)
        .subcommand(Command::new("all").about("Set every LED").arg(color.clone()))
        .subcommand(
            Command::new("fan").about("Set every LED of one fan").arg(fan.clone()).arg(color.clone()),
        )
        .subcommand(
            Command::new("led").about("Set a single LED").arg(fan).arg(led.clone()).arg(color.clone()),
        )
        .subcommand(Command::new("leds").about("Set the same LED on every fan").arg(led).arg(color))
        .subcommand(Command::new("off").about("Turn every LED off"))
        .subcommand(Command::new("fantest").about("Mark every fan in a unique color"))
        .subcommand(Command::new("list").about("List USB devices of the vendor"))
        .arg(
            Arg::new("vendor-id")
                .help("USB vendor ID")
                .long("vendor-id")
                .value_parser(parse_id),
        )
        .arg(
            Arg::new("product-id")
                .help("USB product ID, `any` to accept every product of the vendor")
                .long("product-id")
                .value_parser(parse_product_id),
        )
        .arg(
            Arg::new("fans")
                .help(format!("Number of connected fans [possible values: 0..={}]", MAX_FANS))
                .long("fans")
                .value_parser(value_parser!(u8)),
        )
        .arg(
            Arg::new("leds-per-fan")
                .help(format!("Number of LEDs per fan [possible values: 0..={}]", MAX_LEDS_PER_FAN))
                .long("leds-per-fan")
                .value_parser(value_parser!(u8)),
        )
        .arg(
            Arg::new("mode")
                .help("When color changes are sent to the device")
                .long("mode")
                .short('m')
                .ignore_case(true)
                .value_parser(EnumValueParser::<WriteMode>::new()),
        )
        .arg(
            Arg::new("dry-run")
                .help("Print the frames instead of writing them to the device")
                .long("dry-run")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .help("Log every frame sent to the device")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue),
        )
        .get_matches()
}

/// Replace config value with the CLI parameter if it is present.
#[inline]
fn replace_from_arg<T>(option: &mut T, matches: &ArgMatches, name: &str)
where
    T: Clone + Send + Sync + 'static,
{
    if let Some(value) = matches.get_one::<T>(name) {
        *option = value.clone();
    }
}

/// Read the color option from CLI or prompt for STDIN if not present.
///
/// Returns `None` once STDIN is closed.
fn required_color<T: FromStr>(matches: &ArgMatches) -> Option<T> {
    match matches.get_one::<String>("color").map(|value| T::from_str(value)) {
        Some(Ok(value)) => return Some(value),
        Some(Err(_)) => eprintln!("\x1b[31mInvalid CLI color parameter.\x1b[0m\n"),
        _ => (),
    }

    loop {
        // Query the user for the option.
        print!("Please select a color (format: 0xRRGGBB):\n > ");
        let _ = io::stdout().flush();

        let input = stdin_nextline()?;

        match T::from_str(&input) {
            Ok(value) => {
                println!();
                break Some(value);
            },
            Err(_) => eprintln!(
                "\x1b[31mColor '{}' does not match format 0xRRGGBB, please try again.\x1b[0m\n",
                input
            ),
        }
    }
}

/// Read next line from STDIN.
#[inline]
fn stdin_nextline() -> Option<String> {
    let mut input = String::new();

    match io::stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}
