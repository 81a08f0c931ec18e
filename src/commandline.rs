use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use spectra_x_lib::protocol as proto;
use std::path::PathBuf;
use std::time::Duration;

pub fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1") // Common default for Windows, though may vary.
    } else {
        String::from("/dev/ttyUSB0") // Common default for USB-to-serial adapters on Linux.
    }
}

/// A channel name and the power to set it to.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSetting {
    pub name: String,
    pub percent: f64,
}

fn parse_percent(s: &str) -> Result<f64, String> {
    let percent = s
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| format!("Invalid power percentage format: {e}"))?;
    proto::PowerLevel::try_from(percent).map_err(|e| e.to_string())?;
    Ok(percent)
}

fn parse_power_setting(s: &str) -> Result<PowerSetting, String> {
    let (name, percent) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("Expected NAME=PERCENT, got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("Missing channel name in '{s}'"));
    }
    Ok(PowerSetting {
        name: name.to_string(),
        percent: parse_percent(percent)?,
    })
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// List the serial ports available on this machine.
    Ports,

    /// Show the configured channels: slot, name, wavelength, bandpass, rated power and TTL pin.
    Channels,

    /// Read and display the light engine temperature.
    Temperature,

    /// Continuously read and display the light engine temperature.
    /// All channels stay switched off.
    #[clap(verbatim_doc_comment)]
    Monitor {
        /// Interval between two readings (e.g., "10s", "1m").
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "2sec")]
        poll_interval: Duration,

        /// Stop after this many readings. Runs until interrupted if omitted.
        #[arg(short, long)]
        count: Option<u64>,
    },

    /// Set power and enable flags, hold them, then switch everything off.
    /// Without --enable the channels stay ready for external TTL triggering:
    /// an enabled channel ignores its TTL input.
    /// **Warning:** This can fire LED emission.
    #[clap(verbatim_doc_comment)]
    Hold {
        /// Power per channel as NAME=PERCENT (e.g., "470=25"). Repeatable.
        #[arg(short, long, value_parser = parse_power_setting, verbatim_doc_comment)]
        power: Vec<PowerSetting>,

        /// Channel to enable. Repeatable.
        #[arg(short, long)]
        enable: Vec<String>,

        /// How long to hold (e.g., "30s"). Waits for Enter if omitted.
        #[arg(short = 't', long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
    },

    /// Enable each channel in turn, ramp its power up in 1 % steps, then disable it.
    /// **Warning:** This fires LED emission.
    #[clap(verbatim_doc_comment)]
    Sweep {
        /// Highest power of the ramp in percent.
        #[arg(short, long, default_value = "20", value_parser = parse_percent)]
        max: f64,

        /// Delay after every step (e.g., "50ms").
        #[arg(short, long, default_value = "0ms", value_parser = humantime::parse_duration)]
        step_delay: Duration,
    },
}

const fn about_text() -> &'static str {
    "Spectra X CLI - Drive the LEDs of a Lumencor Spectra X light engine over its serial interface."
}

#[derive(Parser, Debug)]
#[command(name="spectrax", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: CliCommands,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    /// Defaults to the config file value, then to the platform default.
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub device: Option<String>,

    /// Serial baud rate. The light engine uses 9600.
    #[arg(global = true, long)]
    pub baud_rate: Option<u32>,

    /// Read timeout for every response.
    /// Examples: "250ms", "1s".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// YAML configuration file.
    /// Defaults to "spectrax.yml" in the working directory, if present.
    #[arg(global = true, long, verbatim_doc_comment)]
    pub config: Option<PathBuf>,

    /// Comma separated channel names in slot order V,B,C,TN,GY,R.
    /// Example: "395/25,440/20,470/24,510/25,550/15,640/30".
    /// Defaults to the wavelength of each slot.
    #[arg(global = true, long, value_delimiter = ',', verbatim_doc_comment)]
    pub names: Option<Vec<String>>,

    /// The GY slot carries the yellow filter (575/25) instead of green.
    #[arg(global = true, long)]
    pub yellow_filter: bool,

    /// The TN slot is fitted with the 730/40 NIR LED.
    #[arg(global = true, long)]
    pub teal_to_nir: bool,

    /// The R slot is fitted with the 740/20 NIR LED.
    #[arg(global = true, long)]
    pub red_to_nir: bool,

    /// Do not ask for confirmation before commands that can fire emission.
    #[arg(global = true, short = 'y', long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_setting() {
        assert_eq!(
            parse_power_setting("395/25=12.5"),
            Ok(PowerSetting {
                name: String::from("395/25"),
                percent: 12.5
            })
        );
        assert_eq!(
            parse_power_setting("470=100%").map(|s| s.percent),
            Ok(100.0)
        );
        assert!(parse_power_setting("470").is_err());
        assert!(parse_power_setting("=10").is_err());
        assert!(parse_power_setting("470=101").is_err());
        assert!(parse_power_setting("470=abc").is_err());
    }

    #[test]
    fn parse_hold() {
        let args = CliArgs::try_parse_from([
            "spectrax",
            "--names",
            "a,b,c,d,e,f",
            "hold",
            "-p",
            "a=10",
            "--power",
            "b=20",
            "-e",
            "b",
            "--duration",
            "5s",
        ])
        .unwrap();
        assert_eq!(
            args.names,
            Some(["a", "b", "c", "d", "e", "f"].map(String::from).to_vec())
        );
        assert_eq!(
            args.command,
            CliCommands::Hold {
                power: vec![
                    PowerSetting {
                        name: String::from("a"),
                        percent: 10.0
                    },
                    PowerSetting {
                        name: String::from("b"),
                        percent: 20.0
                    },
                ],
                enable: vec![String::from("b")],
                duration: Some(Duration::from_secs(5)),
            }
        );
    }

    #[test]
    fn global_args_after_command() {
        let args = CliArgs::try_parse_from([
            "spectrax",
            "temperature",
            "--device",
            "/dev/ttyACM0",
            "--timeout",
            "1s",
            "--red-to-nir",
        ])
        .unwrap();
        assert_eq!(args.command, CliCommands::Temperature);
        assert_eq!(args.device.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(args.timeout, Some(Duration::from_secs(1)));
        assert!(args.red_to_nir);
        assert!(!args.yes);
    }

    #[test]
    fn sweep_defaults() {
        let args = CliArgs::try_parse_from(["spectrax", "sweep"]).unwrap();
        assert_eq!(
            args.command,
            CliCommands::Sweep {
                max: 20.0,
                step_delay: Duration::ZERO
            }
        );
        assert!(CliArgs::try_parse_from(["spectrax", "sweep", "--max", "150"]).is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
