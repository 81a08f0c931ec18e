//! Spectra X CLI
//!
//! A command-line interface (CLI) application for driving the LEDs of a
//! Lumencor Spectra X light engine over its serial interface.
//!
//! This tool allows users to:
//! - List the serial ports of the machine.
//! - Show the channel layout, including filter options and TTL pins.
//! - Read the light engine temperature, once or continuously.
//! - Hold power and enable settings for a while, e.g. to prepare the light
//!   engine for external TTL triggering.
//! - Run a power sweep over every channel.
//!
//! Every connection starts and ends with all channels at zero power and disabled.
//!
//! The CLI leverages the `spectra_x_lib` crate for protocol definitions and controller operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use spectra_x_lib::controller::{Controller, ControllerOptions};
use spectra_x_lib::registry::ChannelRegistry;
use spectra_x_lib::transport::SerialTransport;
use std::sync::mpsc;
use std::time::Duration;
use std::{panic, thread};

mod commandline;
mod config;

fn logging_init(loglevel: LevelFilter) -> Result<LoggerHandle> {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .context("Cannot init logging")?
        .start()
        .context("Cannot start logging")?;

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    Ok(log_handle)
}

/// Why a hold or sweep ends early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Interrupted,
    Enter,
}

/// Routes Ctrl-C into a channel so the controller can still switch everything off.
fn install_interrupt_handler() -> Result<(mpsc::Sender<Release>, mpsc::Receiver<Release>)> {
    let (tx, rx) = mpsc::channel();
    let handler_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = handler_tx.send(Release::Interrupted);
    })
    .context("Cannot install Ctrl-C handler")?;
    Ok((tx, rx))
}

/// Prompts the user for confirmation before a command that can fire emission.
fn confirm_emission(yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    println!("WARNING: This command can fire LED emission! Shutter the LEDs first.");
    Confirm::new()
        .with_prompt("Do you want to continue?")
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")
}

fn open_controller(
    settings: &config::Settings,
    verbose: bool,
) -> Result<Controller<SerialTransport>> {
    info!(
        "Attempting to connect to {} (Baud: {}, timeout: {:?})...",
        settings.device, settings.baud_rate, settings.timeout
    );
    let transport =
        SerialTransport::open_with_baud_rate(&settings.device, settings.baud_rate, settings.timeout)
            .with_context(|| format!("Cannot open serial port {}", settings.device))?;
    debug!("Serial port {} is open", transport.device());
    let mut options = ControllerOptions::default()
        .with_filters(settings.filters)
        .with_timeout(settings.timeout)
        .with_verbose(verbose);
    if let Some(names) = &settings.names {
        options = options.with_names(names.iter().cloned());
    }
    Controller::new(transport, options)
        .with_context(|| format!("Cannot initialize light engine on {}", settings.device))
}

fn handle_ports() -> Result<()> {
    let ports = tokio_serial::available_ports().context("Cannot enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        match port.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => println!(
                "{} (USB {:04x}:{:04x} {})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.as_deref().unwrap_or("Serial Port")
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

fn handle_channels(settings: &config::Settings) -> Result<()> {
    let registry = ChannelRegistry::build(&settings.filters, settings.names.as_deref())
        .context("Invalid channel configuration")?;
    println!("{:<4} {:<12} {:<22} TTL pin", "Slot", "Name", "Spec");
    for channel in &registry {
        println!(
            "{:<4} {:<12} {:<22} {}",
            channel.slot().to_string(),
            channel.name(),
            channel.spec().to_string(),
            channel.slot().ttl_pin()
        );
    }
    Ok(())
}

fn handle_monitor(
    controller: &mut Controller<SerialTransport>,
    poll_interval: Duration,
    count: Option<u64>,
    release: &mpsc::Receiver<Release>,
) -> Result<()> {
    info!("Starting monitor: interval={poll_interval:?}, count={count:?}");
    let mut readings = 0;
    loop {
        let temperature = controller
            .get_temperature()
            .with_context(|| "Cannot read temperature")?;
        println!("Temperature (°C): {temperature:.3}");
        readings += 1;
        if count.is_some_and(|count| readings >= count) {
            return Ok(());
        }
        if release.recv_timeout(poll_interval).is_ok() {
            info!("Monitor interrupted");
            return Ok(());
        }
    }
}

fn handle_hold(
    controller: &mut Controller<SerialTransport>,
    power: &[commandline::PowerSetting],
    enable: &[String],
    duration: Option<Duration>,
    channel: (mpsc::Sender<Release>, &mpsc::Receiver<Release>),
) -> Result<()> {
    let (tx, release) = channel;
    // Powers first: an enabled channel emits at whatever level it holds.
    for setting in power {
        let level = controller
            .set_power(setting.percent, &setting.name)
            .with_context(|| format!("Failed to set power of {}", setting.name))?;
        println!("{}: power {level}", setting.name);
    }
    for name in enable {
        controller
            .set_enable(true, name)
            .with_context(|| format!("Failed to enable {name}"))?;
        println!("{name}: enabled");
    }
    if enable.is_empty() && !power.is_empty() {
        println!("All channels disabled: ready for TTL triggering.");
    }

    let reason = match duration {
        Some(duration) => {
            println!("Holding for {}...", humantime::format_duration(duration));
            release.recv_timeout(duration).ok()
        }
        None => {
            println!("Press Enter to switch all channels off...");
            thread::spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                let _ = tx.send(Release::Enter);
            });
            release.recv().ok()
        }
    };
    debug!("Hold released: {reason:?}");
    Ok(())
}

fn handle_sweep(
    controller: &mut Controller<SerialTransport>,
    max: f64,
    step_delay: Duration,
    release: &mpsc::Receiver<Release>,
) -> Result<()> {
    let names: Vec<String> = controller.registry().names().map(String::from).collect();
    let steps = max.floor() as u32;
    for name in &names {
        println!("Sweeping {name} from 0 to {steps}%...");
        controller
            .set_enable(true, name)
            .with_context(|| format!("Failed to enable {name}"))?;
        for percent in 0..=steps {
            controller
                .set_power(percent as f64, name)
                .with_context(|| format!("Failed to set power of {name} to {percent}%"))?;
            if release.recv_timeout(step_delay).is_ok() {
                warn!("Sweep interrupted");
                return Ok(());
            }
        }
        controller
            .set_enable(false, name)
            .with_context(|| format!("Failed to disable {name}"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter())?;
    info!(
        "Spectra X CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. Commands that need no connection
    if args.command == commandline::CliCommands::Ports {
        return handle_ports();
    }
    let config = config::load_config(args.config.as_deref())?;
    let settings = config::Settings::resolve(&args, config);
    debug!("Settings: {settings:?}");
    if args.command == commandline::CliCommands::Channels {
        return handle_channels(&settings);
    }

    let fires_emission = matches!(
        args.command,
        commandline::CliCommands::Hold { .. } | commandline::CliCommands::Sweep { .. }
    );
    if fires_emission && !confirm_emission(args.yes)? {
        info!("Aborted by user.");
        return Ok(());
    }

    // 3. Connect; this switches every channel off
    let (tx, release) = install_interrupt_handler()?;
    let verbose = args.verbose.log_level_filter() >= LevelFilter::Info;
    let mut controller = open_controller(&settings, verbose)?;

    // 4. Execute the command
    let outcome = match &args.command {
        commandline::CliCommands::Temperature => {
            info!("Executing: Read Temperature");
            controller
                .get_temperature()
                .map(|temperature| println!("Temperature (°C): {temperature:.3}"))
                .with_context(|| "Cannot read temperature")
        }
        commandline::CliCommands::Monitor {
            poll_interval,
            count,
        } => handle_monitor(&mut controller, *poll_interval, *count, &release),
        commandline::CliCommands::Hold {
            power,
            enable,
            duration,
        } => {
            info!("Executing: Hold");
            handle_hold(&mut controller, power, enable, *duration, (tx, &release))
        }
        commandline::CliCommands::Sweep { max, step_delay } => {
            info!("Executing: Sweep up to {max}%");
            handle_sweep(&mut controller, *max, *step_delay, &release)
        }
        commandline::CliCommands::Ports | commandline::CliCommands::Channels => {
            unreachable!("Handled before connecting.")
        }
    };

    // 5. Always switch everything off, even if the command failed
    let closed = controller
        .close()
        .with_context(|| "Failed to switch all channels off while closing");
    match (outcome, closed) {
        (Ok(()), Ok(())) => {
            println!("All channels off, connection closed.");
            Ok(())
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), Err(err)) => Err(err),
        (Err(err), Err(close_err)) => {
            error!("{close_err:#}");
            bail!("{err:#}")
        }
    }
}
