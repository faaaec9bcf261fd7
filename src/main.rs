use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, Result};
use ks_led_controller::*;
use std::path::PathBuf;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Control KS smart LED lamps over BLE", long_about = None)]
struct Cli {
    /// Device name prefix (e.g. KS03-, KS04-, KS03~)
    #[arg(short, long, global = true, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// BLE MAC address or platform id (skips the scan)
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Send to every discovered device of the prefix's model (e.g. KS03- and KS03~)
    #[arg(long, global = true)]
    all: bool,

    /// Scan timeout in seconds
    #[arg(short, long, global = true, default_value_t = 8.0, allow_negative_numbers = true)]
    timeout: f64,

    /// Verbose output (debug logs, payloads, services and characteristics)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Presets file (default: ~/.ks_led_presets.json)
    #[arg(long, global = true)]
    presets_file: Option<PathBuf>,

    /// Nicknames file (default: ~/.ks_led_devices.json)
    #[arg(long, global = true)]
    nicknames_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn lights on
    On,
    /// Turn lights off
    Off,
    /// Set custom RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, allow_negative_numbers = true)]
        red: i32,
        /// Green value (0-255)
        #[arg(short, long, allow_negative_numbers = true)]
        green: i32,
        /// Blue value (0-255)
        #[arg(short, long, allow_negative_numbers = true)]
        blue: i32,
        /// Brightness (0-255, floor lamps only)
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<i32>,
    },
    /// Set a saved color preset
    Preset {
        /// Preset name (case-insensitive)
        name: String,
        /// Brightness (0-255, floor lamps only)
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<i32>,
    },
    /// Set brightness (floor lamps only)
    Brightness {
        /// Brightness level (0-255)
        #[arg(short, long, default_value_t = 255, allow_negative_numbers = true)]
        level: i32,
    },
    /// List nearby supported devices
    Scan,
    /// Manage color presets
    Presets {
        #[command(subcommand)]
        action: Option<PresetAction>,
    },
    /// Set or clear a device nickname
    Nickname {
        /// Device address
        address: String,
        /// Nickname; omit to clear
        nickname: Option<String>,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    /// Show all presets
    List,
    /// Add or replace a preset
    Add {
        name: String,
        #[arg(allow_negative_numbers = true)]
        red: i32,
        #[arg(allow_negative_numbers = true)]
        green: i32,
        #[arg(allow_negative_numbers = true)]
        blue: i32,
    },
    /// Delete a preset
    Remove { name: String },
    /// Reset presets to defaults
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ks_led_controller=debug"
    } else {
        "ks_led_controller=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .compact()
        .init();

    color_eyre::install()?;
    debug!("Parsed command line arguments");

    let presets_path = match cli.presets_file.clone().or_else(default_presets_path) {
        Some(path) => path,
        None => bail!("Could not determine home directory, pass --presets-file"),
    };
    let nicknames_path = match cli.nicknames_file.clone().or_else(default_nicknames_path) {
        Some(path) => path,
        None => bail!("Could not determine home directory, pass --nicknames-file"),
    };

    let action = match cli.command {
        Commands::On => Action::Power(true),
        Commands::Off => Action::Power(false),
        Commands::Color {
            red,
            green,
            blue,
            brightness,
        } => Action::Color(ColorValue::new(red, green, blue)?, brightness),
        Commands::Preset {
            ref name,
            brightness,
        } => {
            let (presets, _) = PresetStore::load(presets_path);
            let Some((found, color)) = presets.find(name) else {
                let known: Vec<_> = presets.iter().map(|(n, _)| n).collect();
                bail!("Unknown preset '{}'. Known: {}", name, known.join(", "));
            };
            info!("Using preset '{}' ({})", found, color);
            Action::Color(color, brightness)
        }
        Commands::Brightness { level } => Action::Brightness(level),
        Commands::Presets { action } => {
            return manage_presets(presets_path, action.unwrap_or(PresetAction::List));
        }
        Commands::Nickname {
            ref address,
            ref nickname,
        } => {
            return set_nickname(nicknames_path, address, nickname.as_deref().unwrap_or(""));
        }
        Commands::Scan => {
            let window = scan_window(cli.timeout)?;
            let controller = LedController::new(BtleTransport::new().await?, WriteConfig::default());
            let (nicknames, _) = NicknameStore::load(nicknames_path);
            return list_devices(&controller, &nicknames, window).await;
        }
    };

    let window = scan_window(cli.timeout)?;
    let controller = LedController::new(BtleTransport::new().await?, WriteConfig::default());
    let targets = controller
        .resolve_targets(&cli.prefix, cli.address.as_deref(), cli.all, window)
        .await?;

    run_action(&controller, &targets, &action).await
}

/// Sends `action` to every target and reports per device
#[instrument(skip(controller, targets))]
async fn run_action<T: BleTransport>(
    controller: &LedController<T>,
    targets: &[Target],
    action: &Action,
) -> Result<()> {
    let results = controller.apply_all(targets, action).await;

    let mut failed = 0;
    for (target, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => println!("Sent {} to {} ({})", action, target.address, target.label),
            Err(e) => {
                failed += 1;
                error!("Failed to send to {} ({}): {}", target.address, target.label, e);
                eprintln!("Failed to send to {} ({}): {}", target.address, target.label, e);
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{} of {} device(s) failed", failed, targets.len()));
    }
    Ok(())
}

/// Prints the supported devices in range
async fn list_devices<T: BleTransport>(
    controller: &LedController<T>,
    nicknames: &NicknameStore,
    window: std::time::Duration,
) -> Result<()> {
    let devices = controller.discover(window).await?;
    if devices.is_empty() {
        println!("No KS devices found.");
        println!("Make sure Bluetooth is enabled and devices are powered on.");
        return Ok(());
    }

    for (i, device) in devices.iter().enumerate() {
        println!(
            "{:2}. {} ({}) [{} {}]",
            i + 1,
            nicknames.display_name(&device.address, &device.advertised_name),
            device.address,
            device.profile.name_prefix,
            device.profile.device_class
        );
    }
    Ok(())
}

fn manage_presets(path: PathBuf, action: PresetAction) -> Result<()> {
    let (mut presets, warnings) = PresetStore::load(path);
    for w in &warnings {
        eprintln!("warning: {}", w);
    }

    match action {
        PresetAction::List => {
            for (i, (name, color)) in presets.iter().enumerate() {
                println!("{:2}. {} {} ({})", i + 1, swatch(color), name, color);
            }
        }
        PresetAction::Add {
            name,
            red,
            green,
            blue,
        } => {
            let color = ColorValue::new(red, green, blue)?;
            presets.insert(&name, color)?;
            println!("Preset '{}' saved ({})", name, color);
        }
        PresetAction::Remove { name } => {
            if !presets.remove(&name)? {
                bail!("No preset named '{}'", name);
            }
            println!("Deleted '{}'", name);
        }
        PresetAction::Reset => {
            presets.reset()?;
            println!("Reset to defaults");
        }
    }
    Ok(())
}

fn set_nickname(path: PathBuf, address: &str, nickname: &str) -> Result<()> {
    let (mut nicknames, _) = NicknameStore::load(path);
    let had_nickname = nicknames.get(address).is_some();

    if !nicknames.set(address, nickname)? {
        println!("No changes made");
    } else if nickname.trim().is_empty() && had_nickname {
        println!("Nickname removed");
    } else {
        println!("Nickname set to '{}'", nickname.trim());
    }
    Ok(())
}

/// A block of the color itself, in terminals with truecolor support
fn swatch(color: ColorValue) -> String {
    format!(
        "\x1b[38;2;{};{};{}m█████\x1b[0m",
        color.r, color.g, color.b
    )
}
