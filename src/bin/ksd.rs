use color_eyre::eyre::Result;
use ks_led_controller::*;
use std::env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Parses `R,G,B`
fn parse_rgb(arg: &str) -> std::result::Result<ColorValue, String> {
    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err("Invalid color format. Use R,G,B (e.g., 255,0,0 for red)".to_string());
    }
    let mut rgb = [0i32; 3];
    for (slot, part) in rgb.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("Invalid color component '{}'", part))?;
    }
    ColorValue::new(rgb[0], rgb[1], rgb[2]).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("ks_led_controller=warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    // Get a target id/mac address (and optionally a model prefix) from the command line.
    let usage = "Usage: ksd <id/mac address> [model prefix]";
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{usage}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{usage}");
        std::process::exit(0);
    }
    let prefix = args.get(2).map(String::as_str).unwrap_or(DEFAULT_PREFIX);
    let profile = lookup(prefix)?;

    let controller = LedController::new(BtleTransport::new().await?, WriteConfig::default());
    let target = Target {
        address: args[1].clone(),
        label: profile.name_prefix.to_string(),
        profile,
    };

    let (presets, _) = match default_presets_path() {
        Some(path) => PresetStore::load(path),
        None => PresetStore::load("ks_led_presets.json"),
    };
    let (mut nicknames, _) = match default_nicknames_path() {
        Some(path) => NicknameStore::load(path),
        None => NicknameStore::load("ks_led_devices.json"),
    };

    // Inform about successful initialization
    println!(
        "OK {}",
        nicknames.display_name(&target.address, &target.label)
    );

    // Mainloop: wait for user input, line by line
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(input) = lines.next_line().await? {
        let mut cmd = input.trim().splitn(2, ':');
        let action = match (cmd.next(), cmd.next()) {
            (Some("power_on"), _) => Action::Power(true),
            (Some("power_off"), _) => Action::Power(false),
            (Some("set_color"), Some(arg)) => match parse_rgb(arg) {
                Ok(color) => Action::Color(color, None),
                Err(e) => {
                    eprintln!("ERR {e}");
                    continue;
                }
            },
            (Some("set_brightness"), Some(arg)) => match arg.trim().parse::<i32>() {
                Ok(level) => Action::Brightness(level),
                Err(_) => {
                    eprintln!("ERR Brightness must be a number between 0 and 255");
                    continue;
                }
            },
            (Some("preset"), Some(name)) => match presets.find(name.trim()) {
                Some((_, color)) => Action::Color(color, None),
                None => {
                    eprintln!("ERR Unknown preset: {}", name.trim());
                    continue;
                }
            },
            (Some("nickname"), arg) => {
                match nicknames.set(&target.address, arg.unwrap_or("")) {
                    Ok(_) => println!("OK"),
                    Err(e) => eprintln!("ERR {e}"),
                }
                continue;
            }
            (Some(name @ ("set_color" | "set_brightness" | "preset")), None) => {
                eprintln!("ERR Missing argument for {name}");
                continue;
            }
            (Some(""), _) | (None, _) => {
                eprintln!("ERR No command given");
                continue;
            }
            (Some(other), _) => {
                eprintln!("ERR Unknown command: {other}");
                continue;
            }
        };

        // Respond with OK or the reason it failed
        match controller.apply(&target, &action).await {
            Ok(()) => println!("OK"),
            Err(e) => eprintln!("ERR {e}"),
        }
    }

    Ok(())
}
