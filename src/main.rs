//! modeset - KMS display discovery for the Linux console
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Resource catalog (two-phase)      │
//! ├──────────────────────────────────────────┤
//! │  for each connector:                     │
//! │    inspect → allocate CRTC → provision   │
//! │                          ↓               │
//! │              Device registry             │
//! │                          ↓               │
//! │     activate (optional) → teardown       │
//! └──────────────────────────────────────────┘
//! ```

mod config;
mod kms;
mod signals;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::time::Duration;

fn print_help() {
    println!(
        r#"modeset {} - KMS display discovery and dumb-buffer provisioning

USAGE:
    modeset [OPTIONS] [DEVICE]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -v, --verbose           Log discovery details (same as RUST_LOG=debug)
    -d, --device PATH       DRM device node (default: /dev/dri/card0)
    -a, --activate          Set the discovered modes on their CRTCs
    --hold SECONDS          Keep activated modes up for SECONDS before teardown
    --print-config          Print the effective configuration and exit

EXAMPLES:
    modeset                           List displays on /dev/dri/card0
    modeset /dev/dri/card1 -v         Inspect another card with debug logging
    sudo modeset --activate --hold 5  Light up every display for 5 seconds

CONFIG FILE:
    ~/.config/modeset/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Apply command line overrides on top of the loaded config
fn apply_args(cfg: &mut config::Config, args: &[String]) -> Result<()> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-d" | "--device" => {
                cfg.device.path = iter
                    .next()
                    .context("--device requires a path")?
                    .to_string();
            }
            "-a" | "--activate" => cfg.session.activate = true,
            "--hold" => {
                let value = iter.next().context("--hold requires a number of seconds")?;
                cfg.session.hold_seconds = value
                    .parse()
                    .with_context(|| format!("Invalid --hold value: {}", value))?;
            }
            "-v" | "--verbose" | "--print-config" => {}
            s if s.starts_with("--device=") => {
                cfg.device.path = s["--device=".len()..].to_string();
            }
            s if s.starts_with('-') => bail!("Unknown option: {}", s),
            s => cfg.device.path = s.to_string(),
        }
    }
    Ok(())
}

/// Log a whole-device failure and terminate
fn fatal(err: &kms::ModesetError) -> ! {
    error!("{}", err);
    if matches!(err.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM)) {
        error!("Run as root or add the user to the 'video' group");
    }
    std::process::exit(1);
}

/// Terminate on whole-device failures, pass anything else up
fn check<T>(result: kms::ModesetResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => fatal(&e),
        Err(e) => Err(e.into()),
    }
}

fn print_summary(found: &kms::Discovery) {
    println!(
        "{} connector(s), {} encoder(s), {} CRTC(s)",
        found.catalog.connectors.len(),
        found.catalog.encoders.len(),
        found.catalog.crtcs.len()
    );
    for device in found.registry.iter() {
        let previous = match device.saved_crtc().map(|saved| saved.framebuffer) {
            Some(Some(fb)) => format!("was fb {}", fb),
            Some(None) => "was off".to_string(),
            None => String::new(),
        };
        println!(
            "connector {:>4}  crtc {:>4}  fb {:>4}  {:<16} stride {:>6}  size {:>9}  {}",
            device.connector(),
            device.crtc(),
            device.framebuffer().map(|fb| fb.0).unwrap_or(0),
            device.mode().to_string(),
            device.stride(),
            device.size(),
            previous
        );
    }
    for (id, reason) in &found.skipped {
        if let kms::SkipReason::Inactive(status) = reason {
            println!("connector {:>4}  {:?}", id, status);
        }
    }
    for (id, e) in found.failures() {
        println!("connector {:>4}  skipped: {}", id, e);
    }
}

fn main() -> Result<()> {
    // Check command line arguments
    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("modeset {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut cfg = config::Config::load();
    apply_args(&mut cfg, &args)?;

    if args.iter().any(|a| a == "--print-config") {
        print!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    // Teardown must run even when stopped during the hold period
    signals::setup_signal_handlers();

    let card = check(kms::Card::open(&cfg.device.path, cfg.device.force_probe))?;
    let mut found = check(kms::discover(&card, &cfg.discovery_options()))?;

    print_summary(&found);

    if found.registry.is_empty() {
        warn!(
            "No usable display found on {}",
            card.path().display()
        );
    } else if cfg.session.activate {
        let activated = found.registry.activate(&card);
        info!("{} of {} display(s) activated", activated, found.registry.len());

        if activated > 0 && cfg.session.hold_seconds > 0 {
            let completed = signals::hold(Duration::from_secs(cfg.session.hold_seconds));
            if !completed {
                info!("Shutdown signal received, restoring displays");
            }
        }
    }

    let report = found.registry.release(&card);
    if !report.is_clean() {
        warn!(
            "Teardown finished with {} failure(s)",
            report.failures.len()
        );
    }

    Ok(())
}
