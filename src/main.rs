use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usb_hid_client::config::ConfigStore;
use usb_hid_client::events::SystemEvent;
use usb_hid_client::hid::{keymap, KeyIdentifier, KeyboardModifiers, MouseButton, TouchContact};
use usb_hid_client::otg::SuShell;
use usb_hid_client::state::AppState;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ButtonArg {
    Left,
    Right,
    Middle,
}

impl From<ButtonArg> for MouseButton {
    fn from(arg: ButtonArg) -> Self {
        match arg {
            ButtonArg::Left => MouseButton::Left,
            ButtonArg::Right => MouseButton::Right,
            ButtonArg::Middle => MouseButton::Middle,
        }
    }
}

/// usb-hid-client command line arguments
#[derive(Parser, Debug)]
#[command(name = "usb-hid-client")]
#[command(version, about = "Use a rooted device as a USB keyboard and touchpad", long_about = None)]
struct CliArgs {
    /// JSON configuration file (defaults apply when missing)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the HID functions to the USB gadget and fix device permissions
    Create,
    /// Remove the HID functions and their device nodes
    Delete,
    /// Print gadget and device state as JSON
    Status,
    /// Re-apply ownership and SELinux labels to existing device nodes
    FixPermissions,
    /// Type a string on the host
    Type { text: String },
    /// Press a named key (e.g. enter, f5, a, 7) or an Android keycode
    Key {
        #[arg(required_unless_present = "code")]
        key: Option<String>,
        /// Android KeyEvent keycode instead of a key name
        #[arg(long, conflicts_with = "key")]
        code: Option<u16>,
        #[arg(long)]
        ctrl: bool,
        #[arg(long)]
        shift: bool,
        #[arg(long)]
        alt: bool,
        #[arg(long)]
        meta: bool,
    },
    /// Press a media key (next, previous, play-pause, volume-up, volume-down)
    Media { name: String },
    /// Move the pointer by a relative distance
    Move {
        #[arg(allow_hyphen_values = true)]
        dx: i8,
        #[arg(allow_hyphen_values = true)]
        dy: i8,
    },
    /// Click a mouse button
    Click {
        #[arg(value_enum, default_value = "left")]
        button: ButtonArg,
    },
    /// Send one touchpad contact
    Touch {
        #[arg(long, default_value_t = 0)]
        id: u8,
        #[arg(long)]
        x: i16,
        #[arg(long)]
        y: i16,
        /// Report the finger as lifted
        #[arg(long)]
        lift: bool,
        #[arg(long, default_value_t = 1)]
        contacts: u8,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::debug!("Starting usb-hid-client v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => ConfigStore::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigStore::default(),
    };

    let state = AppState::new(config, Arc::new(SuShell::new()))?;

    match args.command {
        Command::Create => {
            let report = state.gadget.create().await?;
            print_json(&report)?;
            if !report.is_success() {
                anyhow::bail!("gadget created with errors");
            }
        }
        Command::Delete => {
            let report = state.gadget.delete().await?;
            print_json(&report)?;
            if !report.is_success() {
                anyhow::bail!("gadget deleted with errors");
            }
        }
        Command::Status => print_json(&state.gadget.status())?,
        Command::FixPermissions => print_json(&state.gadget.fix_permissions().await?)?,
        input => send_input(&state, input).await?,
    }

    Ok(())
}

/// Queue the reports for one input command and wait until each was written
async fn send_input(state: &AppState, command: Command) -> anyhow::Result<()> {
    let mut rx = state.events.subscribe();
    state.start()?;

    let expected = match command {
        Command::Type { text } => state.hid.type_text(&text)?,
        Command::Key {
            key,
            code,
            ctrl,
            shift,
            alt,
            meta,
        } => {
            let modifiers = KeyboardModifiers {
                left_ctrl: ctrl,
                left_shift: shift,
                left_alt: alt,
                left_meta: meta,
                ..Default::default()
            };
            let id = key_identifier(key.as_deref(), code)
                .context("either a key name or --code is required")?;
            state.hid.press_key(id, &modifiers)?;
            1
        }
        Command::Media { name } => {
            let id = KeyIdentifier::Name(&name);
            if !keymap::is_media_key(id) {
                anyhow::bail!("{} is not a media key", name);
            }
            state.hid.press_key(id, &KeyboardModifiers::default())?;
            1
        }
        Command::Move { dx, dy } => {
            state.hid.enqueue_mouse_move(dx, dy);
            1
        }
        Command::Click { button } => {
            state.hid.enqueue_mouse_click(MouseButton::from(button).to_hid_bit());
            1
        }
        Command::Touch {
            id,
            x,
            y,
            lift,
            contacts,
        } => {
            state.hid.enqueue_touch_contact(TouchContact {
                id,
                tip_switch: !lift,
                x,
                y,
                scan_time: 0,
                contact_count: contacts,
            });
            1
        }
        Command::Create | Command::Delete | Command::Status | Command::FixPermissions => 0,
    };

    let failures = wait_for_reports(&mut rx, expected, Duration::from_secs(10)).await;
    state.shutdown().await;

    if failures > 0 {
        anyhow::bail!("{} of {} report(s) failed", failures, expected);
    }
    Ok(())
}

/// Count delivery results until `expected` arrived; returns the failures
async fn wait_for_reports(
    rx: &mut broadcast::Receiver<SystemEvent>,
    expected: usize,
    timeout: Duration,
) -> usize {
    let mut done = 0;
    let mut failures = 0;

    let wait = async {
        while done < expected {
            match rx.recv().await {
                Ok(SystemEvent::HidReportDelivered { .. }) => done += 1,
                Ok(SystemEvent::HidReportFailed { device, reason, .. }) => {
                    tracing::error!("{}: {}", device, reason);
                    done += 1;
                    failures += 1;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    };

    if tokio::time::timeout(timeout, wait).await.is_err() {
        tracing::error!("Timed out waiting for reports");
    }
    failures + expected.saturating_sub(done)
}

/// Key names are always names, so "7" is the digit key; `--code` picks a keycode
fn key_identifier(key: Option<&str>, code: Option<u16>) -> Option<KeyIdentifier<'_>> {
    match (key, code) {
        (Some(name), _) => Some(KeyIdentifier::Name(name)),
        (None, Some(code)) => Some(KeyIdentifier::Android(code)),
        (None, None) => None,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "usb_hid_client=error",
        LogLevel::Warn => "usb_hid_client=warn",
        LogLevel::Info => "usb_hid_client=info",
        LogLevel::Verbose => "usb_hid_client=debug",
        LogLevel::Debug => "usb_hid_client=debug,tokio=debug",
        LogLevel::Trace => "usb_hid_client=trace,tokio=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_key(argv: &[&str]) -> Option<(Option<String>, Option<u16>)> {
        match CliArgs::try_parse_from(argv).ok()?.command {
            Command::Key { key, code, .. } => Some((key, code)),
            _ => None,
        }
    }

    #[test]
    fn test_numeric_key_is_a_name() {
        let (key, code) = parse_key(&["usb-hid-client", "key", "7"]).unwrap();
        assert_eq!(key.as_deref(), Some("7"));
        assert_eq!(code, None);
        assert_eq!(
            key_identifier(key.as_deref(), code),
            Some(KeyIdentifier::Name("7"))
        );
        assert_eq!(
            keymap::key_identifier_to_scan_code(KeyIdentifier::Name("7")),
            Some(0x24)
        );
    }

    #[test]
    fn test_keycode_flag() {
        let (key, code) = parse_key(&["usb-hid-client", "key", "--code", "66", "--ctrl"]).unwrap();
        assert_eq!(key, None);
        assert_eq!(
            key_identifier(key.as_deref(), code),
            Some(KeyIdentifier::Android(66))
        );
    }

    #[test]
    fn test_key_requires_name_or_code() {
        assert!(CliArgs::try_parse_from(["usb-hid-client", "key"]).is_err());
        assert!(CliArgs::try_parse_from(["usb-hid-client", "key", "a", "--code", "29"]).is_err());
    }
}
