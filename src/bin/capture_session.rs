//! Capture-session CLI
//!
//! Launches a browser, starts capturing at the given url, and prints every
//! captured event as one JSON object per line on stdout. Intended for
//! piping into the tooling that stores and visualizes test sessions.

use anyhow::Context;
use capture_session::{
    BrowserHistoryState, CaptureArch, CaptureConfig, CaptureError, CaptureEventListener,
    CaptureSession, ChromeClient, LaunchOptions, Operation, ScreenMutation, ScreenTransition,
    WindowsChangedEvent,
};
use clap::{Parser, ValueEnum};
use serde_json::json;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Arch {
    /// Engine polls the page for captured data (default)
    Polling,
    /// Page pushes captured data out-of-band
    Push,
}

#[derive(Parser)]
#[command(name = "capture-session")]
#[command(version)]
#[command(about = "Capture an exploratory-testing session from a live browser", long_about = None)]
struct Cli {
    /// Url to start capturing at
    url: String,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    executable_path: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<String>,

    /// Disable the input-suppression shield
    #[arg(long)]
    no_shield: bool,

    /// Polling interval in milliseconds
    #[arg(long, default_value = "500", value_name = "MS")]
    polling_interval: u64,

    /// Seconds to wait before reloading the first screen
    #[arg(long, default_value = "0", value_name = "SECS")]
    startup_reload_wait: u64,

    /// Capture architecture
    #[arg(long, value_enum, default_value = "polling")]
    capture_arch: Arch,
}

/// Prints each event as a single JSON line: `{"type": ..., "payload": ...}`.
struct JsonLineListener;

impl JsonLineListener {
    fn emit(&self, event_type: &str, payload: serde_json::Value) {
        println!("{}", json!({ "type": event_type, "payload": payload }));
    }
}

impl CaptureEventListener for JsonLineListener {
    fn on_operation(&self, operation: &Operation) {
        self.emit("operation", json!(operation));
    }

    fn on_screen_transition(&self, transition: &ScreenTransition) {
        self.emit("screenTransition", json!(transition));
    }

    fn on_mutation(&self, mutation: &ScreenMutation) {
        self.emit("screenMutation", json!(mutation));
    }

    fn on_history_changed(&self, state: BrowserHistoryState) {
        self.emit("browserHistoryChanged", json!(state));
    }

    fn on_windows_changed(&self, event: &WindowsChangedEvent) {
        self.emit("browserWindowsChanged", json!(event));
    }

    fn on_alert_visibility_changed(&self, visible: bool) {
        self.emit("alertVisibilityChanged", json!({ "visible": visible }));
    }

    fn on_browser_closed(&self) {
        self.emit("browserClosed", json!({}));
    }

    fn on_error(&self, error: &CaptureError) {
        self.emit(
            "error",
            json!({ "code": error.code(), "message": error.to_string() }),
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut options = LaunchOptions::new().headless(!cli.headed);
    if let Some(path) = cli.executable_path {
        options = options.chrome_path(path);
    }
    if let Some(dir) = cli.user_data_dir {
        options = options.user_data_dir(dir);
    }

    let config = CaptureConfig::new()
        .shield_enabled(!cli.no_shield)
        .capture_arch(match cli.capture_arch {
            Arch::Polling => CaptureArch::Polling,
            Arch::Push => CaptureArch::Push,
        })
        .polling_interval_ms(cli.polling_interval)
        .wait_time_for_startup_reload(cli.startup_reload_wait);

    let client = ChromeClient::launch(options).context("Failed to launch browser")?;
    let mut session = CaptureSession::new(client, config, JsonLineListener);

    session
        .start(&cli.url)
        .with_context(|| format!("Failed to start capturing at {}", cli.url))?;

    eprintln!("Capturing {} (Ctrl-C to stop)", cli.url);
    session.run().context("Capture session failed")?;

    Ok(())
}
