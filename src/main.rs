use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bluealsa::bus::{dbus::SERVICE_NAME, BusKind, DbusBus};
use bluealsa::codec::CodecDirection;
use bluealsa::config::{BaConfig, EnabledProfiles, ProcessConfig};
use bluealsa::exporter::ObjectExporter;
use bluealsa::registry::Registry;

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

/// BlueALSA command line arguments
#[derive(Parser, Debug)]
#[command(name = "bluealsa")]
#[command(version, about = "Bluetooth Audio ALSA Backend", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use only the given HCI device (repeatable, e.g. -i hci0)
    #[arg(short = 'i', long = "device", value_name = "hciX")]
    devices: Vec<String>,

    /// Enable the given profile (repeatable; replaces the default set)
    #[arg(short = 'p', long = "profile", value_name = "NAME")]
    profiles: Vec<String>,

    /// Group owning the audio endpoints (empty for none)
    #[arg(long, value_name = "GROUP")]
    audio_group: Option<String>,

    /// Use native volume control on A2DP
    #[arg(long)]
    a2dp_volume: bool,

    /// Force monophonic A2DP sound
    #[arg(long)]
    a2dp_force_mono: bool,

    /// Force 44.1 kHz A2DP sampling
    #[arg(long)]
    a2dp_force_audio_cd: bool,

    /// Keep A2DP transport alive for SEC seconds after the PCM is closed
    #[arg(long, value_name = "SEC")]
    a2dp_keep_alive: Option<u32>,

    /// Message bus to serve on
    #[arg(short = 'B', long, value_name = "BUS", default_value = "system")]
    bus: BusKind,

    /// Well-known D-Bus name to request
    #[arg(long, value_name = "NAME", default_value = SERVICE_NAME)]
    dbus_name: String,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting BlueALSA v{}", env!("CARGO_PKG_VERSION"));

    let settings = load_settings(&args)?;

    // Runs on the main thread, which also registers the manager
    let config = ProcessConfig::init(settings)?;
    for direction in [CodecDirection::Source, CodecDirection::Sink] {
        let codecs: Vec<_> = config.codecs().for_direction(direction).collect();
        tracing::info!("A2DP {:?} codecs: {:?}", direction, codecs);
    }

    let registry = Arc::new(Registry::with_filter(config.settings().hci_filter.clone()));
    let bus = Arc::new(DbusBus::connect(args.bus, &args.dbus_name)?);
    let exporter = ObjectExporter::new(registry, bus, config);
    exporter.register_manager()?;

    // Incoming calls are served by the bus connection's own executor
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Releases the bus name and every served object
    drop(exporter);

    tracing::info!("BlueALSA stopped");
    Ok(())
}

/// Merge the configuration file (if any) with CLI overrides
fn load_settings(args: &CliArgs) -> anyhow::Result<BaConfig> {
    let mut settings = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            BaConfig::load(path)?
        }
        None => BaConfig::default(),
    };

    if !args.devices.is_empty() {
        settings.hci_filter = args.devices.clone();
    }
    if !args.profiles.is_empty() {
        settings.enable = EnabledProfiles::from_names(&args.profiles)?;
    }
    if let Some(group) = &args.audio_group {
        settings.audio_group = group.clone();
    }
    if args.a2dp_volume {
        settings.a2dp.volume = true;
    }
    if args.a2dp_force_mono {
        settings.a2dp.force_mono = true;
    }
    if args.a2dp_force_audio_cd {
        settings.a2dp.force_44100 = true;
    }
    if let Some(keep_alive) = args.a2dp_keep_alive {
        settings.a2dp.keep_alive = keep_alive;
    }

    settings.validate()?;
    Ok(settings)
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
        LogLevel::Error => "bluealsa=error",
        LogLevel::Warn => "bluealsa=warn",
        LogLevel::Info => "bluealsa=info",
        LogLevel::Verbose => "bluealsa=debug,bluealsa::bus=info",
        LogLevel::Debug => "bluealsa=debug",
        LogLevel::Trace => "bluealsa=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
