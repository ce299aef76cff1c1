//! Main application entry point for the scripting host
//!
//! Provides CLI interface, configuration loading, and host startup: wires
//! the lifecycle registries, plugin manager, and download manager together,
//! autoloads configured plugins, and drives the tick loop until shutdown.

use clap::{Arg, Command};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use downloads::{DownloadManager, LoggingDownloadTable};
use listener_system::{
    LevelShutdownEvent, LifecycleRegistries, TickEvent, VersionUpdateEvent,
};
use plugin_system::{DylibModuleLoader, PluginManager};
use script_core::{AutoUnloadRegistry, ErrorReporter, TracingReporter};

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host configuration
    pub host: HostSettings,
    /// Plugin configuration
    pub plugins: PluginSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
    /// Version update check configuration
    pub updates: UpdateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Ticks per second driven into the tick listeners
    pub tick_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Plugin directory
    pub directory: String,
    /// Dotted module prefix plugin modules live under
    pub base_import: String,
    /// Plugins loaded at startup
    pub autoload: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Check for a newer host version on startup
    pub check_for_update: bool,
    /// Warn operators when a newer version is found
    pub notify_on_update: bool,
    /// File the deployment tooling writes the latest available version to
    pub version_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostSettings { tick_rate: 10 },
            plugins: PluginSettings {
                directory: "plugins".to_string(),
                base_import: "plugins".to_string(),
                autoload: vec![],
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            updates: UpdateSettings {
                check_for_update: true,
                notify_on_update: true,
                version_file: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.tick_rate == 0 {
            return Err("Tick rate must be at least 1".to_string());
        }

        if self.plugins.directory.is_empty() {
            return Err("Plugin directory cannot be empty".to_string());
        }

        if self.plugins.base_import.is_empty() || self.plugins.base_import.contains(' ') {
            return Err(format!(
                "Invalid base import prefix: '{}'",
                self.plugins.base_import
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        Ok(())
    }
}

// ============================================================================
// CLI Interface
// ============================================================================

/// Command line arguments
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub plugin_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    /// Parse command line arguments
    pub fn parse() -> Self {
        let matches = Command::new("Sparkplug Scripting Host")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Plugin lifecycle host with listener registries and download tables")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("sparkplug.toml"),
            )
            .arg(
                Arg::new("plugins")
                    .short('p')
                    .long("plugins")
                    .value_name("DIR")
                    .help("Plugin directory path"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("Default config path should always be set"),
            ),
            plugin_dir: matches.get_one::<String>("plugins").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

// ============================================================================
// Signal Handling
// ============================================================================

/// Setup graceful shutdown signal handling
async fn setup_signal_handlers() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

// ============================================================================
// Version Update Check
// ============================================================================

/// Compare dotted numeric version strings. Missing segments count as zero.
fn is_newer_version(current: &str, latest: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    let current = parse(current);
    let latest = parse(latest);

    for i in 0..current.len().max(latest.len()) {
        let c = current.get(i).copied().unwrap_or(0);
        let l = latest.get(i).copied().unwrap_or(0);
        if c != l {
            return l > c;
        }
    }
    false
}

/// Check the configured version file for a newer host release and push a
/// version-update event when one is found.
async fn check_for_update(settings: &UpdateSettings, registries: &LifecycleRegistries) {
    if !settings.check_for_update {
        return;
    }
    let Some(version_file) = &settings.version_file else {
        return;
    };

    let latest = match tokio::fs::read_to_string(version_file).await {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            info!("Version check skipped, cannot read {}: {}", version_file, e);
            return;
        }
    };

    let current = env!("CARGO_PKG_VERSION");
    if is_newer_version(current, &latest) {
        if settings.notify_on_update {
            warn!("A newer version is available: {} (running {})", latest, current);
        }
        registries
            .version_update
            .notify(&VersionUpdateEvent {
                current_version: current.to_string(),
                latest_version: latest,
            })
            .await;
    } else {
        info!("Host is up to date (running {})", current);
    }
}

// ============================================================================
// Application
// ============================================================================

/// Main application struct wiring the host subsystems together
pub struct Application {
    config: AppConfig,
    registries: Arc<LifecycleRegistries>,
    auto_unload: Arc<AutoUnloadRegistry>,
    manager: Arc<PluginManager>,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(plugin_dir) = args.plugin_dir {
            config.plugins.directory = plugin_dir.to_string_lossy().to_string();
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        setup_logging(&config.logging, args.json_logs)?;
        display_banner();

        let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingReporter);
        let registries = Arc::new(LifecycleRegistries::new(reporter.clone()));
        let auto_unload = Arc::new(AutoUnloadRegistry::new());
        let loader = Arc::new(DylibModuleLoader::new(&config.plugins.directory));
        let download_manager = DownloadManager::new(Arc::new(LoggingDownloadTable::new()));
        download_manager.attach(&registries).await;

        // The plugin manager hands the download manager to every module
        // context, so plugins can declare paths against the host table.
        let manager = Arc::new(PluginManager::new(
            config.plugins.base_import.clone(),
            loader,
            registries.clone(),
            auto_unload.clone(),
            download_manager,
            reporter,
        ));

        info!(
            "📂 Config: {} | Plugins: {}",
            args.config_path.display(),
            config.plugins.directory
        );

        Ok(Self {
            config,
            registries,
            auto_unload,
            manager,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Sparkplug Scripting Host");
        info!("  🔌 Plugin directory: {}", self.config.plugins.directory);
        info!("  📦 Base import: {}", self.config.plugins.base_import);
        info!("  ⏱ Tick rate: {}/s", self.config.host.tick_rate);

        check_for_update(&self.config.updates, &self.registries).await;

        for plugin_name in &self.config.plugins.autoload {
            match self.manager.get_or_load(plugin_name).await {
                Some(plugin) => {
                    if let Some(info) = plugin.info() {
                        info!(
                            "  📦 {} v{}",
                            info.display_name(),
                            info.version.as_deref().unwrap_or("?")
                        );
                    }
                }
                None => warn!("Autoload plugin '{}' is not available", plugin_name),
            }
        }
        info!("✅ {} plugins loaded", self.manager.plugin_count().await);

        // Drive the tick listeners until shutdown.
        let tick_handle = {
            let registries = self.registries.clone();
            let period =
                tokio::time::Duration::from_secs(1) / self.config.host.tick_rate;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    registries.tick.notify(&TickEvent).await;
                }
            })
        };

        info!("✅ Sparkplug host is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers().await?;

        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        tick_handle.abort();

        self.registries
            .level_shutdown
            .notify(&LevelShutdownEvent)
            .await;
        self.manager.unload_all().await;

        let leftovers = self.auto_unload.tracked_modules();
        if !leftovers.is_empty() {
            warn!("{} modules still hold tracked resources after shutdown", leftovers.len());
        }

        info!("✅ Sparkplug host shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Utilities and Helpers
// ============================================================================

/// Display startup banner using proper logging
fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🔥 SPARKPLUG HOST 🔥          ║");
    info!("║                 v{}                   ║", version);
    info!("║                                          ║");
    info!("║  Plugin Lifecycle Scripting Host         ║");
    info!("║                                          ║");
    info!("║  🔌 Ordered Plugin Manager               ║");
    info!("║  📡 Lifecycle Listener Registries        ║");
    info!("║  📤 Client Download Tables               ║");
    info!("╚══════════════════════════════════════════╝");
}

// ============================================================================
// Tests
// ============================================================================
