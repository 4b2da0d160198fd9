//! Configuration for `rekindle.toml`.
//!
//! # Sections
//!
//! | Section    | Purpose                                           |
//! |------------|---------------------------------------------------|
//! | `[engine]` | Coalescing window, error reporting                |
//! | `[serve]`  | WebSocket endpoint (interface, port)              |
//! | `[watch]`  | Watched roots and ignore patterns                 |
//!
//! Unknown fields are detected at parse time and reported as warnings so a
//! typo in a key never silently falls back to a default.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::log;

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing rekindle.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory, parent of the config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Update engine settings
    pub engine: EngineSection,

    /// WebSocket endpoint settings
    pub serve: ServeSection,

    /// File watcher settings
    pub watch: WatchSection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Coalescing window in milliseconds. Changes landing within this
    /// window of each other produce one update message.
    pub debounce_ms: u64,

    /// Surface classification failures to connected clients as `error`
    /// messages instead of only logging them.
    pub reload_on_error: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            reload_on_error: false,
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            reload_on_error: self.reload_on_error,
        }
    }
}

/// `[serve]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSection {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// Preferred WebSocket port. When taken, the next free port is used.
    pub port: u16,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5277,
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Directories to watch, relative to the project root.
    pub roots: Vec<PathBuf>,

    /// Path substrings excluded from watching.
    pub ignore: Vec<String>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("src")],
            ignore: vec!["node_modules".into(), ".git".into()],
        }
    }
}

// ============================================================================
// loading
// ============================================================================

impl Config {
    /// Load configuration, searching upward from cwd for the config file.
    ///
    /// A missing file is not an error: defaults apply and the project root
    /// is the current directory.
    pub fn load(file_name: &Path) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current working directory")?;

        let Some(config_path) = find_config_file(&cwd, file_name) else {
            let mut config = Self::default();
            config.root = cwd;
            return Ok(config);
        };

        let mut config = Self::from_path(&config_path)?;
        config.root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.clone());
        config.config_path = config_path;
        Ok(config)
    }

    /// Load configuration from a file, warning about unknown fields.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Watched roots resolved against the project root.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        self.watch
            .roots
            .iter()
            .map(|root| self.root.join(root))
            .collect()
    }
}

/// Search for `file_name` in `start` and its ancestors.
fn find_config_file(start: &Path, file_name: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        let candidate = dir.join(file_name);
        candidate.is_file().then_some(candidate)
    })
}

fn print_unknown_fields_warning(fields: &[String], path: &Path) {
    let display_path = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy());
    log!("warning"; "unknown fields in {}, ignoring:", display_path);
    for field in fields {
        eprintln!("- {}", field);
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn parse(content: &str) -> Config {
        Config::from_str(content).expect("config should parse")
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("");
        assert_eq!(config.engine.debounce_ms, 50);
        assert!(!config.engine.reload_on_error);
        assert_eq!(config.serve.port, 5277);
        assert_eq!(
            config.serve.interface,
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
        );
        assert_eq!(config.watch.roots, vec![PathBuf::from("src")]);
    }

    #[test]
    fn engine_section_overrides() {
        let config = parse("[engine]\ndebounce_ms = 200\nreload_on_error = true");
        assert_eq!(config.engine.debounce_ms, 200);
        assert!(config.engine.reload_on_error);

        let engine = config.engine.to_engine_config();
        assert_eq!(engine.debounce, Duration::from_millis(200));
        assert!(engine.reload_on_error);
    }

    #[test]
    fn serve_section_interface_variants() {
        let config = parse("[serve]\ninterface = \"0.0.0.0\"\nport = 8080");
        assert_eq!(config.serve.interface, IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(config.serve.port, 8080);

        let config = parse("[serve]\ninterface = \"::1\"");
        assert_eq!(
            config.serve.interface,
            IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1))
        );
    }

    #[test]
    fn watch_section_overrides() {
        let config = parse("[watch]\nroots = [\"app\", \"lib\"]\nignore = [\"dist\"]");
        assert_eq!(
            config.watch.roots,
            vec![PathBuf::from("app"), PathBuf::from("lib")]
        );
        assert_eq!(config.watch.ignore, vec!["dist".to_string()]);
    }

    #[test]
    fn unknown_fields_are_collected() {
        let (config, ignored) =
            Config::parse_with_ignored("[engine]\ndebounce_ms = 10\ntypo_field = 1").unwrap();
        assert_eq!(config.engine.debounce_ms, 10);
        assert_eq!(ignored, vec!["engine.typo_field".to_string()]);
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rekindle.toml");
        fs::write(&path, "[serve]\nport = 4000\n\n[engine]\ndebounce_ms = 25").unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.serve.port, 4000);
        assert_eq!(config.engine.debounce_ms, 25);
    }

    #[test]
    fn watch_roots_resolve_against_project_root() {
        let mut config = parse("[watch]\nroots = [\"src\"]");
        config.root = PathBuf::from("/project");
        assert_eq!(config.watch_roots(), vec![PathBuf::from("/project/src")]);
    }
}
