/*
 *  config.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Startup settings: YAML file layered under command line overrides
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use embedded_graphics::mono_font::MonoFont;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::display::surface::{font_by_name, FONT_NAMES};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_ROWS: u32 = 32;
pub const DEFAULT_COLS: u32 = 64;
pub const DEFAULT_CHAIN_LENGTH: u32 = 2;
pub const DEFAULT_PARALLEL: u32 = 1;
pub const DEFAULT_FONT: &str = "10x20";
pub const DEFAULT_SNAPSHOT_FPS: u32 = 2;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level startup settings. Unset values fall back to the defaults above.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub server: Option<ServerConfig>,
    pub panel: Option<PanelConfig>,
    pub shutdown_timeout_secs: Option<u64>,
    /// JSON scene configuration shown until the first one arrives
    pub scenes: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Panel geometry: `cols x chain_length` wide, `rows x parallel` high
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PanelConfig {
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub chain_length: Option<u32>,
    pub parallel: Option<u32>,
    pub font: Option<String>,
    /// Where the headless panel mirrors frames as PPM
    pub snapshot: Option<PathBuf>,
    pub snapshot_fps: Option<u32>,
}

impl PanelConfig {
    pub fn width(&self) -> u32 {
        self.cols.unwrap_or(DEFAULT_COLS) * self.chain_length.unwrap_or(DEFAULT_CHAIN_LENGTH)
    }

    pub fn height(&self) -> u32 {
        self.rows.unwrap_or(DEFAULT_ROWS) * self.parallel.unwrap_or(DEFAULT_PARALLEL)
    }

    pub fn font_name(&self) -> &str {
        self.font.as_deref().unwrap_or(DEFAULT_FONT)
    }

    /// Resolved font; names are checked by `validate`
    pub fn font(&self) -> Option<&'static MonoFont<'static>> {
        font_by_name(self.font_name())
    }

    pub fn snapshot_fps(&self) -> u32 {
        self.snapshot_fps.unwrap_or(DEFAULT_SNAPSHOT_FPS).max(1)
    }
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn listen_addr(&self) -> String {
        let server = self.server.clone().unwrap_or_default();
        format!(
            "{}:{}",
            server.bind.as_deref().unwrap_or(DEFAULT_BIND),
            server.port.unwrap_or(DEFAULT_PORT)
        )
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn panel(&self) -> PanelConfig {
        self.panel.clone().unwrap_or_default()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "lymatrix", about = "LyMatrix LED matrix scene server", version, disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// shorthand for --log-level debug
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(short, long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub rows: Option<u32>,
    #[arg(long)]
    pub cols: Option<u32>,
    #[arg(long)]
    pub chain_length: Option<u32>,
    #[arg(long)]
    pub parallel: Option<u32>,
    /// one of 6x10, 8x13, 9x15, 10x20
    #[arg(long)]
    pub font: Option<String>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub snapshot: Option<PathBuf>,
    #[arg(long)]
    pub snapshot_fps: Option<u32>,
    /// initial scene configuration (JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub scenes: Option<PathBuf>,
    #[arg(long)]
    pub shutdown_timeout_secs: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_from(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Layer defaults, YAML and `cli`, then validate
pub fn load_from(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/lymatrix/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/lymatrix/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/lymatrix.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["lymatrix.yaml", "config.yaml", "config/lymatrix.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()              { dst.log_level = src.log_level; }
    if src.shutdown_timeout_secs.is_some()  { dst.shutdown_timeout_secs = src.shutdown_timeout_secs; }
    if src.scenes.is_some()                 { dst.scenes = src.scenes; }
    match (&mut dst.server, src.server) {
        (None, Some(c)) => dst.server = Some(c),
        (Some(d), Some(s)) => merge_server(d, s),
        _ => {}
    }
    match (&mut dst.panel, src.panel) {
        (None, Some(c)) => dst.panel = Some(c),
        (Some(d), Some(s)) => merge_panel(d, s),
        _ => {}
    }
}

fn merge_server(dst: &mut ServerConfig, src: ServerConfig) {
    if src.bind.is_some() { dst.bind = src.bind; }
    if src.port.is_some() { dst.port = src.port; }
}

fn merge_panel(dst: &mut PanelConfig, src: PanelConfig) {
    if src.rows.is_some()          { dst.rows = src.rows; }
    if src.cols.is_some()          { dst.cols = src.cols; }
    if src.chain_length.is_some()  { dst.chain_length = src.chain_length; }
    if src.parallel.is_some()      { dst.parallel = src.parallel; }
    if src.font.is_some()          { dst.font = src.font; }
    if src.snapshot.is_some()      { dst.snapshot = src.snapshot; }
    if src.snapshot_fps.is_some()  { dst.snapshot_fps = src.snapshot_fps; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()              { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                            { cfg.log_level = Some("debug".into()); }
    if cli.scenes.is_some()                 { cfg.scenes = cli.scenes.clone(); }
    if cli.shutdown_timeout_secs.is_some()  { cfg.shutdown_timeout_secs = cli.shutdown_timeout_secs; }

    merge(cfg, Config {
        server: Some(ServerConfig { bind: cli.bind.clone(), port: cli.port }),
        panel: Some(PanelConfig {
            rows: cli.rows,
            cols: cli.cols,
            chain_length: cli.chain_length,
            parallel: cli.parallel,
            font: cli.font.clone(),
            snapshot: cli.snapshot.clone(),
            snapshot_fps: cli.snapshot_fps,
        }),
        ..Default::default()
    });
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(panel) = cfg.panel.as_ref() {
        let dims = [panel.rows, panel.cols, panel.chain_length, panel.parallel];
        if dims.iter().flatten().any(|&v| v == 0) {
            return Err(ConfigError::Validation(
                "panel rows/cols/chain_length/parallel must be > 0".into(),
            ));
        }
        if panel.font().is_none() {
            return Err(ConfigError::Validation(format!(
                "panel font must be one of {}, got '{}'",
                FONT_NAMES.join("|"),
                panel.font_name()
            )));
        }
        if panel.snapshot_fps == Some(0) {
            return Err(ConfigError::Validation("panel snapshot_fps must be > 0".into()));
        }
    }
    if cfg.shutdown_timeout_secs == Some(0) {
        return Err(ConfigError::Validation("shutdown_timeout_secs must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("lymatrix").chain(args.iter().copied()))
    }

    fn write_yaml(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lymatrix-{}-{}.yaml", name, std::process::id()));
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8765");
        assert_eq!(cfg.log_level(), "info");
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(5));

        let panel = cfg.panel();
        assert_eq!((panel.width(), panel.height()), (128, 32));
        assert_eq!(panel.font_name(), "10x20");
        assert!(panel.font().is_some());
        assert_eq!(panel.snapshot_fps(), 2);
    }

    #[test]
    fn test_yaml_then_cli_precedence() {
        let path = write_yaml(
            "precedence",
            "log_level: warn\nserver:\n  port: 9000\npanel:\n  rows: 16\n  cols: 32\n  font: 6x10\n",
        );
        let path_arg = path.to_string_lossy().into_owned();
        let cfg = load_from(&cli(&["--config", &path_arg, "--cols", "64", "--bind", "127.0.0.1"])).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(cfg.log_level(), "warn");
        assert_eq!(cfg.listen_addr(), "127.0.0.1:9000");
        let panel = cfg.panel();
        assert_eq!(panel.rows, Some(16));
        assert_eq!(panel.cols, Some(64));
        assert_eq!(panel.font_name(), "6x10");
        assert_eq!(panel.width(), 128);
        assert_eq!(panel.height(), 16);
    }

    /// Load with an empty YAML file so no search path leaks into the test
    fn load_with(name: &str, args: &[&str]) -> Result<Config, ConfigError> {
        let path = write_yaml(name, "{}\n");
        let path_arg = path.to_string_lossy().into_owned();
        let mut full = vec!["--config", path_arg.as_str()];
        full.extend_from_slice(args);
        let result = load_from(&cli(&full));
        fs::remove_file(&path).ok();
        result
    }

    #[test]
    fn test_debug_flag() {
        let cfg = load_with("debug", &["-d"]).unwrap();
        assert_eq!(cfg.log_level(), "debug");
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_from(&cli(&["--config", "/no/such/lymatrix.yaml"])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_bad_yaml() {
        let path = write_yaml("bad", "panel: [1, 2\n");
        let path_arg = path.to_string_lossy().into_owned();
        let err = load_from(&cli(&["--config", &path_arg])).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_validation() {
        for (i, args) in [
            &["--rows", "0"][..],
            &["--font", "5x7"][..],
            &["--snapshot-fps", "0"][..],
            &["--shutdown-timeout-secs", "0"][..],
        ]
        .iter()
        .enumerate()
        {
            let err = load_with(&format!("invalid{}", i), args).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)), "{:?}", args);
        }
    }

    #[test]
    fn test_dump_is_yaml_round_trippable() {
        let cfg = load_with("dump", &["--port", "1234"]).unwrap();
        let text = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
