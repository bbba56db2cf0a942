use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::access::AccessTables;

/// Top-level configuration, read once at boot from `warden.toml`.
///
/// Only the access tables are re-read at runtime (SIGHUP); everything else
/// requires a restart of the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub mapgen: MapgenConfig,

    #[serde(default)]
    pub access: AccessTables,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable that runs the game server.
    #[serde(default = "default_server_command")]
    pub command: String,

    #[serde(default = "default_server_args")]
    pub args: Vec<String>,

    /// Working directory; server data files live here.
    pub dir: PathBuf,

    /// World data directory, relative to `dir`.
    #[serde(default = "default_world_dir")]
    pub world_dir: String,

    /// In-game chat lines beginning with this character are parsed as
    /// commands instead of being bridged to the chat network.
    #[serde(default = "default_attention")]
    pub attention: char,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_nick")]
    pub nick: String,

    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            nick: default_nick(),
            channel: default_channel(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Destination directory for backup archives, relative to the server dir.
    #[serde(default = "default_backup_dir")]
    pub dir: String,

    /// Files and directories (relative to the server dir) included in each
    /// archive.
    #[serde(default = "default_backup_files")]
    pub files: Vec<String>,

    /// When set, take an automatic backup this often while the server runs.
    #[serde(default)]
    pub interval_minutes: Option<u64>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            files: default_backup_files(),
            interval_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapgenConfig {
    /// External map-generation tool. Empty command disables the verb.
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Where the world data is copied for the tool to read, relative to the
    /// server dir.
    #[serde(default = "default_map_copy_dir")]
    pub world_copy_dir: String,
}

impl Default for MapgenConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            world_copy_dir: default_map_copy_dir(),
        }
    }
}

fn default_server_command() -> String {
    "java".to_string()
}

fn default_server_args() -> Vec<String> {
    vec![
        "-Xms1024M".to_string(),
        "-Xmx1024M".to_string(),
        "-jar".to_string(),
        "server.jar".to_string(),
        "nogui".to_string(),
    ]
}

fn default_world_dir() -> String {
    "world".to_string()
}

fn default_attention() -> char {
    '!'
}

fn default_nick() -> String {
    "warden".to_string()
}

fn default_channel() -> String {
    "#minecraft".to_string()
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

fn default_backup_files() -> Vec<String> {
    [
        "banned-ips.txt",
        "banned-players.txt",
        "ops.txt",
        "server.log",
        "server.properties",
        "world",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_map_copy_dir() -> String {
    "world-mapgen".to_string()
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}
