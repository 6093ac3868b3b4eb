//! Daemon configuration.

use anyhow::{Context, Result};
use clap::Parser;
use overchan_nntp::{FeedConfig, FeedPolicy, ProxyConfig};
use overchan_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Federated overlay-chan NNTP relay.
#[derive(Parser, Debug)]
#[command(name = "overchand")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "overchand.toml")]
    pub config: PathBuf,

    /// NNTP bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// Relay instance name (leftmost Path component)
    #[arg(long)]
    pub instance_name: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core daemon settings.
    #[serde(default)]
    pub daemon: DaemonSection,
    /// Store directories and tool paths.
    #[serde(default)]
    pub store: StoreSection,
    /// Frontend attachment settings.
    #[serde(default)]
    pub frontend: FrontendSection,
    /// Outbound feeds.
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedSection>,
}

/// `[daemon]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// NNTP bind address.
    pub bind: String,
    /// Relay name, prepended to every Path.
    pub instance_name: String,
    /// Accept posts without a From identity.
    #[serde(default)]
    pub allow_anon: bool,
    /// Accept attachments on anonymous posts.
    #[serde(default)]
    pub allow_anon_attachments: bool,
    /// Accept attachments from remote feeds at all.
    #[serde(default = "default_true")]
    pub allow_attachments: bool,
    /// Offer the full inventory to all feeds on startup.
    #[serde(default)]
    pub sync_on_start: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:1199".to_string(),
            instance_name: "overchan.localhost".to_string(),
            allow_anon: false,
            allow_anon_attachments: false,
            allow_attachments: true,
            sync_on_start: false,
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Committed articles.
    pub store_dir: PathBuf,
    /// In-flight inbound articles.
    pub incoming_dir: PathBuf,
    /// Content-addressed attachments.
    pub attachments_dir: PathBuf,
    /// Thumbnails.
    pub thumbs_dir: PathBuf,
    /// ImageMagick convert binary.
    pub convert_bin: PathBuf,
    /// ffmpeg binary (video frames, audio transcode).
    pub ffmpegthumbnailer_bin: PathBuf,
    /// sox binary (spectrograms).
    pub sox_bin: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("articles/store"),
            incoming_dir: PathBuf::from("articles/incoming"),
            attachments_dir: PathBuf::from("articles/attachments"),
            thumbs_dir: PathBuf::from("articles/thumbs"),
            convert_bin: PathBuf::from("/usr/bin/convert"),
            ffmpegthumbnailer_bin: PathBuf::from("/usr/bin/ffmpeg"),
            sox_bin: PathBuf::from("/usr/bin/sox"),
        }
    }
}

/// `[frontend]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FrontendSection {
    /// Attach the frontend channels.
    #[serde(default)]
    pub enable: bool,
    /// Pubkey granted global moderation rights at startup.
    #[serde(default)]
    pub admin_key: String,
}

/// One `[[feed]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    /// Remote `host:port`.
    pub addr: String,
    /// Feed name used in peer identifiers.
    pub name: String,
    /// Proxy type: empty, `none`, or `socks4a`.
    #[serde(default)]
    pub proxy_type: String,
    /// Proxy address for `socks4a`.
    #[serde(default)]
    pub proxy_addr: String,
    /// Offer our inventory to this feed when it connects.
    #[serde(default)]
    pub sync: bool,
    /// Ordered newsgroup rules, first match wins, default deny.
    #[serde(default)]
    pub policy: Vec<PolicyEntry>,
}

/// One policy rule in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Glob pattern over newsgroup names.
    pub pattern: String,
    /// Verdict on match.
    pub allow: bool,
}

impl Config {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("failed to read config file")?;
            toml::from_str(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        if let Some(ref bind) = args.bind {
            config.daemon.bind = bind.clone();
        }
        if let Some(ref name) = args.instance_name {
            config.daemon.instance_name = name.clone();
        }

        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Store configuration for the article store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            store_dir: self.store.store_dir.clone(),
            incoming_dir: self.store.incoming_dir.clone(),
            attachments_dir: self.store.attachments_dir.clone(),
            thumbs_dir: self.store.thumbs_dir.clone(),
            convert_bin: self.store.convert_bin.clone(),
            ffmpeg_bin: self.store.ffmpegthumbnailer_bin.clone(),
            sox_bin: self.store.sox_bin.clone(),
        }
    }

    /// Compile the outbound feed configurations.
    pub fn feed_configs(&self) -> Result<Vec<FeedConfig>> {
        self.feeds
            .iter()
            .map(|f| {
                let rules: Vec<(String, bool)> = f
                    .policy
                    .iter()
                    .map(|r| (r.pattern.clone(), r.allow))
                    .collect();
                let policy = FeedPolicy::new(&rules)
                    .with_context(|| format!("feed {}: bad policy", f.name))?;
                let proxy = ProxyConfig::from_config(&f.proxy_type, &f.proxy_addr)
                    .with_context(|| format!("feed {}: bad proxy", f.name))?;
                Ok(FeedConfig {
                    name: f.name.clone(),
                    addr: f.addr.clone(),
                    proxy,
                    policy,
                    sync: f.sync,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert!(!config.daemon.instance_name.is_empty());
        assert!(config.daemon.allow_attachments);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn parses_full_file() {
        let toml_src = r#"
[daemon]
bind = "127.0.0.1:1199"
instance_name = "relay.example"
sync_on_start = true

[store]
store_dir = "a/store"
incoming_dir = "a/incoming"
attachments_dir = "a/att"
thumbs_dir = "a/thumbs"
convert_bin = "/usr/bin/convert"
ffmpegthumbnailer_bin = "/usr/bin/ffmpeg"
sox_bin = "/usr/bin/sox"

[[feed]]
addr = "peer.example:119"
name = "peer"
proxy_type = "socks4a"
proxy_addr = "127.0.0.1:9050"
sync = true
policy = [
    { pattern = "overchan.*", allow = true },
    { pattern = "ctl", allow = true },
]
"#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.daemon.instance_name, "relay.example");
        assert!(config.daemon.sync_on_start);
        assert_eq!(config.feeds.len(), 1);

        let feeds = config.feed_configs().unwrap();
        assert_eq!(feeds[0].name, "peer");
        assert!(feeds[0].sync);
        assert!(feeds[0].policy.allows_newsgroup("overchan.test"));
        assert!(feeds[0].policy.allows_newsgroup("ctl"));
        assert!(!feeds[0].policy.allows_newsgroup("alt.binaries"));
    }

    #[test]
    fn bad_policy_pattern_fails() {
        let mut config = Config::default();
        config.feeds.push(FeedSection {
            addr: "x:119".to_string(),
            name: "x".to_string(),
            proxy_type: String::new(),
            proxy_addr: String::new(),
            sync: false,
            policy: vec![PolicyEntry {
                pattern: "over[chan".to_string(),
                allow: true,
            }],
        });
        assert!(config.feed_configs().is_err());
    }
}
