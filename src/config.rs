use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use crate::osc::DEFAULT_MAX_PACKET_SIZE;
use crate::playback::{PlaybackSpeed, MAX_SPEED, MIN_SPEED};

/// 統計ログ間隔の上限（秒）
pub const MAX_STATS_INTERVAL_SECS: f32 = 3600.0;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OscConfig {
    /// 送信先ホスト
    #[serde(default = "default_host")]
    pub host: String,
    /// 送信先ポート
    #[serde(default = "default_port")]
    pub port: u16,
    /// 1データグラムの最大バイト数
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// 空フレームが続く区間を早送りする
    #[serde(default)]
    pub skip_empty_segments: bool,
    /// 通常再生の速度倍率
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// 早送りの速度倍率
    #[serde(default = "default_fast_forward_speed")]
    pub fast_forward_speed: f32,
    /// 開始フレーム（指定時はシークしない）
    #[serde(default)]
    pub start_frame: Option<u64>,
    /// 終端で開始フレームに戻る
    #[serde(default)]
    pub loop_playback: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub verbose: bool,
    /// 統計ログの間隔（秒）
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: f32,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 15002 }
fn default_max_packet_size() -> usize { DEFAULT_MAX_PACKET_SIZE }
fn default_speed() -> f32 { 1.0 }
fn default_fast_forward_speed() -> f32 { 10.0 }
fn default_stats_interval() -> f32 { 1.0 }

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_empty_segments: false,
            speed: default_speed(),
            fast_forward_speed: default_fast_forward_speed(),
            start_frame: None,
            loop_playback: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl OscConfig {
    /// "host:port"
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルがなければデフォルト。読めても不正な内容ならエラー
    ///
    /// ログ初期化前に呼ばれるので、ファイルの有無は呼び出し側でログする。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        let speeds = [
            ("playback.speed", self.playback.speed),
            ("playback.fast_forward_speed", self.playback.fast_forward_speed),
        ];
        for (name, value) in speeds {
            if !PlaybackSpeed::Multiplier(value).is_valid() {
                anyhow::bail!(
                    "{} must be between {} and {}, got {}",
                    name,
                    MIN_SPEED,
                    MAX_SPEED,
                    value
                );
            }
        }
        let interval = self.app.stats_interval_secs;
        if !(interval > 0.0 && interval <= MAX_STATS_INTERVAL_SECS) {
            anyhow::bail!(
                "app.stats_interval_secs must be in (0, {}], got {}",
                MAX_STATS_INTERVAL_SECS,
                interval
            );
        }
        Ok(())
    }
}
