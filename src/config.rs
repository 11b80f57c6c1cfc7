use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enhance::{Enhancement, MIN_CONTRAST};
use crate::ingest::SourceConfig;

const DEFAULT_ROSTER_PATH: &str = "students.csv";
const DEFAULT_LOG_PATH: &str = "attendance_log.csv";
/// First camera device when V4L2 capture is built in, otherwise the
/// synthetic pattern so a default build still starts.
#[cfg(feature = "ingest-v4l2")]
pub const DEFAULT_SOURCE: &str = "0";
#[cfg(not(feature = "ingest-v4l2"))]
pub const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_COOLDOWN_SECS: f64 = 3.0;
const DEFAULT_QR_MAX_DIMENSION: u32 = 1280;

#[derive(Debug, Deserialize, Default)]
struct ScannerConfigFile {
    roster_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    cooldown_secs: Option<f64>,
    snapshot_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
    max_frames: Option<u64>,
    source: Option<SourceConfigFile>,
    enhance: Option<EnhanceConfigFile>,
    decoder: Option<DecoderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EnhanceConfigFile {
    contrast: Option<f32>,
    brightness: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DecoderConfigFile {
    max_dimension: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub roster_path: PathBuf,
    pub log_path: PathBuf,
    pub source: SourceConfig,
    pub cooldown: Duration,
    pub enhancement: Enhancement,
    /// Annotated frames with a non-suppressed event are written here.
    pub snapshot_dir: Option<PathBuf>,
    /// Font for label text and the banner; outlines are drawn without one.
    pub font_path: Option<PathBuf>,
    /// Longest side the QR backend works at (0 = full resolution).
    pub qr_max_dimension: u32,
    /// Stop after this many frames (None = until quit or end of source).
    pub max_frames: Option<u64>,
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub roster_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub source: Option<String>,
    pub cooldown_secs: Option<f64>,
    pub snapshot_dir: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub max_frames: Option<u64>,
}

impl ScannerConfig {
    pub fn load() -> Result<Self> {
        Self::load_with(&ConfigOverrides::default())
    }

    pub fn load_with(overrides: &ConfigOverrides) -> Result<Self> {
        let config_path = std::env::var("ATTENDANCE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScannerConfigFile) -> Result<Self> {
        let source = SourceConfig {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_HEIGHT),
        };
        let defaults = Enhancement::default();
        let enhancement = Enhancement {
            contrast: file
                .enhance
                .as_ref()
                .and_then(|enhance| enhance.contrast)
                .unwrap_or(defaults.contrast),
            brightness: file
                .enhance
                .as_ref()
                .and_then(|enhance| enhance.brightness)
                .unwrap_or(defaults.brightness),
        };
        Ok(Self {
            roster_path: file
                .roster_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROSTER_PATH)),
            log_path: file
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            source,
            cooldown: cooldown_from_secs(file.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS))?,
            enhancement,
            snapshot_dir: file.snapshot_dir,
            font_path: file.font_path,
            qr_max_dimension: file
                .decoder
                .and_then(|decoder| decoder.max_dimension)
                .unwrap_or(DEFAULT_QR_MAX_DIMENSION),
            max_frames: file.max_frames,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("ATTENDANCE_ROSTER") {
            if !path.trim().is_empty() {
                self.roster_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("ATTENDANCE_LOG") {
            if !path.trim().is_empty() {
                self.log_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var("ATTENDANCE_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(dir) = std::env::var("ATTENDANCE_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(cooldown) = std::env::var("ATTENDANCE_COOLDOWN_SECS") {
            let seconds: f64 = cooldown.trim().parse().map_err(|_| {
                anyhow!("ATTENDANCE_COOLDOWN_SECS must be a number of seconds")
            })?;
            self.cooldown = cooldown_from_secs(seconds)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(path) = &overrides.roster_path {
            self.roster_path = path.clone();
        }
        if let Some(path) = &overrides.log_path {
            self.log_path = path.clone();
        }
        if let Some(url) = &overrides.source {
            self.source.url = url.clone();
        }
        if let Some(seconds) = overrides.cooldown_secs {
            self.cooldown = cooldown_from_secs(seconds)?;
        }
        if let Some(dir) = &overrides.snapshot_dir {
            self.snapshot_dir = Some(dir.clone());
        }
        if let Some(path) = &overrides.font_path {
            self.font_path = Some(path.clone());
        }
        if overrides.max_frames.is_some() {
            self.max_frames = overrides.max_frames;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.roster_path.as_os_str().is_empty() {
            return Err(anyhow!("roster path must not be empty"));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log path must not be empty"));
        }
        self.source.url = self.source.url.trim().to_string();
        crate::ingest::SourceKind::classify(&self.source.url)?;
        if self.cooldown.is_zero() {
            return Err(anyhow!("cooldown must be greater than zero"));
        }
        if !self.enhancement.contrast.is_finite() || self.enhancement.contrast < MIN_CONTRAST {
            return Err(anyhow!(
                "contrast must be at least {} (got {})",
                MIN_CONTRAST,
                self.enhancement.contrast
            ));
        }
        if !self.enhancement.brightness.is_finite() {
            return Err(anyhow!("brightness must be a finite number"));
        }
        Ok(())
    }
}

fn cooldown_from_secs(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(anyhow!("cooldown must be a non-negative number of seconds"));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| anyhow!("cooldown of {} seconds is out of range: {}", seconds, e))
}

fn read_config_file(path: &Path) -> Result<ScannerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let mut cfg = ScannerConfig::from_file(ScannerConfigFile::default())?;
        cfg.validate()?;
        assert_eq!(cfg.roster_path, PathBuf::from("students.csv"));
        assert_eq!(cfg.log_path, PathBuf::from("attendance_log.csv"));
        assert_eq!(cfg.source.url, DEFAULT_SOURCE);
        assert_eq!(cfg.cooldown, Duration::from_secs(3));
        assert_eq!(cfg.enhancement, Enhancement::default());
        assert!(cfg.snapshot_dir.is_none());
        assert!(cfg.max_frames.is_none());
        Ok(())
    }

    #[test]
    fn overrides_win_and_are_validated() -> Result<()> {
        let mut cfg = ScannerConfig::from_file(ScannerConfigFile::default())?;
        cfg.apply_overrides(&ConfigOverrides {
            source: Some(" stub://desk ".to_string()),
            cooldown_secs: Some(1.5),
            max_frames: Some(10),
            ..ConfigOverrides::default()
        })?;
        cfg.validate()?;
        assert_eq!(cfg.source.url, "stub://desk");
        assert_eq!(cfg.cooldown, Duration::from_millis(1500));
        assert_eq!(cfg.max_frames, Some(10));

        cfg.apply_overrides(&ConfigOverrides {
            cooldown_secs: Some(0.0),
            ..ConfigOverrides::default()
        })?;
        assert!(cfg.validate().is_err());
        assert!(cooldown_from_secs(-1.0).is_err());
        assert!(cooldown_from_secs(1e300).is_err());
        assert!(cfg
            .apply_overrides(&ConfigOverrides {
                cooldown_secs: Some(1e20),
                ..ConfigOverrides::default()
            })
            .is_err());
        Ok(())
    }

    #[test]
    fn default_source_opens_in_this_build() -> Result<()> {
        let cfg = ScannerConfig::from_file(ScannerConfigFile::default())?;
        crate::ingest::CameraSource::new(cfg.source)?;
        Ok(())
    }

    #[test]
    fn low_contrast_is_rejected() -> Result<()> {
        let mut cfg = ScannerConfig::from_file(ScannerConfigFile {
            enhance: Some(EnhanceConfigFile {
                contrast: Some(0.2),
                brightness: None,
            }),
            ..ScannerConfigFile::default()
        })?;
        assert!(cfg.validate().is_err());
        Ok(())
    }
}
