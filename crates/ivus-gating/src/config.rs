use ivus_signals::{BandPass, CropRegion, ExtremaConfig, SignalError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Gating parameters. Two configs comparing equal produce the same signals
/// for the same frames, which is what the signal cache relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// Z-score segment length in frames, 0 = whole range
    pub normalize_step: usize,
    /// Default extremum method for the image-based signal
    pub maxima_only: bool,
    /// Band-pass lower edge (Hz)
    pub lowcut: f64,
    /// Band-pass upper edge (Hz)
    pub highcut: f64,
    /// Butterworth order
    pub order: usize,
    /// Percentile a peak must reach (0-100)
    pub height_percentile: f64,
    /// Minimum frames between two peaks
    pub min_spacing: usize,
    /// Central image region used for image-based features
    pub crop: CropRegion,
    /// Weight multiplier for a perfectly regular source
    pub zero_variability_cap: f64,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            normalize_step: 0,
            maxima_only: true,
            lowcut: 0.45, // 27 bpm
            highcut: 1.8, // 108 bpm
            order: 4,
            height_percentile: 50.0,
            min_spacing: 10,
            crop: CropRegion::default(),
            zero_variability_cap: ivus_signals::fusion::DEFAULT_ZERO_VARIABILITY_CAP,
        }
    }
}

impl GatingConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: GatingConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    /// Environment variables are prefixed with IVUS_GATING_
    /// Example: IVUS_GATING_LOWCUT=0.5
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults, then the file if it exists, then the environment.
    pub fn load_layered(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            _ => GatingConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        fn read<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
            match std::env::var(name) {
                Ok(val) => val
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Validation(format!("Invalid {}", name))),
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = read("IVUS_GATING_NORMALIZE_STEP")? {
            self.normalize_step = v;
        }
        if let Some(v) = read("IVUS_GATING_MAXIMA_ONLY")? {
            self.maxima_only = v;
        }
        if let Some(v) = read("IVUS_GATING_LOWCUT")? {
            self.lowcut = v;
        }
        if let Some(v) = read("IVUS_GATING_HIGHCUT")? {
            self.highcut = v;
        }
        if let Some(v) = read("IVUS_GATING_ORDER")? {
            self.order = v;
        }
        if let Some(v) = read("IVUS_GATING_HEIGHT_PERCENTILE")? {
            self.height_percentile = v;
        }
        if let Some(v) = read("IVUS_GATING_MIN_SPACING")? {
            self.min_spacing = v;
        }
        if let Some(v) = read("IVUS_GATING_ZERO_VARIABILITY_CAP")? {
            self.zero_variability_cap = v;
        }
        if let Some(v) = read("IVUS_GATING_CROP_ROW_START")? {
            self.crop.row_start = v;
        }
        if let Some(v) = read("IVUS_GATING_CROP_ROW_END")? {
            self.crop.row_end = v;
        }
        if let Some(v) = read("IVUS_GATING_CROP_COL_START")? {
            self.crop.col_start = v;
        }
        if let Some(v) = read("IVUS_GATING_CROP_COL_END")? {
            self.crop.col_end = v;
        }
        Ok(())
    }

    /// Validate configuration values
    ///
    /// Checks against the Nyquist frequency happen when the filter is
    /// designed, since the frame rate belongs to the pullback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lowcut > 0.0) || !self.highcut.is_finite() {
            return Err(ConfigError::Validation(
                "lowcut must be positive and highcut finite".to_string(),
            ));
        }
        if self.lowcut >= self.highcut {
            return Err(ConfigError::Validation(
                "lowcut must be below highcut".to_string(),
            ));
        }
        if self.order == 0 {
            return Err(ConfigError::Validation("order must be >= 1".to_string()));
        }
        if !(0.0..=100.0).contains(&self.height_percentile) {
            return Err(ConfigError::Validation(
                "height_percentile must be in [0, 100]".to_string(),
            ));
        }
        if self.min_spacing == 0 {
            return Err(ConfigError::Validation(
                "min_spacing must be >= 1".to_string(),
            ));
        }
        if self.crop.is_empty() {
            return Err(ConfigError::Validation("crop region is empty".to_string()));
        }
        if !(self.zero_variability_cap >= 1.0) {
            return Err(ConfigError::Validation(
                "zero_variability_cap must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn extrema(&self) -> ExtremaConfig {
        ExtremaConfig {
            min_spacing: self.min_spacing,
            height_percentile: self.height_percentile,
        }
    }

    /// Band-pass for a pullback recorded at `frame_rate` Hz.
    pub fn band_pass(&self, frame_rate: f64) -> Result<BandPass, SignalError> {
        BandPass::design(self.lowcut, self.highcut, self.order, frame_rate)
    }
}
