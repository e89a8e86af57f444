use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parameters of a fusion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Outlier cutoff in ellipse-norm units (1.0 = on the declared boundary)
    pub ellipse_norm_threshold: f64,
    /// Floor applied to both semi-axes before building precision matrices (km)
    pub min_ellipse_axis: f64,
    /// When false, contributors with an axis below `min_ellipse_axis` are
    /// rejected as outliers before any statistical test
    pub use_modified_ellipses: bool,
    /// Default 1-sigma vertical uncertainty of a contributor (km)
    pub elevation_uncertainty: f64,
    /// Inflate the final ellipse when contributor altitudes disagree more
    /// than the modelled altitude uncertainty
    pub adjust_altitude_spread: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            ellipse_norm_threshold: 1.0,
            min_ellipse_axis: 0.01,
            use_modified_ellipses: true,
            elevation_uncertainty: 0.1,
            adjust_altitude_spread: true,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid parameter value
    #[error("invalid value {value} for {parameter}: {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Configuration file I/O error
    #[error("config file I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FusionConfig {
    /// Check every parameter, returning the first violation
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_norm_threshold(self.ellipse_norm_threshold)?;
        check_min_axis(self.min_ellipse_axis)?;
        check_elevation_uncertainty(self.elevation_uncertainty)?;
        Ok(())
    }
}

fn check_norm_threshold(value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(
            "ellipse_norm_threshold",
            value,
            "threshold must be a positive number of ellipse norms",
        ));
    }
    Ok(())
}

fn check_min_axis(value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(
            "min_ellipse_axis",
            value,
            "axis floor must be positive or precision matrices become singular",
        ));
    }
    Ok(())
}

fn check_elevation_uncertainty(value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(
            "elevation_uncertainty",
            value,
            "elevation uncertainty must be a non-negative distance in km",
        ));
    }
    Ok(())
}

/// Holds the active configuration and tracks where it came from
#[derive(Debug, Default)]
pub struct ConfigurationManager {
    config: FusionConfig,
    config_file_path: Option<String>,
    is_modified: bool,
}

impl ConfigurationManager {
    /// Create a configuration manager with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration manager and load from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Replace the configuration after validating it
    pub fn update_config(&mut self, config: FusionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.is_modified = true;
        Ok(())
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let content = fs::read_to_string(&path)?;
        let config: FusionConfig = serde_json::from_str(&content)?;
        config.validate()?;

        self.config = config;
        self.config_file_path = Some(path.as_ref().to_string_lossy().to_string());
        self.is_modified = false;
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(&path, content)?;

        self.config_file_path = Some(path.as_ref().to_string_lossy().to_string());
        self.is_modified = false;
        Ok(())
    }

    /// Save to the currently loaded file path
    pub fn save(&mut self) -> Result<(), ConfigError> {
        match self.config_file_path.clone() {
            Some(path) => self.save_to_file(path),
            None => Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no file path set for saving configuration",
            ))),
        }
    }

    /// Check if configuration has been modified since last load or save
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    /// Update the outlier threshold, returning the previous value
    pub fn set_ellipse_norm_threshold(&mut self, threshold: f64) -> Result<f64, ConfigError> {
        check_norm_threshold(threshold)?;
        let old_value = self.config.ellipse_norm_threshold;
        self.config.ellipse_norm_threshold = threshold;
        self.is_modified = true;
        Ok(old_value)
    }

    /// Update the axis floor, returning the previous value
    pub fn set_min_ellipse_axis(&mut self, min_axis_km: f64) -> Result<f64, ConfigError> {
        check_min_axis(min_axis_km)?;
        let old_value = self.config.min_ellipse_axis;
        self.config.min_ellipse_axis = min_axis_km;
        self.is_modified = true;
        Ok(old_value)
    }

    /// Update the default elevation uncertainty, returning the previous value
    pub fn set_elevation_uncertainty(&mut self, sigma_km: f64) -> Result<f64, ConfigError> {
        check_elevation_uncertainty(sigma_km)?;
        let old_value = self.config.elevation_uncertainty;
        self.config.elevation_uncertainty = sigma_km;
        self.is_modified = true;
        Ok(old_value)
    }

    pub fn set_use_modified_ellipses(&mut self, enabled: bool) -> bool {
        let old_value = self.config.use_modified_ellipses;
        self.config.use_modified_ellipses = enabled;
        self.is_modified = true;
        old_value
    }

    pub fn set_adjust_altitude_spread(&mut self, enabled: bool) -> bool {
        let old_value = self.config.adjust_altitude_spread;
        self.config.adjust_altitude_spread = enabled;
        self.is_modified = true;
        old_value
    }
}
