//! Compiler settings, loadable from TOML.
//!
//! ```toml
//! bit_depth = 32
//! sample_rate = 48000.0
//! variable_prefix = "n"
//! log_filter = "patchwerk=debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Width of the floats used by generated code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    Float32,
    #[default]
    Float64,
}

impl BitDepth {
    /// Name of the matching typed array in the target
    pub fn float_array(self) -> &'static str {
        match self {
            BitDepth::Float32 => "Float32Array",
            BitDepth::Float64 => "Float64Array",
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = String;

    fn try_from(bits: u8) -> core::result::Result<Self, Self::Error> {
        match bits {
            32 => Ok(BitDepth::Float32),
            64 => Ok(BitDepth::Float64),
            other => Err(format!("unsupported bit depth {}, expected 32 or 64", other)),
        }
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> u8 {
        match depth {
            BitDepth::Float32 => 32,
            BitDepth::Float64 => 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bit_depth: BitDepth,
    /// Sample rate used by the reference runtime, in Hz
    pub sample_rate: f64,
    /// Prefix of every mangled per-node name, e.g. `n_osc_index`
    pub variable_prefix: String,
    /// Default `tracing` filter, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bit_depth: BitDepth::default(),
            sample_rate: 44100.0,
            variable_prefix: "n".into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| CompileError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| CompileError::Config(e.to_string()))
    }

    pub fn with_bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(CompileError::Config(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        let prefix_ok = self
            .variable_prefix
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && self
                .variable_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !prefix_ok {
            return Err(CompileError::Config(format!(
                "variable_prefix `{}` is not a valid identifier",
                self.variable_prefix
            )));
        }
        Ok(())
    }
}
