//! Saving and loading model state.
//!
//! With the `serde` feature every model type ([`HtmConfig`](crate::algorithms::HtmConfig),
//! [`Connections`](crate::algorithms::Connections), the engines and the
//! homeostatic controller) implements `Serialize` and `Deserialize`, and gets
//! the [`Serializable`] helpers through a blanket implementation.
//!
//! # Supported Formats
//!
//! - **Binary**: compact bincode encoding (default)
//! - **JSON**: human-readable, through serde_json
//!
//! # Example
//!
//! ```rust
//! use neocortex::algorithms::{Connections, HtmConfig};
//! use neocortex::serialization::{Serializable, SerializableFormat};
//!
//! let mem = Connections::new(HtmConfig {
//!     input_dimensions: vec![16],
//!     column_dimensions: vec![16],
//!     cells_per_column: 2,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let bytes = mem.to_bytes(SerializableFormat::Binary).unwrap();
//! let restored = Connections::from_bytes(&bytes, SerializableFormat::Binary).unwrap();
//! assert_eq!(mem, restored);
//! ```

use crate::error::{NeocortexError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Serialization format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializableFormat {
    /// Compact binary encoding.
    #[default]
    Binary,
    /// Human-readable JSON.
    Json,
}

impl std::fmt::Display for SerializableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializableFormat::Binary => write!(f, "BINARY"),
            SerializableFormat::Json => write!(f, "JSON"),
        }
    }
}

impl std::str::FromStr for SerializableFormat {
    type Err = NeocortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BINARY" | "BIN" => Ok(SerializableFormat::Binary),
            "JSON" => Ok(SerializableFormat::Json),
            _ => Err(NeocortexError::Configuration {
                name: "format",
                message: format!("unknown format '{s}', expected BINARY or JSON"),
            }),
        }
    }
}

fn encode_error(format: SerializableFormat, e: impl std::fmt::Display) -> NeocortexError {
    NeocortexError::SerializationError {
        message: format!("{format} encoding failed: {e}"),
    }
}

fn decode_error(format: SerializableFormat, e: impl std::fmt::Display) -> NeocortexError {
    NeocortexError::SerializationError {
        message: format!("{format} decoding failed: {e}"),
    }
}

/// Save/load helpers for serde types.
pub trait Serializable: Serialize + DeserializeOwned + Sized {
    /// Serializes to a byte vector.
    fn to_bytes(&self, format: SerializableFormat) -> Result<Vec<u8>> {
        match format {
            SerializableFormat::Binary => {
                bincode::serialize(self).map_err(|e| encode_error(format, e))
            }
            SerializableFormat::Json => {
                serde_json::to_vec_pretty(self).map_err(|e| encode_error(format, e))
            }
        }
    }

    /// Deserializes from a byte slice.
    fn from_bytes(bytes: &[u8], format: SerializableFormat) -> Result<Self> {
        match format {
            SerializableFormat::Binary => {
                bincode::deserialize(bytes).map_err(|e| decode_error(format, e))
            }
            SerializableFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| decode_error(format, e))
            }
        }
    }

    /// Serializes to a JSON string.
    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| encode_error(SerializableFormat::Json, e))
    }

    /// Deserializes from a JSON string.
    fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| decode_error(SerializableFormat::Json, e))
    }

    /// Serializes to a writer.
    fn save<W: Write>(&self, writer: W, format: SerializableFormat) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        match format {
            SerializableFormat::Binary => {
                bincode::serialize_into(&mut writer, self).map_err(|e| encode_error(format, e))?;
            }
            SerializableFormat::Json => {
                serde_json::to_writer(&mut writer, self).map_err(|e| encode_error(format, e))?;
            }
        }
        writer.flush().map_err(|e| NeocortexError::IoError {
            message: format!("flush failed: {e}"),
        })
    }

    /// Deserializes from a reader.
    fn load<R: Read>(reader: R, format: SerializableFormat) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        match format {
            SerializableFormat::Binary => {
                bincode::deserialize_from(&mut reader).map_err(|e| decode_error(format, e))
            }
            SerializableFormat::Json => {
                serde_json::from_reader(&mut reader).map_err(|e| decode_error(format, e))
            }
        }
    }

    /// Saves to a file.
    fn save_to_file<P: AsRef<Path>>(&self, path: P, format: SerializableFormat) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| NeocortexError::IoError {
            message: format!("cannot create {}: {e}", path.display()),
        })?;
        log::debug!("[SER] saving {} as {}", path.display(), format);
        self.save(file, format)
    }

    /// Loads from a file.
    fn load_from_file<P: AsRef<Path>>(path: P, format: SerializableFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| NeocortexError::IoError {
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        Self::load(file, format)
    }
}

impl<T> Serializable for T where T: Serialize + DeserializeOwned + Sized {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{
        Connections, HomeostaticPlasticityController, HtmConfig, SpatialPooler, TemporalMemory,
    };

    fn trained() -> (Connections, SpatialPooler, TemporalMemory) {
        let mut mem = Connections::new(HtmConfig {
            input_dimensions: vec![40],
            column_dimensions: vec![64],
            potential_radius: -1,
            global_inhibition: true,
            num_active_columns_per_inh_area: 4.0,
            cells_per_column: 4,
            activation_threshold: 2,
            min_threshold: 1,
            ..Default::default()
        })
        .unwrap();
        let mut sp = SpatialPooler::new(&mut mem)
            .unwrap()
            .with_homeostatic_controller(HomeostaticPlasticityController::default());
        let mut tm = TemporalMemory::new(&mem);

        for step in 0..6 {
            let mut input = vec![0u8; 40];
            input[step * 5..step * 5 + 10].fill(1);
            let columns = sp.compute(&mut mem, &input, true).unwrap();
            tm.compute(&mut mem, &columns, true).unwrap();
        }
        (mem, sp, tm)
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(
            "bin".parse::<SerializableFormat>().unwrap(),
            SerializableFormat::Binary
        );
        assert_eq!(
            "Json".parse::<SerializableFormat>().unwrap(),
            SerializableFormat::Json
        );
        assert!(matches!(
            "yaml".parse::<SerializableFormat>(),
            Err(NeocortexError::Configuration { name: "format", .. })
        ));
        assert_eq!(SerializableFormat::default().to_string(), "BINARY");
    }

    #[test]
    fn test_restored_model_continues_identically() {
        let (mut mem, mut sp, mut tm) = trained();

        let mem_bytes = mem.to_bytes(SerializableFormat::Binary).unwrap();
        let sp_json = sp.to_json().unwrap();
        let tm_bytes = tm.to_bytes(SerializableFormat::Binary).unwrap();

        let mut mem2 = Connections::from_bytes(&mem_bytes, SerializableFormat::Binary).unwrap();
        let mut sp2 = SpatialPooler::from_json(&sp_json).unwrap();
        let mut tm2 = TemporalMemory::from_bytes(&tm_bytes, SerializableFormat::Binary).unwrap();
        assert_eq!(mem, mem2);
        assert_eq!(
            sp.homeostatic_controller().map(HomeostaticPlasticityController::cycle),
            sp2.homeostatic_controller().map(HomeostaticPlasticityController::cycle)
        );

        let mut input = vec![0u8; 40];
        input[12..24].fill(1);
        let a = sp.compute(&mut mem, &input, true).unwrap();
        let b = sp2.compute(&mut mem2, &input, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            tm.compute(&mut mem, &a, true).unwrap(),
            tm2.compute(&mut mem2, &b, true).unwrap()
        );
        assert_eq!(mem, mem2);
    }

    #[test]
    fn test_json_round_trip_of_connections() {
        let (mem, _, _) = trained();
        let json = mem.to_json().unwrap();
        let restored = Connections::from_json(&json).unwrap();
        assert_eq!(mem, restored);
        assert_eq!(mem.statistics(), restored.statistics());
    }

    #[test]
    fn test_json_keeps_every_float_bit() {
        let config = HtmConfig {
            syn_perm_active_inc: 0.1 + 0.2,
            syn_perm_inactive_dec: 1.0 / 3.0,
            max_boost: 9.999_999_999_999_998,
            ..Default::default()
        };
        let restored = HtmConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(
            restored.syn_perm_active_inc.to_bits(),
            config.syn_perm_active_inc.to_bits()
        );
        assert_eq!(
            restored.syn_perm_inactive_dec.to_bits(),
            config.syn_perm_inactive_dec.to_bits()
        );
        assert_eq!(config, restored);
    }

    #[test]
    fn test_file_round_trip() {
        let config = HtmConfig {
            column_dimensions: vec![128],
            global_inhibition: true,
            ..Default::default()
        };
        let path = std::env::temp_dir().join(format!("neocortex-config-{}.json", std::process::id()));
        config.save_to_file(&path, SerializableFormat::Json).unwrap();
        let loaded = HtmConfig::load_from_file(&path, SerializableFormat::Json).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config, loaded);

        assert!(matches!(
            HtmConfig::load_from_file(&path, SerializableFormat::Json),
            Err(NeocortexError::IoError { .. })
        ));
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        assert!(matches!(
            Connections::from_bytes(&[1, 2, 3], SerializableFormat::Binary),
            Err(NeocortexError::SerializationError { .. })
        ));
    }
}
