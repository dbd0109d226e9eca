//! Value serialization for the `v` column.

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KVError, KVResult};

/// Serialization mode of a store, fixed when the store is opened.
///
/// `Json` stores compact JSON text. `Binary` stores MessagePack wrapped in
/// standard base64 so the column stays TEXT; it round-trips richer Rust
/// types than JSON does, but must not be used on data from untrusted
/// sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    #[serde(alias = "msgpack")]
    Binary,
}

impl Codec {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Binary => "binary",
        }
    }

    /// Encode a value into its stored text form.
    pub fn encode<V: Serialize + ?Sized>(&self, value: &V) -> KVResult<String> {
        match self {
            Codec::Json => {
                serde_json::to_string(value).map_err(|e| KVError::Serialization(e.to_string()))
            }
            Codec::Binary => {
                let data = rmp_serde::to_vec_named(value)
                    .map_err(|e| KVError::Serialization(e.to_string()))?;
                Ok(BASE64.encode(data))
            }
        }
    }

    /// Decode a stored text payload.
    pub fn decode<V: DeserializeOwned>(&self, text: &str) -> KVResult<V> {
        match self {
            Codec::Json => {
                serde_json::from_str(text).map_err(|e| KVError::Serialization(e.to_string()))
            }
            Codec::Binary => {
                let data = BASE64
                    .decode(text)
                    .map_err(|e| KVError::Serialization(format!("base64: {e}")))?;
                rmp_serde::from_slice(&data).map_err(|e| KVError::Serialization(e.to_string()))
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = KVError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "binary" | "msgpack" => Ok(Codec::Binary),
            other => Err(KVError::Config(format!("unknown codec: {other}"))),
        }
    }
}
