//! core::format
//!
//! Document formats and the codec seam.
//!
//! # Design
//!
//! The store never looks inside a document. It only needs two functions per
//! document type: "value → bytes" and "bytes → value". The [`Codec`] trait is
//! that seam. [`SerdeCodec`] implements it for every serde type in the
//! built-in text formats; callers with other wire formats inject their own
//! codec at open time.
//!
//! # Format Selection
//!
//! | Extension | Format |
//! |-----------|--------|
//! | `.json` | [`Format::PrettyJson`] |
//! | `.toml` | [`Format::Toml`] |
//! | `.bson`, `.pb` | unsupported (binary codecs are not built in) |
//! | anything else | the configured default |
//!
//! Compact JSON is never inferred; it must be requested explicitly.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from encoding, decoding, or format selection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The requested format has no codec.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The value could not be serialized.
    #[error("{format} encode error: {message}")]
    Encode { format: String, message: String },

    /// The stored bytes could not be parsed.
    #[error("{format} decode error: {message}")]
    Decode { format: String, message: String },
}

/// Persisted representation of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// Indented JSON.
    #[default]
    #[serde(alias = "json")]
    PrettyJson,
    /// JSON without whitespace.
    CompactJson,
    /// TOML. The document must serialize to a table.
    Toml,
    /// Pick a format from the file extension.
    Automatic,
}

impl Format {
    /// Stable name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Format::PrettyJson => "json",
            Format::CompactJson => "compact-json",
            Format::Toml => "toml",
            Format::Automatic => "automatic",
        }
    }

    /// File extension for documents in this format.
    ///
    /// `None` for [`Format::Automatic`].
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Format::PrettyJson | Format::CompactJson => Some("json"),
            Format::Toml => Some("toml"),
            Format::Automatic => None,
        }
    }

    /// Infer the format from a path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedFormat`] for known binary extensions.
    pub fn from_extension(path: &Path, fallback: Format) -> Result<Format, CodecError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        match ext.as_deref() {
            Some("json") => Ok(Format::PrettyJson),
            Some("toml") => Ok(Format::Toml),
            Some(binary @ ("bson" | "pb" | "protobuf")) => {
                Err(CodecError::UnsupportedFormat(binary.to_string()))
            }
            _ => Ok(fallback),
        }
    }

    /// Replace [`Format::Automatic`] with a concrete format for `path`.
    pub fn resolve(self, path: &Path, fallback: Format) -> Result<Format, CodecError> {
        match self {
            Format::Automatic => Format::from_extension(path, fallback),
            concrete => Ok(concrete),
        }
    }

    /// Whether this is a concrete, encodable format.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Format::Automatic)
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "pretty-json" | "formatted-json" => Ok(Format::PrettyJson),
            "compact-json" | "compact" => Ok(Format::CompactJson),
            "toml" => Ok(Format::Toml),
            "auto" | "automatic" => Ok(Format::Automatic),
            other => Err(CodecError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Converts a document to bytes and back.
///
/// Implementations must be deterministic: encoding equal values must yield
/// equal bytes, or no-op commit suppression stops working.
pub trait Codec<T>: Send + Sync {
    /// Human-readable codec name for logs and errors.
    fn name(&self) -> &str;

    /// Serialize `value`.
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Parse a previously encoded document.
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Codec for serde types in one of the built-in text formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerdeCodec {
    format: Format,
}

impl SerdeCodec {
    /// Create a codec for a concrete format.
    ///
    /// # Errors
    ///
    /// [`Format::Automatic`] is not a codec and is rejected.
    pub fn new(format: Format) -> Result<Self, CodecError> {
        if !format.is_concrete() {
            return Err(CodecError::UnsupportedFormat(format.name().to_string()));
        }
        Ok(Self { format })
    }

    /// The format this codec writes.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Serialize any serde value.
    pub fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let encoded = match self.format {
            Format::PrettyJson => serde_json::to_vec_pretty(value).map_err(|e| e.to_string()),
            Format::CompactJson => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Format::Toml => toml::to_string_pretty(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            Format::Automatic => {
                return Err(CodecError::UnsupportedFormat(self.format.name().to_string()))
            }
        };

        encoded.map_err(|message| CodecError::Encode {
            format: self.format.name().to_string(),
            message,
        })
    }

    /// Parse any serde value.
    pub fn decode_value<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let decoded = match self.format {
            Format::PrettyJson | Format::CompactJson => {
                serde_json::from_slice(bytes).map_err(|e| e.to_string())
            }
            Format::Toml => std::str::from_utf8(bytes)
                .map_err(|e| e.to_string())
                .and_then(|text| toml::from_str(text).map_err(|e| e.to_string())),
            Format::Automatic => {
                return Err(CodecError::UnsupportedFormat(self.format.name().to_string()))
            }
        };

        decoded.map_err(|message| CodecError::Decode {
            format: self.format.name().to_string(),
            message,
        })
    }
}

impl<T> Codec<T> for SerdeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        self.format.name()
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        self.encode_value(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        self.decode_value(bytes)
    }
}

/// Render a value as indented JSON for display.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string_pretty(value).map_err(|e| CodecError::Encode {
        format: Format::PrettyJson.name().to_string(),
        message: e.to_string(),
    })
}
