//! # Series Store
//!
//! The on-disk history of memory samples, keyed by server id.
//!
//! Each server keeps two parallel arrays: `value` (MiB used, or `null` for a
//! failed sample) and `time` (the server's uptime when the sample was taken).
//! The whole file is read before and rewritten after every sample.

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use std::convert::TryFrom;
use std::path::{Path, PathBuf};

use indexmap::IndexMap; // hash table w/ fast iter preserving insertion order

use crate::error::StoreError;

const MILLIS_PER_SECOND: u64 = 1000;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// The label recorded for a sample whose uptime couldn't be read.
pub const UNKNOWN_UPTIME: &str = "unknown";

/// Formats an uptime in milliseconds as `"{hours}h {minutes}m"`.
///
/// Hours are not rolled over into days.
pub fn format_uptime(uptime_ms: u64) -> String {
    let secs = uptime_ms / MILLIS_PER_SECOND;
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    format!("{}h {}m", hours, minutes)
}

pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

/// The sample history of a single server.
///
/// `values` and `labels` always have the same length; an entry at index `i`
/// in one belongs to the entry at index `i` in the other.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesColumns")]
pub struct ServerSeries {
    #[serde(rename = "value", serialize_with = "serialize_values")]
    values: Vec<Option<f64>>,
    #[serde(rename = "time")]
    labels: Vec<String>,
}

/// The unchecked on-disk shape of a `ServerSeries`
#[derive(Deserialize)]
struct SeriesColumns {
    value: Vec<Option<f64>>,
    time: Vec<String>,
}

impl TryFrom<SeriesColumns> for ServerSeries {
    type Error = String;

    fn try_from(columns: SeriesColumns) -> Result<Self, Self::Error> {
        if columns.value.len() != columns.time.len() {
            return Err(format!(
                "series has {} values but {} times",
                columns.value.len(),
                columns.time.len()
            ));
        }
        Ok(ServerSeries {
            values: columns.value,
            labels: columns.time,
        })
    }
}

impl ServerSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn last_label(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    /// Append one sample; `None` records a gap.
    pub fn push(&mut self, value: Option<f64>, label: String) {
        self.values.push(value);
        self.labels.push(label);
    }

    /// Drop the oldest samples until at most `max_len` remain.
    pub fn retain_last(&mut self, max_len: usize) {
        if self.values.len() > max_len {
            let excess = self.values.len() - max_len;
            self.values.drain(..excess);
            self.labels.drain(..excess);
        }
    }
}

/// Whole numbers are written without a fractional part (`200`, not `200.0`).
fn serialize_values<S>(values: &[Option<f64>], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    // Largest magnitude at which every integer is exactly representable in an f64
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        match *value {
            Some(v) if v.fract() == 0.0 && v.abs() <= MAX_EXACT => {
                seq.serialize_element(&(v as i64))?
            }
            Some(v) => seq.serialize_element(&v)?,
            None => seq.serialize_element(&Option::<f64>::None)?,
        }
    }
    seq.end()
}

/// A map of server ids to their sample history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesStore {
    servers: IndexMap<String, ServerSeries>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn get(&self, server_id: &str) -> Option<&ServerSeries> {
        self.servers.get(server_id)
    }

    /// Get the series for `server_id`, creating an empty one if it doesn't exist yet.
    pub fn series_mut(&mut self, server_id: &str) -> &mut ServerSeries {
        self.servers.entry(server_id.to_owned()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServerSeries)> {
        self.servers.iter().map(|(id, series)| (id.as_str(), series))
    }

    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    /// Serialize the store, pretty-printed with a 4-space indent.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }
}

/// The location of a persisted `SeriesStore`.
#[derive(Clone, Debug)]
pub struct SeriesFile {
    path: PathBuf,
}

impl SeriesFile {
    /// Opens an existing series file.
    ///
    /// The file is never created; it must exist (e.g. containing `{}`) before the first sample.
    pub async fn open(path: impl Into<PathBuf>) -> Result<SeriesFile, StoreError> {
        let path = path.into();
        match async_std::fs::metadata(async_path(&path)).await {
            Ok(meta) if meta.is_file() => Ok(SeriesFile { path }),
            Ok(_) => Err(StoreError::Missing(path.display().to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::Missing(path.display().to_string()))
            }
            Err(source) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SeriesStore, StoreError> {
        let input = async_std::fs::read_to_string(async_path(&self.path))
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        SeriesStore::from_json(&input).map_err(|source| StoreError::Malformed {
            path: self.path.display().to_string(),
            source,
        })
    }

    pub async fn save(&self, store: &SeriesStore) -> Result<(), StoreError> {
        let bytes = store.to_json().map_err(|source| StoreError::Malformed {
            path: self.path.display().to_string(),
            source,
        })?;
        replace_file(&self.path, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// Write `bytes` to a sibling temporary file, then rename it over `path`.
///
/// Readers of `path` see either the previous contents or the new contents, never a partial write.
pub async fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = async_path(&path.with_file_name(format!(".{}.tmp", file_name)));
    async_std::fs::write(&tmp_path, bytes).await?;
    async_std::fs::rename(&tmp_path, async_path(path)).await
}

fn async_path(path: &Path) -> async_std::path::PathBuf {
    async_std::path::PathBuf::from(path.to_path_buf())
}
