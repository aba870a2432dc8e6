//! Content-addressed cache for generator outputs.
//!
//! Two tiers: an in-memory map that is always present, and an optional disk
//! tier under a configured base directory. Entries are TTL-expired first,
//! then LRU-evicted by last access until both the entry-count and aggregate
//! size limits hold. Disk failures are never fatal; the cache degrades to
//! memory-only with a warning.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const COMPRESSED_SENTINEL: &str = "COMPRESSED:";

/// A typed input to [`cache_key`]. The tag keeps `Str("1")` and `Int(1)`
/// distinct, and the per-part delimiter keeps `("ab", "c")` distinct from
/// `("a", "bc")`.
#[derive(Debug, Clone, Copy)]
pub enum CacheKeyPart<'a> {
    Str(&'a str),
    Int(i64),
    Bool(bool),
    /// Hashed as canonical JSON (object keys sorted recursively), so the
    /// digest is invariant to property insertion order.
    Json(&'a Value),
}

/// Derives the 16-hex entry key from a prefix and typed inputs.
pub fn cache_key(prefix: &str, parts: &[CacheKeyPart<'_>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update([0x1e]);
    for part in parts {
        match part {
            CacheKeyPart::Str(s) => {
                hasher.update(b"s:");
                hasher.update(s.as_bytes());
            }
            CacheKeyPart::Int(i) => {
                hasher.update(b"i:");
                hasher.update(i.to_le_bytes());
            }
            CacheKeyPart::Bool(b) => {
                hasher.update(b"b:");
                hasher.update([u8::from(*b)]);
            }
            CacheKeyPart::Json(value) => {
                hasher.update(b"j:");
                hasher.update(canonical_json(value).as_bytes());
            }
        }
        hasher.update([0x1e]);
    }
    let digest = hasher.finalize();
    hex_of(&digest)[..16].to_string()
}

fn hex_of(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = std::fmt::Write::write_fmt(&mut out, format_args!("{byte:02x}"));
    }
    out
}

/// Canonical JSON text: object keys sorted recursively, arrays in order.
pub fn canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut sorted = serde_json::Map::new();
                for key in keys {
                    sorted.insert(key.clone(), canonicalize(&map[key]));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    canonicalize(value).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub size: u64,
    pub hit_count: u64,
    pub last_accessed: u64,
    pub compute_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: String,
    /// Milliseconds since the epoch at insertion.
    pub timestamp: u64,
    pub version: String,
    pub dependencies: Vec<String>,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_size_bytes: u64,
    pub max_age: Duration,
    /// Disk tier base directory; `None` disables the disk tier.
    pub directory: Option<PathBuf>,
    pub compress: bool,
    /// Version stamped into new entries (generator version by default).
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_size_bytes: 100 * 1024 * 1024,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            directory: None,
            compress: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl CacheConfig {
    /// Enables the disk tier under the conventional `.tywrap-cache`
    /// directory below `base`.
    pub fn with_default_directory(mut self, base: impl AsRef<Path>) -> Self {
        self.directory = Some(base.as_ref().join(".tywrap-cache"));
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub dependencies: Vec<String>,
    pub compute_time_ms: u64,
    /// Overrides the config-level version stamp.
    pub version: Option<String>,
}

/// Content-addressed generation cache.
pub struct ContentCache {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry>,
    prefix: String,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

impl ContentCache {
    /// Creates a cache. When a directory is configured, existing fresh
    /// entries are loaded; stale or unreadable files are deleted
    /// best-effort.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_prefix(config, "tywrap")
    }

    /// A cache whose disk filenames carry the given prefix. Filenames are
    /// always `{prefix}_{32-hex}.cache`; user-controlled names never reach
    /// the filesystem.
    pub fn with_prefix(config: CacheConfig, prefix: impl Into<String>) -> Self {
        let mut cache = Self {
            config,
            entries: HashMap::new(),
            prefix: prefix.into(),
            hits: 0,
            misses: 0,
            evictions: 0,
            expired: 0,
        };
        cache.load_disk_entries();
        cache
    }

    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let now = now_millis();
        if let Some(entry) = self.entries.get(key) {
            if self.is_expired(entry, now) {
                self.expired += 1;
                self.misses += 1;
                let entry = self.entries.remove(key);
                if let Some(entry) = entry {
                    self.remove_disk_entry(&entry.key);
                }
                return None;
            }
        } else {
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        let entry = self.entries.get_mut(key)?;
        entry.metadata.hit_count += 1;
        entry.metadata.last_accessed = now;
        Some(entry.clone())
    }

    pub fn set(&mut self, key: &str, data: String, options: SetOptions) {
        let now = now_millis();
        let size = data.len() as u64;
        let entry = CacheEntry {
            key: key.to_string(),
            data,
            timestamp: now,
            version: options
                .version
                .unwrap_or_else(|| self.config.version.clone()),
            dependencies: options.dependencies,
            metadata: EntryMetadata {
                size,
                hit_count: 0,
                last_accessed: now,
                compute_time_ms: options.compute_time_ms,
            },
        };
        self.write_disk_entry(&entry);
        self.entries.insert(key.to_string(), entry);
        self.enforce_limits();
    }

    /// Removes every entry whose dependency set contains `dependency`, in
    /// both tiers. Returns the number removed.
    pub fn invalidate_by_dependency(&mut self, dependency: &str) -> usize {
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.dependencies.iter().any(|d| d == dependency))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &doomed {
            self.entries.remove(key);
            self.remove_disk_entry(key);
        }
        if !doomed.is_empty() {
            debug!(dependency, count = doomed.len(), "invalidated cache entries");
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            self.remove_disk_entry(&key);
        }
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_size_bytes: self.total_size(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expired: self.expired,
        }
    }

    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.metadata.size).sum()
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.timestamp) >= self.config.max_age.as_millis() as u64
    }

    /// TTL expiry first, then LRU by last access until both limits hold.
    fn enforce_limits(&mut self) {
        let now = now_millis();
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|entry| self.is_expired(entry, now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in stale {
            self.entries.remove(&key);
            self.remove_disk_entry(&key);
            self.expired += 1;
        }

        while self.entries.len() > self.config.max_entries
            || self.total_size() > self.config.max_size_bytes
        {
            let Some(oldest) = self
                .entries
                .values()
                .min_by_key(|entry| entry.metadata.last_accessed)
                .map(|entry| entry.key.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            self.remove_disk_entry(&oldest);
            self.evictions += 1;
        }
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        let directory = self.config.directory.as_ref()?;
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hex_of(&hasher.finalize());
        Some(directory.join(format!("{}_{}.cache", self.prefix, &digest[..32])))
    }

    fn write_disk_entry(&self, entry: &CacheEntry) {
        let Some(path) = self.entry_path(&entry.key) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(error = %err, "cache directory creation failed; memory-only");
                return;
            }
        }
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "cache entry serialization failed");
                return;
            }
        };
        let body = if self.config.compress {
            match compress_if_worthwhile(&raw) {
                Some(compressed) => compressed,
                None => raw,
            }
        } else {
            raw
        };
        if let Err(err) = std::fs::write(&path, body) {
            warn!(error = %err, path = %path.display(), "cache write failed");
        }
    }

    fn remove_disk_entry(&self, key: &str) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %err, path = %path.display(), "cache file removal failed");
            }
        }
    }

    fn load_disk_entries(&mut self) {
        let Some(directory) = self.config.directory.clone() else {
            return;
        };
        let listing = match std::fs::read_dir(&directory) {
            Ok(listing) => listing,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %err, "cache directory scan failed; memory-only");
                }
                return;
            }
        };
        let now = now_millis();
        let mut admitted = 0usize;
        for item in listing.flatten() {
            let path = item.path();
            let name = item.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&self.prefix) || !name.ends_with(".cache") {
                continue;
            }
            match read_entry_file(&path) {
                Ok(entry) if !self.is_expired(&entry, now) => {
                    self.entries.insert(entry.key.clone(), entry);
                    admitted += 1;
                }
                Ok(_) | Err(_) => {
                    // Stale or unreadable: drop the file, keep going.
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
        if admitted > 0 {
            debug!(admitted, directory = %directory.display(), "cache warm start");
        }
    }
}

fn compress_if_worthwhile(raw: &str) -> Option<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw.as_bytes()).ok()?;
    let compressed = encoder.finish().ok()?;
    let encoded = BASE64.encode(&compressed);
    // Only keep the compressed form when it actually pays for itself.
    if encoded.len() + COMPRESSED_SENTINEL.len() <= raw.len() * 8 / 10 {
        Some(format!("{COMPRESSED_SENTINEL}{encoded}"))
    } else {
        None
    }
}

fn read_entry_file(path: &Path) -> anyhow::Result<CacheEntry> {
    let body = std::fs::read_to_string(path)?;
    let raw = if let Some(encoded) = body.strip_prefix(COMPRESSED_SENTINEL) {
        let compressed = BASE64.decode(encoded.trim())?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut raw = String::new();
        decoder.read_to_string(&mut raw)?;
        raw
    } else {
        body
    };
    Ok(serde_json::from_str(&raw)?)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
