//! Status cache shared between the poller and readers.
//!
//! Each record is replaced as a whole under its shard lock, so a reader
//! always sees a status together with the revision it was written with.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{Serialize, Serializer};

use super::target::{Target, TargetKind};
use super::RegistryError;

/// Last known status of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not polled yet, session down, or the manager reported an error.
    #[default]
    Unknown,
    /// Connection target: link is up.
    Connected,
    /// Connection target: link is down.
    Disconnected,
    /// Extension status string or mailbox count, as reported.
    Value(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Unknown => "unknown",
            Status::Connected => "connected",
            Status::Disconnected => "disconnected",
            Status::Value(value) => value.as_str(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Status::Unknown)
    }

    /// Status from an optional header value; absent means unknown.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) => Status::Value(v.to_string()),
            None => Status::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Cached status of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub status: Status,
    /// Bumped by one on every write, starting from 0.
    pub revision: u64,
    /// Wall-clock time of the last write; `None` before the first.
    pub updated_at: Option<SystemTime>,
}

impl StatusRecord {
    fn initial() -> Self {
        Self {
            status: Status::Unknown,
            revision: 0,
            updated_at: None,
        }
    }
}

/// Per-target status storage.
#[derive(Debug, Default)]
pub struct StatusCache {
    records: DashMap<Target, StatusRecord>,
}

impl StatusCache {
    /// Creates a cache with an unknown record for every target.
    pub fn new<'a, I>(targets: I) -> Self
    where
        I: IntoIterator<Item = &'a Target>,
    {
        let records = DashMap::new();
        for target in targets {
            records.insert(target.clone(), StatusRecord::initial());
        }
        Self { records }
    }

    pub fn get(&self, target: &Target) -> Option<StatusRecord> {
        self.records.get(target).map(|entry| entry.value().clone())
    }

    /// Overwrites the record and bumps its revision. Returns the new record,
    /// or `None` if the target has no record.
    pub fn update(&self, target: &Target, status: Status) -> Option<StatusRecord> {
        let mut entry = self.records.get_mut(target)?;
        let record = StatusRecord {
            status,
            revision: entry.revision + 1,
            updated_at: Some(SystemTime::now()),
        };
        *entry = record.clone();
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Status of one target as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    pub name: String,
    pub kind: TargetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub status: Status,
    pub revision: u64,
}

/// Read-only handle to the status cache for consumer threads.
///
/// Cheap to clone; never performs network I/O.
#[derive(Debug, Clone)]
pub struct StatusReader {
    targets: Arc<[Target]>,
    cache: Arc<StatusCache>,
}

impl StatusReader {
    pub(crate) fn new(targets: Arc<[Target]>, cache: Arc<StatusCache>) -> Self {
        Self { targets, cache }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn status_of(&self, target: &Target) -> Result<StatusRecord, RegistryError> {
        self.cache
            .get(target)
            .ok_or_else(|| RegistryError::UnknownTarget(target.to_string()))
    }

    /// Every target's status in registry order.
    pub fn snapshot(&self) -> Vec<TargetStatus> {
        self.targets
            .iter()
            .filter_map(|target| {
                self.cache.get(target).map(|record| TargetStatus {
                    name: target.display_name(),
                    kind: target.kind(),
                    key: target.key().map(str::to_string),
                    status: record.status,
                    revision: record.revision,
                })
            })
            .collect()
    }
}
