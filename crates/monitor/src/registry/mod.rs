//! Target registry.
//!
//! The registry fixes the set of monitored targets at construction and
//! owns their records in the [`StatusCache`]. Membership never changes
//! afterwards, so every registered target always has a record.

pub mod cache;
pub mod target;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

pub use cache::{Status, StatusCache, StatusReader, StatusRecord, TargetStatus};
pub use target::{Target, TargetKind};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Lookup of a target that was never registered.
    #[error("target not registered: {0}")]
    UnknownTarget(String),

    /// The same key appears twice within one target kind.
    #[error("duplicate target: {0}")]
    DuplicateTarget(String),

    /// An extension or mailbox with an empty key.
    #[error("{0} key must not be empty")]
    EmptyKey(TargetKind),

    /// A key containing a line break, which would split its request.
    #[error("{0} key must not contain line breaks: {1:?}")]
    InvalidKey(TargetKind, String),
}

/// The fixed set of monitored targets and their status records.
#[derive(Debug)]
pub struct TargetRegistry {
    targets: Arc<[Target]>,
    cache: Arc<StatusCache>,
}

impl TargetRegistry {
    /// Registers the connection, then `extensions` and `mailboxes` in the
    /// order given.
    pub fn new<E, M>(extensions: E, mailboxes: M) -> Result<Self, RegistryError>
    where
        E: IntoIterator,
        E::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        let mut targets = vec![Target::Connection];
        targets.extend(extensions.into_iter().map(|e| Target::Extension(e.into())));
        targets.extend(mailboxes.into_iter().map(|m| Target::Mailbox(m.into())));

        let mut seen = HashSet::new();
        for target in &targets {
            if let Some(key) = target.key() {
                if key.trim().is_empty() {
                    return Err(RegistryError::EmptyKey(target.kind()));
                }
                if key.contains(['\r', '\n']) {
                    return Err(RegistryError::InvalidKey(target.kind(), key.to_string()));
                }
            }
            if !seen.insert(target) {
                return Err(RegistryError::DuplicateTarget(target.to_string()));
            }
        }

        let cache = Arc::new(StatusCache::new(targets.iter()));
        tracing::debug!(targets = targets.len(), "Target registry created");

        Ok(Self {
            targets: targets.into(),
            cache,
        })
    }

    /// Connection first, then extensions, then mailboxes, each in
    /// discovery order.
    pub fn all_targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false: the connection target is always registered.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.cache.get(target).is_some()
    }

    pub fn status_of(&self, target: &Target) -> Result<StatusRecord, RegistryError> {
        self.cache
            .get(target)
            .ok_or_else(|| RegistryError::UnknownTarget(target.to_string()))
    }

    /// Overwrites the target's status and bumps its revision. This is the
    /// only way records change.
    pub fn set_status(&self, target: &Target, status: Status) -> Result<StatusRecord, RegistryError> {
        self.cache
            .update(target, status)
            .ok_or_else(|| RegistryError::UnknownTarget(target.to_string()))
    }

    /// A read-only handle for consumers on other threads.
    pub fn reader(&self) -> StatusReader {
        StatusReader::new(Arc::clone(&self.targets), Arc::clone(&self.cache))
    }
}
