//! # Stale-Entity Collector
//!
//! Releases speculative objects that were either superseded by a confirmed
//! server twin or never confirmed within the in-flight window.

use crate::network::NetworkId;
use crate::snapshot::SnapshotStore;

use super::{ObjectHandle, Registry};

/// Why a speculative object was released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Server linked an authoritative twin and the stand-in went dormant
    Confirmed,
    /// Server never confirmed the object in time
    Abandoned,
}

/// Record of a released speculative object
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedObject {
    pub handle: ObjectHandle,
    pub name: String,
    pub reason: ReleaseReason,
    pub creation_command: Option<u32>,
    /// Authoritative twin notified of the release
    pub linked: Option<NetworkId>,
}

/// Garbage collector for speculative objects
#[derive(Debug, Default)]
pub struct StaleEntityCollector {
    confirmed: u64,
    abandoned: u64,
}

impl StaleEntityCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every speculative object that is time-barred.
    ///
    /// Confirmed objects are released only if they went dormant in an earlier
    /// pass; unconfirmed objects are released once their creation command is
    /// older than `oldest_allowable_command`.
    pub fn collect(
        &mut self,
        registry: &mut Registry,
        snapshots: &mut SnapshotStore,
        oldest_allowable_command: u32,
    ) -> Vec<ReleasedObject> {
        let pass = registry.pass();
        let mut doomed = Vec::new();

        for &handle in registry.speculative() {
            let Some(object) = registry.get(handle) else {
                continue;
            };

            let reason = if object.is_acknowledged() {
                match object.dormant_since() {
                    Some(since) if since < pass => Some(ReleaseReason::Confirmed),
                    _ => None,
                }
            } else {
                match object.creation_command() {
                    Some(created) if created < oldest_allowable_command => Some(ReleaseReason::Abandoned),
                    _ => None,
                }
            };

            if let Some(reason) = reason {
                doomed.push((handle, reason));
            }
        }

        let mut released = Vec::with_capacity(doomed.len());
        for (handle, reason) in doomed {
            snapshots.remove(handle);
            let Some(object) = registry.unregister(handle) else {
                continue;
            };

            match reason {
                ReleaseReason::Confirmed => self.confirmed += 1,
                ReleaseReason::Abandoned => self.abandoned += 1,
            }

            log::debug!(
                "Released speculative object '{}' ({:?}, created at command {:?}, linked {:?})",
                object.name(),
                reason,
                object.creation_command(),
                object.linked()
            );

            released.push(ReleasedObject {
                handle,
                name: object.name().to_string(),
                reason,
                creation_command: object.creation_command(),
                linked: object.linked(),
            });
        }

        released
    }

    /// Confirmed stand-ins released so far
    pub fn confirmed_released(&self) -> u64 {
        self.confirmed
    }

    /// Unconfirmed objects released so far
    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }
}
