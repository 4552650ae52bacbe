//! Synchronisation of the local store with the daemon's governance objects.
//!
//! The local store is a cache of the network: objects the daemon no longer
//! lists are purged, and every listed object is upserted. Upserts are
//! get-or-create followed by an unconditional update, so a pass can be
//! repeated or retried at any point.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::codec::{self, DecodeError};
use crate::daemon::{DaemonClient, GovObjectRecord};
use crate::object::{GovernanceObject, GovernanceRecord};
use crate::store::{self, ConstraintViolation, ObjectStore};
use crate::time::{now_epoch, EpochSecs};
use crate::voting::{self, has_voted, Outcome, Signal, VoteStatus};

/// Name of the setting holding the time of the last completed pass
pub const LAST_SYNC_SETTING: &str = "last_sync";

/// What a sync pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Local objects deleted because the daemon no longer lists them
    pub purged: usize,
    /// Objects seen for the first time
    pub created: usize,
    /// Known objects that were refreshed
    pub updated: usize,
    /// Objects whose data could not be decoded or stored
    pub malformed: usize,
    /// Delete votes cast on malformed objects
    pub delete_votes: usize,
}

enum Imported {
    Created,
    Updated,
}

enum ImportError {
    /// The wire record or its payload can't be decoded. Nothing was stored.
    Decode(DecodeError),
    /// The envelope was stored, but its sub-record breaks a constraint.
    Constraint(Box<GovernanceObject>, ConstraintViolation),
    Store(store::Error),
}

impl From<DecodeError> for ImportError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

impl From<store::Error> for ImportError {
    fn from(err: store::Error) -> Self {
        Self::Store(err)
    }
}

/// Run a full sync pass.
///
/// The object list is fetched before anything is written, so a daemon
/// failure leaves the store untouched. A malformed object never aborts the
/// pass; instead this node votes to delete it, once.
#[allow(clippy::arithmetic_side_effects)]
pub fn sync<S, D>(store: &mut S, daemon: &D) -> crate::Result<SyncReport>
where
    S: ObjectStore,
    D: DaemonClient + ?Sized,
{
    let remote = daemon.list_governance_objects()?;
    let now = now_epoch();
    tracing::info!(objects = remote.len(), "Syncing governance objects");

    let mut report = SyncReport {
        purged: purge(store, &remote)?,
        ..SyncReport::default()
    };

    for (object_hash, value) in &remote {
        match import_object(store, value, now) {
            Ok(Imported::Created) => report.created += 1,
            Ok(Imported::Updated) => report.updated += 1,
            Err(ImportError::Decode(err)) => {
                tracing::warn!(
                    %object_hash,
                    %err,
                    "Skipping undecodable governance object"
                );
                report.malformed += 1;
            }
            Err(ImportError::Constraint(object, violation)) => {
                tracing::warn!(
                    %object_hash,
                    %violation,
                    "Malformed governance object"
                );
                report.malformed += 1;
                if vote_delete(store, daemon, &object)? {
                    report.delete_votes += 1;
                }
            }
            Err(ImportError::Store(err)) => return Err(err.into()),
        }
    }

    store.put_setting(LAST_SYNC_SETTING, &now.to_string(), now)?;
    tracing::info!(
        purged = report.purged,
        created = report.created,
        updated = report.updated,
        malformed = report.malformed,
        delete_votes = report.delete_votes,
        "Sync finished"
    );
    Ok(report)
}

/// Delete every local object the daemon no longer lists. Returns how many
/// were deleted.
fn purge<S>(
    store: &mut S,
    remote: &BTreeMap<String, Value>,
) -> store::Result<usize>
where
    S: ObjectStore,
{
    let stale: Vec<String> = store
        .objects()?
        .into_iter()
        .map(|object| object.object_hash)
        .filter(|object_hash| !remote.contains_key(object_hash))
        .collect();
    for object_hash in &stale {
        store.delete_object(object_hash)?;
        tracing::debug!(%object_hash, "Purged governance object");
    }
    Ok(stale.len())
}

/// Upsert one listed object: its envelope first, then its typed sub-record.
fn import_object<S>(
    store: &mut S,
    value: &Value,
    now: EpochSecs,
) -> Result<Imported, ImportError>
where
    S: ObjectStore,
{
    let record = GovObjectRecord::from_wire(value).map_err(DecodeError::from)?;
    let decoded = codec::decode(&record.data_hex)?;

    let incoming =
        GovernanceObject::from_record(&record, decoded.object_type, now);
    let (mut object, created) = store.get_or_create_object(incoming.clone())?;
    if !created {
        object.refresh_from(&incoming);
        store.update_object(&object)?;
    }
    tracing::debug!(
        object_hash = %object.object_hash,
        object_type = %object.object_type,
        created,
        "Imported governance object"
    );

    let sub_record = match GovernanceRecord::from_fields(
        decoded.object_type,
        &object.object_hash,
        &decoded.fields,
    ) {
        Ok(sub_record) => sub_record,
        Err(violation) => {
            return Err(ImportError::Constraint(Box::new(object), violation));
        }
    };
    let stored = store
        .get_or_create_record(sub_record.clone())
        .and_then(|(_, sub_created)| {
            if sub_created {
                Ok(())
            } else {
                store.update_record(sub_record)
            }
        });
    match stored {
        Ok(()) if created => Ok(Imported::Created),
        Ok(()) => Ok(Imported::Updated),
        Err(store::Error::Constraint(violation)) => {
            Err(ImportError::Constraint(Box::new(object), violation))
        }
        Err(err) => Err(err.into()),
    }
}

/// Vote delete/yes on a malformed object unless this node already did.
/// Returns `true` if a vote was cast. Daemon failures while voting are
/// logged and don't stop the pass.
fn vote_delete<S, D>(
    store: &mut S,
    daemon: &D,
    object: &GovernanceObject,
) -> crate::Result<bool>
where
    S: ObjectStore,
    D: DaemonClient + ?Sized,
{
    let previous = has_voted(
        &*store,
        &object.object_hash,
        Some(Signal::Delete),
        Some(Outcome::Yes),
    )?;
    if previous > 0 {
        return Ok(false);
    }
    match voting::cast_vote(store, daemon, object, Signal::Delete, Outcome::Yes)
    {
        Ok(VoteStatus::Cast(_)) => Ok(true),
        Ok(VoteStatus::Rejected(_) | VoteStatus::Skipped) => Ok(false),
        Err(voting::Error::Daemon(err)) => {
            tracing::warn!(
                object_hash = %object.object_hash,
                %err,
                "Failed to vote delete on a malformed object"
            );
            Ok(false)
        }
        Err(voting::Error::Store(err)) => Err(err.into()),
    }
}
