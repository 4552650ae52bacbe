//! Governance object storage

mod mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::mem::MemStore;
use crate::object::{GovernanceObject, GovernanceRecord, Proposal, Superblock};
use crate::time::EpochSecs;
use crate::voting::{Outcome, Signal, Vote};

/// A stored value that breaks a column constraint of its table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Constraint violated on {table}.{column}: {reason}")]
pub struct ConstraintViolation {
    /// Table name
    pub table: &'static str,
    /// Column name
    pub column: &'static str,
    /// What was wrong with the value
    pub reason: String,
}

impl ConstraintViolation {
    /// New constraint violation
    pub fn new(
        table: &'static str,
        column: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            table,
            column,
            reason: reason.into(),
        }
    }
}

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Constraint(#[from] ConstraintViolation),
    #[error("No governance object with hash {0}")]
    MissingObject(String),
    #[error(
        "Sub-record of {object_hash} is a {found}, but its object is a \
         {expected}"
    )]
    TypeMismatch {
        object_hash: String,
        expected: crate::object::ObjectType,
        found: crate::object::ObjectType,
    },
    #[error("Reference vocabulary is missing {0:?}")]
    MissingVocabulary(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A result of a storage operation
pub type Result<T> = std::result::Result<T, Error>;

/// A named setting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    /// Setting name
    pub name: String,
    /// Setting value
    pub value: String,
    /// When the setting was first written
    pub created_at: EpochSecs,
    /// When the setting was last written
    pub updated_at: EpochSecs,
}

/// Persistent storage of governance objects, their typed sub-records and
/// votes.
///
/// Writes of typed sub-records must run [`GovernanceRecord::before_save`]
/// before the record becomes visible to queries. Deleting a governance object
/// cascades to its sub-record and votes.
pub trait ObjectStore {
    /// Read a governance object by hash
    fn get_object(&self, object_hash: &str) -> Result<Option<GovernanceObject>>;

    /// Return the stored object with the same hash as `object`, or insert
    /// `object` if there is none. The flag is `true` when it was inserted.
    fn get_or_create_object(
        &mut self,
        object: GovernanceObject,
    ) -> Result<(GovernanceObject, bool)>;

    /// Unconditionally overwrite a stored governance object
    fn update_object(&mut self, object: &GovernanceObject) -> Result<()>;

    /// Delete a governance object together with its sub-record and votes.
    /// Returns `false` if there was no such object.
    fn delete_object(&mut self, object_hash: &str) -> Result<bool>;

    /// All governance objects, ordered by hash
    fn objects(&self) -> Result<Vec<GovernanceObject>>;

    /// Read the typed sub-record of a governance object
    fn get_record(&self, object_hash: &str) -> Result<Option<GovernanceRecord>>;

    /// Return the stored sub-record with the same hash as `record`, or insert
    /// `record` if there is none. The owning object must exist. The flag is
    /// `true` when it was inserted.
    fn get_or_create_record(
        &mut self,
        record: GovernanceRecord,
    ) -> Result<(GovernanceRecord, bool)>;

    /// Unconditionally overwrite a stored sub-record
    fn update_record(&mut self, record: GovernanceRecord) -> Result<()>;

    /// All proposals, ordered by object hash
    fn proposals(&self) -> Result<Vec<Proposal>>;

    /// All superblocks, ordered by object hash
    fn superblocks(&self) -> Result<Vec<Superblock>>;

    /// Append a vote. The owning object must exist.
    fn insert_vote(&mut self, vote: Vote) -> Result<()>;

    /// Votes on a governance object, in insertion order
    fn votes_for(&self, object_hash: &str) -> Result<Vec<Vote>>;

    /// Names seeded into the signals table
    fn signal_names(&self) -> Result<Vec<String>>;

    /// Names seeded into the outcomes table
    fn outcome_names(&self) -> Result<Vec<String>>;

    /// Insert a signal name unless present. Returns `true` if inserted.
    fn get_or_create_signal(&mut self, name: &str) -> Result<bool>;

    /// Insert an outcome name unless present. Returns `true` if inserted.
    fn get_or_create_outcome(&mut self, name: &str) -> Result<bool>;

    /// Read a setting
    fn get_setting(&self, name: &str) -> Result<Option<Setting>>;

    /// Write a setting
    fn put_setting(
        &mut self,
        name: &str,
        value: &str,
        now: EpochSecs,
    ) -> Result<()>;

    /// Persist all pending writes
    fn flush(&self) -> Result<()>;
}

/// Seed the signal and outcome tables. Safe to repeat; returns the number of
/// rows created.
#[allow(clippy::arithmetic_side_effects)]
pub fn seed_vocabulary<S>(store: &mut S) -> Result<usize>
where
    S: ObjectStore,
{
    let mut rows_created = 0;
    for signal in Signal::ALL {
        if store.get_or_create_signal(signal.name())? {
            rows_created += 1;
        }
    }
    for outcome in Outcome::ALL {
        if store.get_or_create_outcome(outcome.name())? {
            rows_created += 1;
        }
    }
    if rows_created > 0 {
        tracing::info!(rows_created, "Seeded vote vocabulary");
    }
    Ok(rows_created)
}

/// Check that every signal and outcome the agent may vote with is present in
/// the store's reference tables.
pub fn check_vocabulary<S>(store: &S) -> Result<()>
where
    S: ObjectStore,
{
    let signals = store.signal_names()?;
    if let Some(missing) =
        Signal::ALL.iter().find(|s| !signals.iter().any(|n| n == s.name()))
    {
        return Err(Error::MissingVocabulary(missing.name().to_string()));
    }
    let outcomes = store.outcome_names()?;
    if let Some(missing) =
        Outcome::ALL.iter().find(|o| !outcomes.iter().any(|n| n == o.name()))
    {
        return Err(Error::MissingVocabulary(missing.name().to_string()));
    }
    Ok(())
}

/// Delete proposals that ended long enough ago to no longer be of interest.
/// Returns the hashes of the pruned objects.
pub fn prune<S>(store: &mut S, now: EpochSecs) -> Result<Vec<String>>
where
    S: ObjectStore,
{
    let mut pruned = Vec::new();
    for proposal in store.proposals()? {
        let record = GovernanceRecord::Proposal(proposal);
        if crate::validation::is_deletable(&record, now)
            && store.delete_object(record.object_hash())?
        {
            tracing::debug!(
                object_hash = record.object_hash(),
                "Pruned expired proposal"
            );
            pruned.push(record.object_hash().to_string());
        }
    }
    Ok(pruned)
}
