//! In-memory store, optionally backed by a JSON snapshot file

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Error, ObjectStore, Result, Setting};
use crate::object::{GovernanceObject, GovernanceRecord, Proposal, Superblock};
use crate::time::EpochSecs;
use crate::voting::Vote;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    objects: BTreeMap<String, GovernanceObject>,
    records: BTreeMap<String, GovernanceRecord>,
    votes: Vec<Vote>,
    signals: BTreeSet<String>,
    outcomes: BTreeSet<String>,
    settings: BTreeMap<String, Setting>,
}

/// An in-memory [`ObjectStore`].
///
/// When opened on a path, the tables are loaded from a snapshot file there
/// and written back on [`ObjectStore::flush`]. Votes are written through:
/// every inserted vote flushes the snapshot, as the daemon has already
/// counted it.
#[derive(Debug, Default)]
pub struct MemStore {
    tables: Tables,
    path: Option<PathBuf>,
}

impl MemStore {
    /// An empty store that is never persisted
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by the snapshot at `path`. A missing snapshot
    /// yields an empty store; an unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "No store snapshot found, starting empty"
                );
                Tables::default()
            }
            Err(err) => {
                return Err(Error::Unavailable(format!(
                    "cannot read {}: {err}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            tables,
            path: Some(path),
        })
    }

    fn check_type(&self, record: &GovernanceRecord) -> Result<()> {
        let object = self
            .tables
            .objects
            .get(record.object_hash())
            .ok_or_else(|| {
                Error::MissingObject(record.object_hash().to_string())
            })?;
        if object.object_type != record.object_type() {
            return Err(Error::TypeMismatch {
                object_hash: record.object_hash().to_string(),
                expected: object.object_type,
                found: record.object_type(),
            });
        }
        Ok(())
    }

    fn check_record(record: &GovernanceRecord) -> Result<()> {
        match record {
            GovernanceRecord::Proposal(p) => p.check_columns()?,
            GovernanceRecord::Superblock(_) => {}
        }
        Ok(())
    }
}

impl ObjectStore for MemStore {
    fn get_object(
        &self,
        object_hash: &str,
    ) -> Result<Option<GovernanceObject>> {
        Ok(self.tables.objects.get(object_hash).cloned())
    }

    fn get_or_create_object(
        &mut self,
        object: GovernanceObject,
    ) -> Result<(GovernanceObject, bool)> {
        if let Some(existing) = self.tables.objects.get(&object.object_hash) {
            return Ok((existing.clone(), false));
        }
        self.tables
            .objects
            .insert(object.object_hash.clone(), object.clone());
        Ok((object, true))
    }

    fn update_object(&mut self, object: &GovernanceObject) -> Result<()> {
        match self.tables.objects.get_mut(&object.object_hash) {
            Some(stored) => {
                stored.clone_from(object);
                Ok(())
            }
            None => Err(Error::MissingObject(object.object_hash.clone())),
        }
    }

    fn delete_object(&mut self, object_hash: &str) -> Result<bool> {
        if self.tables.objects.remove(object_hash).is_none() {
            return Ok(false);
        }
        self.tables.records.remove(object_hash);
        self.tables
            .votes
            .retain(|vote| vote.governance_object_hash != object_hash);
        Ok(true)
    }

    fn objects(&self) -> Result<Vec<GovernanceObject>> {
        Ok(self.tables.objects.values().cloned().collect())
    }

    fn get_record(
        &self,
        object_hash: &str,
    ) -> Result<Option<GovernanceRecord>> {
        Ok(self.tables.records.get(object_hash).cloned())
    }

    fn get_or_create_record(
        &mut self,
        mut record: GovernanceRecord,
    ) -> Result<(GovernanceRecord, bool)> {
        if let Some(existing) = self.tables.records.get(record.object_hash()) {
            return Ok((existing.clone(), false));
        }
        self.check_type(&record)?;
        record.before_save();
        Self::check_record(&record)?;
        self.tables
            .records
            .insert(record.object_hash().to_string(), record.clone());
        Ok((record, true))
    }

    fn update_record(&mut self, mut record: GovernanceRecord) -> Result<()> {
        self.check_type(&record)?;
        record.before_save();
        Self::check_record(&record)?;
        self.tables
            .records
            .insert(record.object_hash().to_string(), record);
        Ok(())
    }

    fn proposals(&self) -> Result<Vec<Proposal>> {
        Ok(self
            .tables
            .records
            .values()
            .filter_map(|record| match record {
                GovernanceRecord::Proposal(p) => Some(p.clone()),
                GovernanceRecord::Superblock(_) => None,
            })
            .collect())
    }

    fn superblocks(&self) -> Result<Vec<Superblock>> {
        Ok(self
            .tables
            .records
            .values()
            .filter_map(|record| match record {
                GovernanceRecord::Superblock(sb) => Some(sb.clone()),
                GovernanceRecord::Proposal(_) => None,
            })
            .collect())
    }

    fn insert_vote(&mut self, vote: Vote) -> Result<()> {
        if !self.tables.objects.contains_key(&vote.governance_object_hash) {
            return Err(Error::MissingObject(vote.governance_object_hash));
        }
        self.tables.votes.push(vote);
        self.flush()
    }

    fn votes_for(&self, object_hash: &str) -> Result<Vec<Vote>> {
        Ok(self
            .tables
            .votes
            .iter()
            .filter(|vote| vote.governance_object_hash == object_hash)
            .cloned()
            .collect())
    }

    fn signal_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.signals.iter().cloned().collect())
    }

    fn outcome_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.outcomes.iter().cloned().collect())
    }

    fn get_or_create_signal(&mut self, name: &str) -> Result<bool> {
        Ok(self.tables.signals.insert(name.to_string()))
    }

    fn get_or_create_outcome(&mut self, name: &str) -> Result<bool> {
        Ok(self.tables.outcomes.insert(name.to_string()))
    }

    fn get_setting(&self, name: &str) -> Result<Option<Setting>> {
        Ok(self.tables.settings.get(name).cloned())
    }

    fn put_setting(
        &mut self,
        name: &str,
        value: &str,
        now: EpochSecs,
    ) -> Result<()> {
        self.tables
            .settings
            .entry(name.to_string())
            .and_modify(|setting| {
                setting.value = value.to_string();
                setting.updated_at = now;
            })
            .or_insert_with(|| Setting {
                name: name.to_string(),
                value: value.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        // write a sibling file first so a crash never leaves a torn snapshot
        let tmp = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &self.tables)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
