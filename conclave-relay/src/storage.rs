//! Durable relay state.
//!
//! Groups, accepted capability records, and revocations survive restarts;
//! content events are in-memory only. Records are bincode under redb
//! tables, keyed by group id or event id.

#![forbid(unsafe_code)]

use std::path::Path;

use bincode::Options;
use conclave_core::capability::Capability;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::group::Group;

const GROUPS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");
const CAPABILITIES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("capabilities");
const REVOCATIONS_TABLE: TableDefinition<&[u8], i64> = TableDefinition::new("revocations");

const MAX_RECORD_SIZE: u64 = 1024 * 1024;

fn codec() -> impl Options {
    bincode::options().with_limit(MAX_RECORD_SIZE)
}

pub struct Storage {
    db: Database,
}

impl Storage {
    /// Open (or create) the database and ensure all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(GROUPS_TABLE)?;
            txn.open_table(CAPABILITIES_TABLE)?;
            txn.open_table(REVOCATIONS_TABLE)?;
        }
        txn.commit()?;
        debug!(path = %path.display(), "relay storage opened");
        Ok(Self { db })
    }

    pub fn store_group(&self, group: &Group) -> Result<()> {
        let bytes = codec()
            .serialize(group)
            .map_err(RelayError::Serialization)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(GROUPS_TABLE)?;
            table.insert(group.id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn delete_group(&self, id: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(GROUPS_TABLE)?;
            table.remove(id)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn load_groups(&self) -> Result<Vec<Group>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(GROUPS_TABLE)?;

        let mut groups = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let group: Group = codec()
                .deserialize(value.value())
                .map_err(RelayError::Serialization)?;
            groups.push(group);
        }
        Ok(groups)
    }

    pub fn store_capability(&self, capability: &Capability) -> Result<()> {
        let bytes = codec()
            .serialize(capability)
            .map_err(RelayError::Serialization)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CAPABILITIES_TABLE)?;
            table.insert(capability.event_id.as_slice(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn load_capabilities(&self) -> Result<Vec<Capability>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CAPABILITIES_TABLE)?;

        let mut capabilities = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let capability: Capability = codec()
                .deserialize(value.value())
                .map_err(RelayError::Serialization)?;
            capabilities.push(capability);
        }
        Ok(capabilities)
    }

    pub fn store_revocation(&self, event_id: &[u8; 32], accepted_at: i64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(REVOCATIONS_TABLE)?;
            table.insert(event_id.as_slice(), accepted_at)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn load_revocations(&self) -> Result<Vec<[u8; 32]>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(REVOCATIONS_TABLE)?;

        let mut revocations = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            let id: [u8; 32] = key
                .value()
                .try_into()
                .map_err(|_| RelayError::Database("malformed revocation key".into()))?;
            revocations.push(id);
        }
        Ok(revocations)
    }
}
