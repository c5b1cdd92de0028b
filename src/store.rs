/// Store surface exposed to the producer's callback.
///
/// `insert`/`save` buffer rows for the flush that follows the callback;
/// `remove` only records which entities were asked to be removed — the
/// actual removal policy (tombstone, delete-on-migration, ignore) differs
/// per column-engine and is explicitly out of scope for this core.
use crate::ingest_buffer::IngestBuffer;
use crate::router::ZoneRouter;
use crate::schema::SchemaCatalog;
use crate::types::Entity;

pub struct StoreHandle<'a> {
    buffer: &'a mut IngestBuffer,
    router: &'a ZoneRouter,
    catalog: &'a dyn SchemaCatalog,
    removed: Vec<(&'static str, Option<String>)>,
}

impl<'a> StoreHandle<'a> {
    pub fn new(buffer: &'a mut IngestBuffer, router: &'a ZoneRouter, catalog: &'a dyn SchemaCatalog) -> Self {
        Self { buffer, router, catalog, removed: Vec::new() }
    }

    /// Buffer a single entity for the flush that follows this batch.
    pub fn insert(&mut self, entity: &dyn Entity) -> crate::error::Result<()> {
        let table = self.router.table_for(entity.kind())?;
        let row = entity.into_row();
        self.buffer.insert(&table, entity.kind(), self.catalog, row);
        Ok(())
    }

    /// Buffer multiple entities of (possibly) different kinds in the
    /// order supplied.
    pub fn insert_many(&mut self, entities: &[&dyn Entity]) -> crate::error::Result<()> {
        for entity in entities {
            self.insert(*entity)?;
        }
        Ok(())
    }

    /// Alias of `insert` — upsert semantics are delegated to the column
    /// engine's merge logic.
    pub fn save(&mut self, entity: &dyn Entity) -> crate::error::Result<()> {
        self.insert(entity)
    }

    /// Record a removal request. No physical delete is issued by the
    /// core; callers relying on deletion should consult their engine's
    /// documented removal policy.
    pub fn remove(&mut self, entity: &dyn Entity) {
        self.removed.push((entity.kind(), entity.id()));
    }

    pub fn remove_by_id(&mut self, kind: &'static str, id: impl Into<String>) {
        self.removed.push((kind, Some(id.into())));
    }

    pub fn removed(&self) -> &[(&'static str, Option<String>)] {
        &self.removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_buffer::IngestBuffer;
    use crate::schema::StaticSchemaCatalog;
    use crate::scalar::{NormalizedRow, Scalar};
    use crate::types::ManagedTable;
    use std::sync::Arc;

    struct Vote {
        height: u64,
    }

    impl Entity for Vote {
        fn kind(&self) -> &'static str {
            "Vote"
        }
        fn height(&self) -> Option<u64> {
            Some(self.height)
        }
        fn id(&self) -> Option<String> {
            Some(format!("vote-{}", self.height))
        }
        fn into_row(&self) -> NormalizedRow {
            let mut row = NormalizedRow::new();
            row.push("height", Scalar::UInt64(self.height));
            row
        }
    }

    #[test]
    fn insert_stages_into_the_routed_table() {
        let catalog = StaticSchemaCatalog::new(vec![ManagedTable::Regular {
            kind: "Vote".into(),
            snake_name: "votes".into(),
        }]);
        let router = ZoneRouter::new("ethereum", vec![ManagedTable::Regular {
            kind: "Vote".into(),
            snake_name: "votes".into(),
        }]);
        // IngestBuffer needs a ClickHouseClient, but insert() never reaches
        // the network until flush(); construct one pointed at an address
        // nothing is listening on to keep this test synchronous.
        let client = Arc::new(crate::clickhouse_client::ClickHouseClient::new("http://127.0.0.1:0"));
        let mut buffer = IngestBuffer::new(client);
        {
            let mut handle = StoreHandle::new(&mut buffer, &router, &catalog);
            let vote = Vote { height: 42 };
            handle.insert(&vote).unwrap();
        }
        assert_eq!(buffer.staged_count("ethereum_votes"), 1);
    }

    #[test]
    fn remove_records_but_does_not_stage_a_row() {
        let catalog = StaticSchemaCatalog::new(vec![]);
        let router = ZoneRouter::new("ethereum", vec![]);
        let client = Arc::new(crate::clickhouse_client::ClickHouseClient::new("http://127.0.0.1:0"));
        let mut buffer = IngestBuffer::new(client);
        let vote = Vote { height: 7 };
        let mut handle = StoreHandle::new(&mut buffer, &router, &catalog);
        handle.remove(&vote);
        assert_eq!(handle.removed(), &[("Vote", Some("vote-7".to_string()))]);
        assert!(buffer.is_empty());
    }
}
