/// Zone Router (component C): maps an entity kind to the
/// correct physical table, given chain-tip state.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::error::{Result, StoreError};
use crate::naming::{physical_table, Zone};
use crate::types::ManagedTable;

pub struct ZoneRouter {
    network: String,
    is_at_chain_tip: AtomicBool,
    /// kind -> managed table classification, populated at configuration
    /// time from the schema catalog.
    managed: HashMap<String, ManagedTable>,
}

impl ZoneRouter {
    pub fn new(network: impl Into<String>, managed: Vec<ManagedTable>) -> Self {
        let managed = managed.into_iter().map(|m| (m.kind().to_string(), m)).collect();
        Self { network: network.into(), is_at_chain_tip: AtomicBool::new(false), managed }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn is_at_chain_tip(&self) -> bool {
        self.is_at_chain_tip.load(Ordering::SeqCst)
    }

    /// Set externally by the producer. Logs the transition.
    pub fn set_is_at_chain_tip(&self, flag: bool) {
        let previous = self.is_at_chain_tip.swap(flag, Ordering::SeqCst);
        if previous != flag {
            info!(from = previous, to = flag, "chain-tip state transition");
        }
    }

    /// Resolve the physical table an entity of `kind` should be written
    /// to. Catching up (not at tip) routes hot-supported tables straight
    /// to cold, because every block received during catchup is already
    /// past the finality depth by definition — routing it through the hot
    /// zone would be pure migration overhead. Regular tables always use
    /// their single fixed name.
    pub fn table_for(&self, kind: &str) -> Result<String> {
        let table = self
            .managed
            .get(kind)
            .ok_or_else(|| StoreError::UnknownTable(kind.to_string()))?;

        let name = match table {
            ManagedTable::Regular { snake_name, .. } => physical_table(&self.network, Zone::Fixed, snake_name),
            ManagedTable::HotSupported { snake_name, .. } => {
                let zone = if self.is_at_chain_tip() { Zone::Hot } else { Zone::Cold };
                physical_table(&self.network, zone, snake_name)
            }
        };
        Ok(name)
    }

    pub fn managed_table(&self, kind: &str) -> Option<&ManagedTable> {
        self.managed.get(kind)
    }

    pub fn hot_supported_tables(&self) -> impl Iterator<Item = &ManagedTable> {
        self.managed.values().filter(|t| t.is_hot_supported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ZoneRouter {
        ZoneRouter::new(
            "ethereum",
            vec![
                ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() },
                ManagedTable::Regular { kind: "GovernanceVote".into(), snake_name: "governance_votes".into() },
            ],
        )
    }

    #[test]
    fn catchup_routes_hot_supported_tables_to_cold() {
        let r = router();
        assert_eq!(r.table_for("Transfer").unwrap(), "ethereum_cold_transfers");
    }

    #[test]
    fn at_tip_routes_hot_supported_tables_to_hot() {
        let r = router();
        r.set_is_at_chain_tip(true);
        assert_eq!(r.table_for("Transfer").unwrap(), "ethereum_hot_transfers");
    }

    #[test]
    fn regular_tables_are_never_routed() {
        let r = router();
        r.set_is_at_chain_tip(true);
        assert_eq!(r.table_for("GovernanceVote").unwrap(), "ethereum_governance_votes");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let r = router();
        assert!(r.table_for("Nonexistent").is_err());
    }
}
