use tokio::sync::broadcast;
use tracing::trace;

/// The tables a query can depend on, used as invalidation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Foods,
    FoodEntries,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Foods => "foods",
            Table::FoodEntries => "food_entries",
        }
    }
}

/// Publish/subscribe registry keyed by table. Every committed write
/// notifies the tables it touched; live queries subscribe and re-run
/// when a table in their dependency set changes.
#[derive(Debug, Clone)]
pub(crate) struct ChangeNotifier {
    tx: broadcast::Sender<Table>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        // Capacity only bounds bursts; a lagged subscriber re-queries
        // anyway, so losing individual notifications is harmless.
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub(crate) fn notify(&self, table: Table) {
        trace!(table = table.name(), "table invalidated");
        // Send only fails when no subscriber exists; nothing to do then.
        let _ = self.tx.send(table);
    }
}
