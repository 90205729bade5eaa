use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::domain::{Entity, EntityId, attr, class};
use crate::error::XrefError;
use crate::store::GraphStore;

#[derive(Debug, Default)]
pub struct ProvenanceSlot {
    cell: OnceCell<EntityId>,
}

impl ProvenanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<EntityId> {
        self.cell.get().copied()
    }

    pub fn get_or_create(
        &self,
        store: &dyn GraphStore,
        author: EntityId,
        note: &str,
    ) -> Result<EntityId, XrefError> {
        self.cell
            .get_or_try_init(|| {
                let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
                let edit = Entity::new(class::INSTANCE_EDIT)
                    .with(attr::AUTHOR, author)
                    .with(attr::DATE_TIME, timestamp.clone())
                    .with(attr::NOTE, note)
                    .with(attr::DISPLAY_NAME, format!("{note}, {timestamp}"));
                let id = store.create(edit)?;
                info!(edit = %id, author = %author, "created provenance record");
                Ok(id)
            })
            .copied()
    }
}
