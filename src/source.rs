// 📂 Entity Sources
// Where resolved-entity documents come from
//
// JsonDirEntitySource  -> <dir>/<entity_id>.json snapshots exported from the engine
// InMemoryEntitySource -> map-backed, for embedding and tests

use crate::collaborators::EntitySource;
use crate::entity::EntityDocument;
use crate::error::{Result, RiskError};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const ENTITY_FETCH: &str = "entity fetch";

// ============================================================================
// JSON DIRECTORY
// ============================================================================

#[derive(Debug, Clone)]
pub struct JsonDirEntitySource {
    dir: PathBuf,
}

impl JsonDirEntitySource {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        JsonDirEntitySource { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, entity_id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", entity_id))
    }
}

impl EntitySource for JsonDirEntitySource {
    fn get_entity(&self, entity_id: i64) -> Result<Option<EntityDocument>> {
        let path = self.path_for(entity_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            // No snapshot: the engine no longer resolves this entity
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RiskError::collaborator(
                    ENTITY_FETCH,
                    format!("{}: {}", path.display(), e),
                ))
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let doc = EntityDocument::from_json(&content).map_err(|e| {
            RiskError::collaborator(ENTITY_FETCH, format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(doc))
    }
}

// ============================================================================
// IN MEMORY
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryEntitySource {
    entities: RwLock<HashMap<i64, EntityDocument>>,
}

impl InMemoryEntitySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `doc` under its own entity id, replacing any previous version.
    pub fn insert(&self, doc: EntityDocument) -> Result<()> {
        let mut entities = self
            .entities
            .write()
            .map_err(|e| RiskError::collaborator(ENTITY_FETCH, e))?;
        entities.insert(doc.entity_id(), doc);
        Ok(())
    }

    pub fn remove(&self, entity_id: i64) -> Option<EntityDocument> {
        self.entities.write().ok()?.remove(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<EntityDocument> for InMemoryEntitySource {
    fn from_iter<I: IntoIterator<Item = EntityDocument>>(docs: I) -> Self {
        let entities = docs.into_iter().map(|doc| (doc.entity_id(), doc)).collect();
        InMemoryEntitySource {
            entities: RwLock::new(entities),
        }
    }
}

impl EntitySource for InMemoryEntitySource {
    fn get_entity(&self, entity_id: i64) -> Result<Option<EntityDocument>> {
        let entities = self
            .entities
            .read()
            .map_err(|e| RiskError::collaborator(ENTITY_FETCH, e))?;
        Ok(entities.get(&entity_id).cloned())
    }
}
