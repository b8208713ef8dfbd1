use serde::{Deserialize, Serialize};

use subtrack_core::{CategoryId, DomainError, DomainResult, Entity};

/// A grouping of subscriptions (e.g. "Streaming", "Utilities").
///
/// Subscriptions reference a category; they are not owned by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CategoryRecord")]
pub struct Category {
    id: CategoryId,
    name: String,
}

impl Category {
    pub fn new(name: impl AsRef<str>) -> DomainResult<Self> {
        Ok(Self {
            id: CategoryId::new(),
            name: validate_name(name.as_ref())?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl AsRef<str>) -> DomainResult<()> {
        self.name = validate_name(name.as_ref())?;
        Ok(())
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Deserialize)]
struct CategoryRecord {
    id: CategoryId,
    name: String,
}

impl TryFrom<CategoryRecord> for Category {
    type Error = DomainError;

    fn try_from(record: CategoryRecord) -> DomainResult<Self> {
        Ok(Self {
            id: record.id,
            name: validate_name(&record.name)?,
        })
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("category name cannot be empty"));
    }
    Ok(name.to_string())
}
