use crate::domain::{Template, TemplateId};
use crate::storage::{Result, StorageError, TemplateRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Default)]
pub struct InMemoryTemplateRepository {
    templates: DashMap<TemplateId, Template>,
}

impl InMemoryTemplateRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a stored template, e.g. after `Template::update` or `soft_delete`.
    ///
    /// # Errors
    /// `TemplateNotFound` if the id was never stored.
    pub fn replace(&self, template: &Template) -> Result<()> {
        match self.templates.get_mut(&template.id) {
            Some(mut stored) => {
                *stored = template.clone();
                Ok(())
            }
            None => Err(StorageError::TemplateNotFound(template.id.clone())),
        }
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    #[tracing::instrument(level = "debug", skip(self), fields(template_id = %id))]
    async fn find_by_id(&self, id: &TemplateId) -> Result<Template> {
        self.templates
            .get(id)
            .filter(|t| !t.is_deleted())
            .map(|t| t.clone())
            .ok_or_else(|| StorageError::TemplateNotFound(id.clone()))
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.templates.iter().any(|t| !t.is_deleted() && t.name == name))
    }

    async fn create(&self, template: &Template) -> Result<()> {
        if self.exists_by_name(&template.name).await? {
            return Err(StorageError::Conflict(format!("template name '{}' is taken", template.name)));
        }
        match self.templates.entry(template.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!("template {} already exists", template.id))),
            Entry::Vacant(slot) => {
                slot.insert(template.clone());
                Ok(())
            }
        }
    }
}
