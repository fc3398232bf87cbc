//! Document statuses.
//!
//! A status name doubles as the action checked when a non-owner reads a
//! document in that status, so names must normalize to a valid action and
//! are unique ignoring case.

use docctl_rbac::{Action, ResourcePolicy};
use docctl_registry::StatusDocument;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Document status operations.
pub struct StatusRegistry<'a> {
    engine: &'a Engine,
}

impl<'a> StatusRegistry<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create a status.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] if the name cannot be used as an action
    /// - [`EngineError::Conflict`] if a live status already has the name
    #[instrument(skip(self))]
    pub async fn create(&self, actor: &str, name: &str) -> EngineResult<StatusDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::StatusDocument, Action::create())
            .await?;
        let (name, action) = validate_status_name(name)?;

        let mut tx = self.engine.database().begin().await;
        let status = tx.insert_status(StatusDocument::new(name))?;
        self.engine.commit(tx).await?;
        info!(status = %status.name, action = %action, "Created document status");
        Ok(status)
    }

    /// Rename a status.
    ///
    /// Documents keep referencing the row, so their read action changes with
    /// the name.
    #[instrument(skip(self))]
    pub async fn update(&self, actor: &str, uuid: Uuid, name: &str) -> EngineResult<StatusDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::StatusDocument, Action::update())
            .await?;
        let (name, _) = validate_status_name(name)?;

        let mut tx = self.engine.database().begin().await;
        let mut status = tx.status_by_uuid(uuid)?.clone();
        let old_name = std::mem::replace(&mut status.name, name.to_string());
        let status = tx.update_status(status)?;
        self.engine.commit(tx).await?;
        info!(from = %old_name, to = %status.name, "Renamed document status");
        Ok(status)
    }

    /// Soft-delete a status no live document is in.
    ///
    /// # Errors
    ///
    /// [`EngineError::Conflict`] while documents still reference the status.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: &str, uuid: Uuid) -> EngineResult<StatusDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::StatusDocument, Action::delete())
            .await?;

        let mut tx = self.engine.database().begin().await;
        let status = tx.status_by_uuid(uuid)?.clone();
        let in_use = tx.count_controls_with_status(status.id);
        if in_use > 0 {
            return Err(EngineError::Conflict(format!(
                "status {} is used by {} document(s)",
                status.name, in_use
            )));
        }
        let status = tx.soft_delete_status(status.id)?;
        self.engine.commit(tx).await?;
        info!(status = %status.name, "Deleted document status");
        Ok(status)
    }

    pub async fn get(&self, actor: &str, uuid: Uuid) -> EngineResult<StatusDocument> {
        self.engine
            .authorize(actor, ResourcePolicy::StatusDocument, Action::read())
            .await?;
        Ok(self.engine.database().read().await.status_by_uuid(uuid)?.clone())
    }

    pub async fn list(&self, actor: &str) -> EngineResult<Vec<StatusDocument>> {
        self.engine
            .authorize(actor, ResourcePolicy::StatusDocument, Action::read())
            .await?;
        Ok(self.engine.database().read().await.list_statuses())
    }
}

fn validate_status_name(name: &str) -> EngineResult<(&str, Action)> {
    let name = name.trim();
    let action = Action::from_status(name)
        .ok_or_else(|| EngineError::validation(format!("invalid status name: {:?}", name)))?;
    Ok((name, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::admin_engine;
    use chrono::NaiveDate;
    use docctl_registry::DocumentControl;

    #[tokio::test]
    async fn test_create_and_list() {
        let engine = admin_engine().await;
        let published = engine.statuses().create("root", "Published").await.unwrap();
        assert_eq!(published.name, "Published");

        let names: Vec<String> = engine
            .statuses()
            .list("root")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Draft".to_string(), "Published".to_string()]);
    }

    #[tokio::test]
    async fn test_names_unique_ignoring_case() {
        let engine = admin_engine().await;
        assert!(matches!(
            engine.statuses().create("root", "draft").await,
            Err(EngineError::Conflict(_))
        ));
        assert!(matches!(
            engine.statuses().create("root", "  ").await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rename() {
        let engine = admin_engine().await;
        let status = engine.statuses().create("root", "Review").await.unwrap();
        let renamed = engine
            .statuses()
            .update("root", status.uuid, "In Review")
            .await
            .unwrap();
        assert_eq!(renamed.name, "In Review");
        assert_eq!(Action::from_status(&renamed.name).unwrap().as_str(), "in-review");
    }

    #[tokio::test]
    async fn test_delete_refuses_status_in_use() {
        let engine = admin_engine().await;
        let status = engine.statuses().create("root", "Archived").await.unwrap();

        let mut tx = engine.database().begin().await;
        let publish = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let control = tx.insert_control(DocumentControl::new("Policy", "P-1", publish, "root").with_status(status.id));
        tx.commit().await;

        assert!(matches!(
            engine.statuses().delete("root", status.uuid).await,
            Err(EngineError::Conflict(_))
        ));

        let mut tx = engine.database().begin().await;
        tx.soft_delete_control(control.id).unwrap();
        tx.commit().await;

        engine.statuses().delete("root", status.uuid).await.unwrap();
        assert!(matches!(
            engine.statuses().get("root", status.uuid).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_permission() {
        let engine = admin_engine().await;
        assert!(matches!(
            engine.statuses().list("eve").await,
            Err(EngineError::Forbidden { .. })
        ));
    }
}
