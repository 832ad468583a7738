//! Organization store trait — the console's read side of organization data.

use async_trait::async_trait;

use crate::error::StoreError;

use super::model::Organization;

/// Session-scoped organization store.
///
/// Only the store mutates the selected organization. The gate and the wizard
/// read through it and ask it to refresh or re-label, never write directly.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// The currently selected organization, if any.
    async fn selected_organization(&self) -> Option<Organization>;

    /// Re-fetch an organization's subscriptions from the backend.
    async fn refresh(&self, organization_id: &str) -> Result<(), StoreError>;

    /// Update the cached id/name of the selected organization.
    ///
    /// Fire-and-forget: callers do not wait on or observe the outcome.
    fn set_selected_organization_meta(&self, organization_id: &str, name: &str);

    /// Switch the selected organization.
    async fn select_organization(&self, organization_id: &str) -> Result<Organization, StoreError>;

    /// All organizations visible to the current user.
    async fn list_organizations(&self) -> Vec<Organization>;
}
