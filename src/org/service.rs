//! External organization-creation and payment services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Response of a successful organization creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrganization {
    #[serde(rename = "organisationId")]
    pub organisation_id: String,
}

/// Response of a payment initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub success: bool,
}

/// Creates organizations.
///
/// Re-submitting the same name must not produce a duplicate; that is the
/// implementation's responsibility, not the caller's.
#[async_trait]
pub trait OrganizationService: Send + Sync {
    async fn create_organization(&self, name: &str) -> Result<CreatedOrganization, ServiceError>;
}

/// Starts a plan purchase against an organization.
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn initiate_payment(
        &self,
        organisation_id: &str,
        plan_id: &str,
    ) -> Result<PaymentOutcome, ServiceError>;
}
