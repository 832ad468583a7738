//! In-memory backend and caching store.
//!
//! Stands in for the real organization/billing backend. The backend is the
//! source of truth that the services write to; `MemoryOrganizationStore` is
//! the session's cached view of it, refreshed on demand.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_PLATFORM_PLAN;
use crate::error::{ServiceError, StoreError};

use super::model::{
    BillingCycle, BillingInfo, Organization, Product, ProductType, Subscription,
    SubscriptionStatus,
};
use super::service::{CreatedOrganization, OrganizationService, PaymentOutcome, PaymentService};
use super::store::OrganizationStore;

/// A purchasable plan in the catalogue.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub product: Product,
    pub price: Decimal,
    pub currency: String,
    pub cycle: BillingCycle,
}

impl Plan {
    fn billing(&self) -> BillingInfo {
        let period = match self.cycle {
            BillingCycle::Monthly => Duration::days(30),
            BillingCycle::Quarterly => Duration::days(91),
            BillingCycle::Annually => Duration::days(365),
        };
        BillingInfo {
            price: self.price,
            currency: self.currency.clone(),
            cycle: self.cycle,
            next_payment_at: Some(Utc::now() + period),
        }
    }
}

/// The default plan catalogue: one platform plan and two support plans.
pub fn default_plans(platform_plan_id: &str) -> Vec<Plan> {
    vec![
        Plan {
            id: platform_plan_id.to_string(),
            product: Product::new("prod_platform")
                .with_name("Platform")
                .with_type(ProductType::Code(1)),
            price: dec!(49.00),
            currency: "USD".into(),
            cycle: BillingCycle::Monthly,
        },
        Plan {
            id: "support-standard".into(),
            product: Product::new("prod_support_standard")
                .with_name("Standard Support")
                .with_type(ProductType::Code(2)),
            price: dec!(19.00),
            currency: "USD".into(),
            cycle: BillingCycle::Monthly,
        },
        Plan {
            id: "support-premium".into(),
            product: Product::new("prod_support_premium")
                .with_name("Premium Support")
                .with_type(ProductType::Code(2)),
            price: dec!(990.00),
            currency: "USD".into(),
            cycle: BillingCycle::Annually,
        },
    ]
}

/// In-memory organization/billing backend.
pub struct InMemoryBackend {
    organizations: RwLock<Vec<Organization>>,
    plans: Vec<Plan>,
}

impl InMemoryBackend {
    /// Empty backend with the default plan catalogue.
    pub fn new() -> Arc<Self> {
        Self::with_plans(default_plans(DEFAULT_PLATFORM_PLAN))
    }

    pub fn with_plans(plans: Vec<Plan>) -> Arc<Self> {
        Arc::new(Self {
            organizations: RwLock::new(Vec::new()),
            plans,
        })
    }

    /// Insert or replace an organization.
    pub fn insert_organization(&self, org: Organization) {
        let mut orgs = self.organizations.write().unwrap_or_else(|e| e.into_inner());
        match orgs.iter_mut().find(|o| o.id == org.id) {
            Some(existing) => *existing = org,
            None => orgs.push(org),
        }
    }

    pub fn organization(&self, id: &str) -> Option<Organization> {
        let orgs = self.organizations.read().unwrap_or_else(|e| e.into_inner());
        orgs.iter().find(|o| o.id == id).cloned()
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.organizations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}

#[async_trait]
impl OrganizationService for InMemoryBackend {
    async fn create_organization(&self, name: &str) -> Result<CreatedOrganization, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Rejected {
                reason: "name is empty".into(),
            });
        }

        let mut orgs = self.organizations.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = orgs.iter().find(|o| o.name.eq_ignore_ascii_case(name)) {
            if existing.is_owner {
                debug!(organization_id = %existing.id, "Organization already exists, reusing");
                return Ok(CreatedOrganization {
                    organisation_id: existing.id.clone(),
                });
            }
            return Err(ServiceError::Conflict {
                name: name.to_string(),
            });
        }

        let id = format!("org_{}", Uuid::new_v4().simple());
        orgs.push(Organization::new(&id, name));
        info!(organization_id = %id, name = %name, "Organization created");

        Ok(CreatedOrganization {
            organisation_id: id,
        })
    }
}

#[async_trait]
impl PaymentService for InMemoryBackend {
    async fn initiate_payment(
        &self,
        organisation_id: &str,
        plan_id: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        let plan = self
            .plan(plan_id)
            .ok_or_else(|| ServiceError::UnknownPlan {
                plan_id: plan_id.to_string(),
            })?
            .clone();

        let mut orgs = self.organizations.write().unwrap_or_else(|e| e.into_inner());
        let org = orgs
            .iter_mut()
            .find(|o| o.id == organisation_id)
            .ok_or_else(|| ServiceError::Rejected {
                reason: format!("organization {organisation_id} does not exist"),
            })?;

        let already_active = org
            .subscriptions
            .iter()
            .any(|s| s.status.is_active() && s.product.id == plan.product.id);
        if already_active {
            debug!(organization_id = %organisation_id, plan_id = %plan_id, "Plan already active");
            return Ok(PaymentOutcome { success: true });
        }

        let subscription = Subscription {
            id: format!("sub_{}", Uuid::new_v4().simple()),
            organization_id: organisation_id.to_string(),
            status: SubscriptionStatus::Active,
            product: plan.product.clone(),
            billing: plan.billing(),
        };
        info!(
            organization_id = %organisation_id,
            subscription_id = %subscription.id,
            plan_id = %plan_id,
            "Subscription activated"
        );
        org.subscriptions.push(subscription);

        Ok(PaymentOutcome { success: true })
    }
}

/// Session-scoped organization cache over an [`InMemoryBackend`].
pub struct MemoryOrganizationStore {
    backend: Arc<InMemoryBackend>,
    cache: RwLock<HashMap<String, Organization>>,
    selected: RwLock<Option<String>>,
}

impl MemoryOrganizationStore {
    /// Create a store primed with the backend's current organizations.
    pub fn new(backend: Arc<InMemoryBackend>) -> Arc<Self> {
        let cache = backend
            .organizations()
            .into_iter()
            .map(|o| (o.id.clone(), o))
            .collect();
        Arc::new(Self {
            backend,
            cache: RwLock::new(cache),
            selected: RwLock::new(None),
        })
    }

    fn selected_id(&self) -> Option<String> {
        self.selected
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl OrganizationStore for MemoryOrganizationStore {
    async fn selected_organization(&self) -> Option<Organization> {
        let id = self.selected_id()?;
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(&id).cloned()
    }

    async fn refresh(&self, organization_id: &str) -> Result<(), StoreError> {
        let fresh = self
            .backend
            .organization(organization_id)
            .ok_or_else(|| StoreError::NotFound {
                id: organization_id.to_string(),
            })?;

        debug!(
            organization_id = %organization_id,
            subscriptions = fresh.subscriptions.len(),
            "Organization refreshed"
        );
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(fresh.id.clone(), fresh);
        Ok(())
    }

    fn set_selected_organization_meta(&self, organization_id: &str, name: &str) {
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache
                .entry(organization_id.to_string())
                .and_modify(|o| o.name = name.to_string())
                .or_insert_with(|| Organization::new(organization_id, name));
        }
        *self.selected.write().unwrap_or_else(|e| e.into_inner()) =
            Some(organization_id.to_string());
    }

    async fn select_organization(&self, organization_id: &str) -> Result<Organization, StoreError> {
        let cached = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            cache.get(organization_id).cloned()
        };
        let org = match cached {
            Some(org) => org,
            None => {
                let org = self.backend.organization(organization_id).ok_or_else(|| {
                    warn!(organization_id = %organization_id, "Cannot select unknown organization");
                    StoreError::NotFound {
                        id: organization_id.to_string(),
                    }
                })?;
                let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
                cache.insert(org.id.clone(), org.clone());
                org
            }
        };

        *self.selected.write().unwrap_or_else(|e| e.into_inner()) =
            Some(organization_id.to_string());
        info!(organization_id = %organization_id, name = %org.name, "Organization selected");
        Ok(org)
    }

    async fn list_organizations(&self) -> Vec<Organization> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        let mut orgs: Vec<Organization> = cache.values().cloned().collect();
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        orgs
    }
}

/// Demo organizations covering each entitlement shape.
pub fn fixture_organizations() -> Vec<Organization> {
    let monthly = |price: Decimal| BillingInfo {
        price,
        currency: "USD".into(),
        cycle: BillingCycle::Monthly,
        next_payment_at: Some(Utc::now() + Duration::days(12)),
    };
    let sub = |id: &str, org: &str, status, product: Product, price| Subscription {
        id: id.into(),
        organization_id: org.into(),
        status,
        product,
        billing: monthly(price),
    };

    let mut northwind = Organization::new("org_northwind", "Northwind Sensors");
    northwind.subscriptions.push(sub(
        "sub_nw_1",
        "org_northwind",
        SubscriptionStatus::Active,
        Product::new("prod_platform").with_type(ProductType::Code(1)),
        dec!(49.00),
    ));

    let mut atlas = Organization::new("org_atlas", "Atlas Grid");
    atlas.subscriptions.push(sub(
        "sub_at_1",
        "org_atlas",
        SubscriptionStatus::Active,
        Product::new("prod_platform_v2").with_type(ProductType::Label("Platform".into())),
        dec!(59.00),
    ));

    let mut harbor = Organization::new("org_harbor", "Harbor Telemetry");
    harbor.subscriptions.push(sub(
        "sub_hb_1",
        "org_harbor",
        SubscriptionStatus::Cancelled,
        Product::new("prod_platform").with_type(ProductType::Code(1)),
        dec!(49.00),
    ));

    let mut legacy = Organization::new("org_legacy", "Legacy Fleet");
    legacy.subscriptions.push(sub(
        "sub_lg_1",
        "org_legacy",
        SubscriptionStatus::Attention,
        Product::new("prod_legacy").with_name("Fleet Platform (legacy)"),
        dec!(29.00),
    ));

    let greenfield = Organization::new("org_greenfield", "Greenfield Labs");

    vec![northwind, atlas, harbor, legacy, greenfield]
}
