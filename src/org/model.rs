//! Organization and subscription data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a subscription.
///
/// The status is the only field that decides entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    NonRenewing,
    #[serde(alias = "past_due")]
    Attention,
    Completed,
    Cancelled,
    /// Anything upstream sends that we don't recognise. Never entitles.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::NonRenewing => "non_renewing",
            Self::Attention => "attention",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Product type as delivered by the product catalogue.
///
/// Upstream sends either a numeric code or a string label for the same
/// field, so both shapes are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductType {
    Code(i64),
    Label(String),
}

/// The product a subscription is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductType>,
}

impl Product {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            product_type: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, product_type: ProductType) -> Self {
        self.product_type = Some(product_type);
        self
    }
}

/// How often a subscription bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Annually,
}

impl Default for BillingCycle {
    fn default() -> Self {
        Self::Monthly
    }
}

/// Billing metadata shown on the subscription panels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub price: Decimal,
    pub currency: String,
    pub cycle: BillingCycle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_payment_at: Option<DateTime<Utc>>,
}

/// A subscription attached to exactly one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub organization_id: String,
    pub status: SubscriptionStatus,
    pub product: Product,
    pub billing: BillingInfo,
}

/// An organization as held by the organization store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Whether the current user owns this organization. Organizations in a
    /// user's list are theirs unless the backend says otherwise.
    #[serde(default = "owned_by_default")]
    pub is_owner: bool,
}

fn owned_by_default() -> bool {
    true
}

impl Organization {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subscriptions: Vec::new(),
            is_owner: true,
        }
    }
}
