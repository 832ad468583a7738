//! Platform entitlement — derived from subscriptions, never stored.

use tracing::trace;

use super::model::{Product, ProductType, Subscription};

/// Numeric product type code of the platform tier.
pub const PLATFORM_TYPE_CODE: i64 = 1;
/// String product type label of the platform tier.
pub const PLATFORM_TYPE_LABEL: &str = "Platform";
/// Case-insensitive substring identifying the platform tier by name.
pub const PLATFORM_NAME_MARKER: &str = "platform";

/// Which representation identified a product as the platform tier.
///
/// Product data arrives with the type as a number, as a string, or only
/// recognisable by name. All three are accepted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformMatch {
    /// `type == 1`
    TypeCode,
    /// `type == "Platform"`
    TypeLabel,
    /// name contains "platform", any case
    NameContains,
}

/// Identify a platform-tier product, checking each representation in turn.
pub fn platform_match(product: &Product) -> Option<PlatformMatch> {
    match &product.product_type {
        Some(ProductType::Code(code)) if *code == PLATFORM_TYPE_CODE => {
            return Some(PlatformMatch::TypeCode);
        }
        Some(ProductType::Label(label)) if label == PLATFORM_TYPE_LABEL => {
            return Some(PlatformMatch::TypeLabel);
        }
        _ => {}
    }

    let name_matches = product
        .name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains(PLATFORM_NAME_MARKER));
    if name_matches {
        return Some(PlatformMatch::NameContains);
    }

    None
}

/// Whether at least one active subscription is for the platform tier.
pub fn has_platform(subscriptions: &[Subscription]) -> bool {
    subscriptions.iter().any(|sub| {
        if !sub.status.is_active() {
            return false;
        }
        match platform_match(&sub.product) {
            Some(how) => {
                trace!(subscription_id = %sub.id, matched_by = ?how, "Platform subscription found");
                true
            }
            None => false,
        }
    })
}
