//! Organizations, subscriptions and the external services behind them.

pub mod entitlement;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;

pub use entitlement::{PlatformMatch, has_platform, platform_match};
pub use memory::{InMemoryBackend, MemoryOrganizationStore};
pub use model::{Organization, Product, ProductType, Subscription, SubscriptionStatus};
pub use service::{OrganizationService, PaymentService};
pub use store::OrganizationStore;
