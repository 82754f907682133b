pub mod kms;
pub mod queue;
pub mod registry;

pub use kms::LocalKeyManagement;
pub use queue::{DeadLetter, InMemoryDeliveryQueue};
pub use registry::InMemorySubscriptionRegistry;
