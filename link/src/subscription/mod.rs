//! Region subscription bookkeeping.

mod registry;

pub use registry::{RegistryAction, SubscriptionRegistry};
