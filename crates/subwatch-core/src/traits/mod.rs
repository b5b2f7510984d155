//! Core traits for the subwatch system
//!
//! This module defines the abstract interfaces that all collaborators implement.
//!
//! - [`SubdomainSource`]: Discover candidate hostnames for a root domain
//! - [`HostValidator`]: Keep only hostnames that resolve in DNS
//! - [`PortObserver`]: Scan one host for open ports and services
//! - [`WorldStateStore`]: Durable per-(domain, subdomain) state
//! - [`Notifier`]: Deliver a change report to a channel

pub mod notifier;
pub mod observer;
pub mod source;
pub mod store;
pub mod validator;

pub use notifier::Notifier;
pub use observer::PortObserver;
pub use source::SubdomainSource;
pub use store::WorldStateStore;
pub use validator::HostValidator;
