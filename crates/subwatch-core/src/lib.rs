// # subwatch-core
//
// Core library for the subdomain monitor.
//
// ## Architecture Overview
//
// This library provides the core functionality for watching root domains:
// - **SubdomainSource**: Trait for passive subdomain discovery
// - **HostValidator**: Trait for dropping names that do not resolve
// - **PortObserver**: Trait for scanning one host for open ports
// - **WorldStateStore**: Trait for persistent per-subdomain state
// - **Notifier**: Trait for delivering change reports
// - **ReconcileEngine**: Diffs candidates against stored state, commits observations
// - **Monitor**: Drives discover → validate → reconcile → summarize → dispatch
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from adapters
// 2. **Idempotency**: Reconciling an unchanged world twice reports nothing
// 3. **Partial Failure**: One bad source, host or write never aborts a pass
// 4. **Library-First**: All core functionality can be used as a library

pub mod aggregator;
pub mod changes;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod hostname;
pub mod model;
pub mod monitor;
pub mod state;
pub mod summary;
pub mod traits;

// Re-export core types for convenience
pub use aggregator::SourceAggregator;
pub use changes::{ChangeSet, NewSubdomain, PortChange};
pub use config::{EngineConfig, MonitorConfig, StoreConfig, WatchConfig, parse_domains};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use engine::ReconcileEngine;
pub use error::{Error, Result};
pub use model::{Observation, ObservedPort, Reachability, ServiceInfo, SubdomainRecord};
pub use monitor::{Monitor, MonitorEvent, PassSummary};
pub use state::{MemoryWorldStore, SqliteWorldStore, open_store};
pub use summary::{Report, summarize};
pub use traits::{HostValidator, Notifier, PortObserver, SubdomainSource, WorldStateStore};
