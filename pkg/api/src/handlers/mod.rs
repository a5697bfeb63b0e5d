pub mod metrics;
pub mod namespaces;
pub mod probes;
pub mod quotas;
pub mod tenants;
pub mod watch;
