//! State store keys, leader election, and controller timing constants.

/// Key prefix for cluster-scoped TenantQuota objects.
pub const REGISTRY_TENANTS: &str = "/registry/tenantquotas/";

/// Key prefix for namespaces.
pub const REGISTRY_NAMESPACES: &str = "/registry/namespaces/";

/// Key prefix for namespaced ResourceQuota objects.
/// Full keys are `{prefix}{namespace}/{name}`.
pub const REGISTRY_QUOTAS: &str = "/registry/resourcequotas/";

/// etcd-style key for the controller leader lease.
pub const LEADER_LEASE_KEY: &str = "/registry/leases/quotient-controller";

/// How long a leader lease is valid, in seconds.
pub const LEADER_LEASE_TTL_SECS: u64 = 15;

/// The lease is renewed every `TTL / LEADER_RENEW_INTERVAL_DIVISOR` seconds.
pub const LEADER_RENEW_INTERVAL_DIVISOR: u64 = 3;

/// Replay buffer size of the watch event log.
pub const EVENT_LOG_CAPACITY: usize = 1024;

/// Full-resync interval for the tenant controller, in seconds.
/// Every tenant is re-reconciled at least this often regardless of events.
pub const RESYNC_INTERVAL_SECS: u64 = 30;

/// Base delay for reconcile retry backoff, in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 200;

/// Upper bound for reconcile retry backoff, in seconds.
pub const BACKOFF_MAX_SECS: u64 = 30;

/// Admission-time budget for ledger reads, in milliseconds.
/// A read that misses this deadline rejects the write (fail-closed).
pub const ADMISSION_TIMEOUT_MS: u64 = 500;
