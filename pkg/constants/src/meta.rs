//! Object metadata markers: labels, finalizer, and write identities.

/// Prefix for all labels, annotations, and finalizers owned by quotient.
pub const META_PREFIX: &str = "quotient.io/";

/// Label on a ResourceQuota naming the TenantQuota that manages it.
/// Once set, only the controller identity may change it.
pub const LABEL_TENANT: &str = "quotient.io/tenant";

/// Standard created-by label key.
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";

/// Value of the created-by label on objects this controller creates.
pub const CREATED_BY: &str = "quotient";

/// Finalizer placed on TenantQuotas so ownership labels are released
/// before the object is removed.
pub const FINALIZER: &str = "quotient.io/finalizer";

/// Field-manager identity for the controller's own writes.
pub const CONTROLLER_IDENTITY: &str = "quotient-controller";

/// Fixed name of the per-namespace ResourceQuota the controller manages.
pub const QUOTA_NAME_DEFAULT: &str = "default";
