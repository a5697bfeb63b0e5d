//! Prometheus text exposition for tenant quota budgets and aggregates.
//!
//! One gauge family, `quotient_tenantquota{tenant,resource,kind}`, with
//! kind `hard` (the declared budget), `allocated` (sum of per-namespace
//! ceilings), and `used` (sum of observed consumption). Samples are
//! rendered from a fresh tenant list at scrape time rather than kept in
//! a registry, so a scrape always reflects the stored state.

use std::fmt::Write;

use pkg_types::tenant::TenantQuota;

const FAMILY: &str = "quotient_tenantquota";

/// Render the exposition for a set of tenants.
pub fn render(tenants: &[TenantQuota]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# HELP {FAMILY} Tenant quota budget and aggregates per resource."
    );
    let _ = writeln!(out, "# TYPE {FAMILY} gauge");

    for tenant in tenants {
        for (resource, quantity) in &tenant.spec.hard {
            sample(&mut out, &tenant.name, resource, "hard", quantity.to_f64());
        }
        for (resource, usage) in &tenant.status.allocated {
            sample(
                &mut out,
                &tenant.name,
                resource,
                "allocated",
                usage.total.to_f64(),
            );
        }
        for (resource, usage) in &tenant.status.used {
            sample(&mut out, &tenant.name, resource, "used", usage.total.to_f64());
        }
    }

    out
}

// Tenant names and resource keys pass name validation before they are
// stored, so no label-value escaping is needed here.
fn sample(out: &mut String, tenant: &str, resource: &str, kind: &str, value: f64) {
    let _ = writeln!(
        out,
        "{FAMILY}{{tenant=\"{tenant}\",resource=\"{resource}\",kind=\"{kind}\"}} {value}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::tenant::{ResourceUsage, TenantQuotaSpec};

    fn tenant() -> TenantQuota {
        let mut tenant = TenantQuota::new(
            "team-a",
            TenantQuotaSpec {
                hard: [
                    ("limits.cpu".to_string(), "1".parse().unwrap()),
                    ("limits.memory".to_string(), "100Mi".parse().unwrap()),
                ]
                .into(),
                namespace_selector: None,
            },
        );
        tenant.status.allocated.insert(
            "limits.cpu".to_string(),
            ResourceUsage {
                total: "50m".parse().unwrap(),
                namespaces: [("ns1".to_string(), "50m".parse().unwrap())].into(),
            },
        );
        tenant.status.used.insert(
            "limits.cpu".to_string(),
            ResourceUsage {
                total: "20m".parse().unwrap(),
                namespaces: [("ns1".to_string(), "20m".parse().unwrap())].into(),
            },
        );
        tenant
    }

    #[test]
    fn renders_all_three_kinds() {
        let out = render(&[tenant()]);

        assert!(out.starts_with("# HELP quotient_tenantquota"));
        assert!(out.contains("# TYPE quotient_tenantquota gauge\n"));
        assert!(out.contains(
            "quotient_tenantquota{tenant=\"team-a\",resource=\"limits.cpu\",kind=\"hard\"} 1\n"
        ));
        assert!(out.contains(
            "quotient_tenantquota{tenant=\"team-a\",resource=\"limits.memory\",kind=\"hard\"} 104857600\n"
        ));
        assert!(out.contains(
            "quotient_tenantquota{tenant=\"team-a\",resource=\"limits.cpu\",kind=\"allocated\"} 0.05\n"
        ));
        assert!(out.contains(
            "quotient_tenantquota{tenant=\"team-a\",resource=\"limits.cpu\",kind=\"used\"} 0.02\n"
        ));
    }

    #[test]
    fn no_tenants_renders_header_only() {
        let out = render(&[]);
        assert_eq!(out.lines().count(), 2);
    }
}
