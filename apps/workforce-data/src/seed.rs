//! Demo data for one tenant and organization.
//!
//! Rows get name-derived v5 ids under the organization id, so seeding twice
//! upserts the same rows instead of duplicating them.

use serde_json::json;
use tenancy_db::{Repositories, Result};
use tracing::info;
use uuid::Uuid;

use crate::workforce::{Department, Employee, Organization, Tag};

const DEPARTMENTS: [(&str, &str); 3] = [
    ("Engineering", "CC-100"),
    ("Sales", "CC-200"),
    ("People", "CC-300"),
];

const TAGS: [&str; 4] = ["remote", "onsite", "mentor", "on-call"];

struct Hire {
    first: &'static str,
    last: &'static str,
    role: &'static str,
    department: usize,
    salary: f64,
    tags: &'static [usize],
}

#[rustfmt::skip]
const HIRES: [Hire; 6] = [
    Hire { first: "Ana", last: "Silva", role: "manager", department: 0, salary: 7200.0, tags: &[0, 2] },
    Hire { first: "Bruno", last: "Souza", role: "engineer", department: 0, salary: 5100.0, tags: &[0, 3] },
    Hire { first: "Carla", last: "Costa", role: "engineer", department: 0, salary: 5350.0, tags: &[1] },
    Hire { first: "Davi", last: "Lima", role: "analyst", department: 1, salary: 4300.0, tags: &[1] },
    Hire { first: "Eva", last: "Rocha", role: "manager", department: 1, salary: 6900.0, tags: &[2] },
    Hire { first: "Fabio", last: "Nunes", role: "recruiter", department: 2, salary: 4100.0, tags: &[] },
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub departments: usize,
    pub employees: usize,
    pub tags: usize,
    /// Links created by this run; zero when re-seeding.
    pub new_links: u64,
}

fn stable_id(organization: Uuid, kind: &str, key: &str) -> Uuid {
    Uuid::new_v5(&organization, format!("{kind}:{key}").as_bytes())
}

/// Upsert the demo rows inside one transaction on the active engine.
///
/// Tenant and organization ids go into each payload explicitly through the
/// generic CRUD service; there is no request context here.
///
/// # Errors
/// The first failing write; everything written so far is rolled back.
pub async fn seed(repos: &Repositories, tenant: Uuid, organization: Uuid) -> Result<SeedReport> {
    let report = repos
        .with_transaction(|tx| {
            Box::pin(async move {
                let slug = format!("org-{}", organization.simple());
                let org = tx
                    .crud::<Organization>()?
                    .create(&json!({
                        "id": organization,
                        "tenant_id": tenant,
                        "name": "Demo Organization",
                        "slug": slug,
                    }))
                    .await?;

                let departments = tx.crud::<Department>()?;
                let mut department_ids = Vec::with_capacity(DEPARTMENTS.len());
                for (name, cost_center) in DEPARTMENTS {
                    let row = departments
                        .create(&json!({
                            "id": stable_id(organization, "department", name),
                            "tenant_id": tenant,
                            "organization_id": org.id,
                            "name": name,
                            "cost_center": cost_center,
                        }))
                        .await?;
                    department_ids.push(row.id);
                }

                let tags = tx.crud::<Tag>()?;
                let mut tag_ids = Vec::with_capacity(TAGS.len());
                for label in TAGS {
                    let row = tags
                        .create(&json!({
                            "id": stable_id(organization, "tag", label),
                            "tenant_id": tenant,
                            "label": label,
                        }))
                        .await?;
                    tag_ids.push(row.id);
                }

                let employees = tx.crud::<Employee>()?;
                let mut report = SeedReport {
                    departments: department_ids.len(),
                    tags: tag_ids.len(),
                    ..SeedReport::default()
                };
                for hire in &HIRES {
                    let email = format!(
                        "{}.{}@{slug}.example",
                        hire.first.to_lowercase(),
                        hire.last.to_lowercase()
                    );
                    let row = employees
                        .create(&json!({
                            "id": stable_id(organization, "employee", &email),
                            "tenant_id": tenant,
                            "organization_id": org.id,
                            "first_name": hire.first,
                            "last_name": hire.last,
                            "email": email,
                            "role": hire.role,
                            "salary": hire.salary,
                            "department_id": department_ids[hire.department],
                            "profile": {"seeded": true},
                        }))
                        .await?;
                    let linked: Vec<Uuid> = hire.tags.iter().map(|&i| tag_ids[i]).collect();
                    report.new_links += employees.link(row.id, "tags", &linked).await?;
                    report.employees += 1;
                }
                Ok(report)
            })
        })
        .await?;

    info!(
        %tenant,
        %organization,
        employees = report.employees,
        new_links = report.new_links,
        "seed complete"
    );
    Ok(report)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tenancy_db::{ConnectOpts, DbHandle, Engine, bootstrap_schema};
    use tenancy_query::Criteria;

    async fn repos(engine: Engine) -> Repositories {
        let handle = DbHandle::connect("sqlite::memory:", ConnectOpts::default())
            .await
            .unwrap();
        let repos = Repositories::new(handle, crate::workforce::catalog().unwrap(), engine);
        bootstrap_schema(&repos, engine).await.unwrap();
        repos
    }

    #[tokio::test]
    async fn test_seed_is_repeatable() {
        for engine in Engine::ALL {
            let repos = repos(engine).await;
            let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());

            let first = seed(&repos, tenant, org).await.unwrap();
            assert_eq!(first.employees, HIRES.len());
            assert_eq!(first.new_links, 7);

            let again = seed(&repos, tenant, org).await.unwrap();
            assert_eq!(again.new_links, 0, "{engine}");
            let employees = repos.crud::<Employee>().unwrap();
            assert_eq!(
                employees.count(Criteria::all()).await.unwrap(),
                HIRES.len() as u64
            );
        }
    }

    #[test]
    fn test_stable_ids() {
        let org = Uuid::new_v4();
        assert_eq!(
            stable_id(org, "tag", "remote"),
            stable_id(org, "tag", "remote")
        );
        assert_ne!(
            stable_id(org, "tag", "remote"),
            stable_id(Uuid::new_v4(), "tag", "remote")
        );
    }
}
