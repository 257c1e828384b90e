#![allow(clippy::unwrap_used, clippy::expect_used, clippy::use_debug)]

mod common;

use anyhow::Result;
use serde_json::json;
use tenancy_db::{DataError, Engine, ValidationError};
use tenancy_query::{Criteria, FindOptions, PaginationParams};
use uuid::Uuid;

use common::{Department, Employee, Tag, ctx, setup, tenant_ctx};

#[tokio::test]
async fn many_to_one_loads_the_referenced_row() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let caller = ctx(Uuid::new_v4(), Uuid::new_v4());
        let departments = repos.tenant_crud::<Department>()?;
        let employees = repos.tenant_crud::<Employee>()?;

        let sales = departments.create(&caller, &json!({"name": "Sales"})).await?;
        employees
            .create(
                &caller,
                &json!({"first_name": "Ana", "last_name": "Silva", "department_id": sales.id.to_string()}),
            )
            .await?;
        employees
            .create(&caller, &json!({"first_name": "Bruno", "last_name": "Souza"}))
            .await?;

        let page = employees
            .find_all(
                &caller,
                FindOptions::new()
                    .relation("department")
                    .order_by(tenancy_query::OrderKey::asc("first_name")),
            )
            .await?;
        assert_eq!(page.items.len(), 2);
        let ana = &page.items[0];
        assert_eq!(ana.department.as_ref().map(|d| d.name.as_str()), Some("Sales"), "{engine}");
        assert!(page.items[1].department.is_none());

        // not requested, not loaded
        let plain = employees.find_one_or_fail(&caller, ana.id).await?;
        assert!(plain.department.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn one_to_many_skips_deleted_and_foreign_rows() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());
        let caller = ctx(tenant, org);
        let departments = repos.tenant_crud::<Department>()?;
        let employees = repos.tenant_crud::<Employee>()?;

        let sales = departments.create(&caller, &json!({"name": "Sales"})).await?;
        let dept = sales.id.to_string();
        for first in ["Ana", "Bruno", "Carla"] {
            employees
                .create(
                    &caller,
                    &json!({"first_name": first, "last_name": "Silva", "department_id": dept}),
                )
                .await?;
        }
        let carla = employees
            .find_one_by(&caller, Criteria::eq("first_name", "Carla"))
            .await?
            .unwrap();
        assert!(employees.soft_delete(&caller, carla.id).await?);

        // a row from another tenant pointing at the same department
        repos
            .crud::<Employee>()?
            .create(&json!({
                "tenant_id": Uuid::new_v4().to_string(),
                "organization_id": Uuid::new_v4().to_string(),
                "first_name": "Intruder",
                "last_name": "X",
                "department_id": dept,
            }))
            .await?;

        let params = PaginationParams::new().relation("employees").page(1, 10);
        let page = departments.paginate(&caller, &params).await?;
        let staff: Vec<&str> = page.items[0]
            .employees
            .as_deref()
            .unwrap()
            .iter()
            .map(|e| e.first_name.as_str())
            .collect();
        assert_eq!(staff.len(), 2, "{engine}: {staff:?}");
        assert!(staff.contains(&"Ana") && staff.contains(&"Bruno"));
    }
    Ok(())
}

#[tokio::test]
async fn many_to_many_follows_links_from_both_sides() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let tenant = Uuid::new_v4();
        let caller = ctx(tenant, Uuid::new_v4());
        let employees = repos.tenant_crud::<Employee>()?;
        let tags = repos.tenant_crud::<Tag>()?;

        let ana = employees
            .create(&caller, &json!({"first_name": "Ana", "last_name": "Silva"}))
            .await?;
        let bruno = employees
            .create(&caller, &json!({"first_name": "Bruno", "last_name": "Souza"}))
            .await?;
        let remote = tags.create(&caller, &json!({"label": "remote"})).await?;
        let mentor = tags.create(&caller, &json!({"label": "mentor"})).await?;

        assert_eq!(employees.link(&caller, ana.id, "tags", &[remote.id, mentor.id]).await?, 2);
        assert_eq!(employees.link(&caller, bruno.id, "tags", &[remote.id]).await?, 1);

        let ana = employees
            .find_all(
                &caller,
                FindOptions::new()
                    .filter(Criteria::eq("id", ana.id.to_string()))
                    .relation("tags"),
            )
            .await?
            .items
            .remove(0);
        let mut labels: Vec<String> = ana.tags.unwrap().into_iter().map(|t| t.label).collect();
        labels.sort();
        assert_eq!(labels, ["mentor", "remote"], "{engine}");

        let remote_page = repos
            .crud::<Tag>()?
            .adapter()
            .find(
                &tenancy_db::AdapterQuery::new(Criteria::eq("id", remote.id.to_string()))
                    .relation("employees"),
            )
            .await?;
        assert_eq!(remote_page[0]["employees"].as_array().unwrap().len(), 2);

        assert_eq!(employees.unlink(&caller, ana.id, "tags", &[mentor.id]).await?, 1);
        let reloaded = employees
            .find_all(
                &caller,
                FindOptions::new()
                    .filter(Criteria::eq("first_name", "Ana"))
                    .relation("tags"),
            )
            .await?
            .items
            .remove(0);
        let left: Vec<String> = reloaded.tags.unwrap().into_iter().map(|t| t.label).collect();
        assert_eq!(left, ["remote"]);
    }
    Ok(())
}

#[tokio::test]
async fn links_never_cross_tenants() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let mine = ctx(Uuid::new_v4(), Uuid::new_v4());
        let theirs = tenant_ctx(Uuid::new_v4());
        let employees = repos.tenant_crud::<Employee>()?;
        let tags = repos.tenant_crud::<Tag>()?;

        let ana = employees
            .create(&mine, &json!({"first_name": "Ana", "last_name": "Silva"}))
            .await?;
        let own = tags.create(&mine, &json!({"label": "remote"})).await?;
        let foreign = tags.create(&theirs, &json!({"label": "secret"})).await?;

        let err = employees
            .link(&mine, ana.id, "tags", &[own.id, foreign.id])
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{engine}: {err}");

        let err = employees
            .link(&theirs, ana.id, "tags", &[foreign.id])
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{engine}: {err}");

        // nothing was linked by the rejected call
        let ana = employees
            .find_all(&mine, FindOptions::new().relation("tags"))
            .await?
            .items
            .remove(0);
        assert_eq!(ana.tags.as_deref().map(<[Tag]>::len), Some(0));
    }
    Ok(())
}

#[tokio::test]
async fn eager_loaded_rows_are_scoped_to_the_caller() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    let (tenant, north, south) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let tags = repos.tenant_crud::<Tag>()?;
    let employees = repos.tenant_crud::<Employee>()?;

    let remote = tags.create(&tenant_ctx(tenant), &json!({"label": "remote"})).await?;
    for (org, first) in [(north, "Ana"), (south, "Bruno")] {
        let row = employees
            .create(&ctx(tenant, org), &json!({"first_name": first, "last_name": "Silva"}))
            .await?;
        employees.link(&ctx(tenant, org), row.id, "tags", &[remote.id]).await?;
    }

    // tag is tenant wide; its employees are filtered by the caller's organization
    let rows = tags
        .unscoped()
        .adapter()
        .find(
            &tenancy_db::AdapterQuery::new(Criteria::all())
                .relation("employees")
                .scope(ctx(tenant, north).scope()?),
        )
        .await?;
    let linked = rows[0]["employees"].as_array().unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0]["first_name"], json!("Ana"));
    Ok(())
}

#[tokio::test]
async fn unknown_relations_are_rejected() -> Result<()> {
    let repos = setup(Engine::SeaOrm).await;
    let caller = ctx(Uuid::new_v4(), Uuid::new_v4());
    let employees = repos.tenant_crud::<Employee>()?;

    let err = employees
        .find_all(&caller, FindOptions::new().relation("manager"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DataError::Validation(ValidationError::Query(tenancy_query::Error::UnknownRelation { .. }))
    ));

    let err = employees
        .link(&caller, Uuid::new_v4(), "department", &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);
    Ok(())
}

#[tokio::test]
async fn wide_fan_out_is_loaded_in_batches() -> Result<()> {
    const WIDE: usize = 1200;
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let caller = ctx(Uuid::new_v4(), Uuid::new_v4());
        let employees = repos.tenant_crud::<Employee>()?;
        let tags = repos.tenant_crud::<Tag>()?;

        let ana = employees
            .create(&caller, &json!({"first_name": "Ana", "last_name": "Silva"}))
            .await?;
        let mut ids = Vec::with_capacity(WIDE);
        for n in 0..WIDE {
            let tag = tags.create(&caller, &json!({"label": format!("skill-{n:04}")})).await?;
            ids.push(tag.id);
        }
        assert_eq!(employees.link(&caller, ana.id, "tags", &ids).await?, WIDE as u64);

        let loaded = employees
            .find_all(&caller, FindOptions::new().relation("tags"))
            .await?
            .items
            .remove(0);
        let loaded: Vec<Uuid> = loaded.tags.unwrap().into_iter().map(|t| t.id).collect();
        let mut expected = ids.clone();
        expected.sort_by_key(ToString::to_string);
        assert_eq!(loaded, expected, "{engine}");

        let rows = tags
            .unscoped()
            .adapter()
            .find(&tenancy_db::AdapterQuery::new(Criteria::all()).relation("employees"))
            .await?;
        assert_eq!(rows.len(), WIDE);
        assert!(rows.iter().all(|r| r["employees"].as_array().unwrap().len() == 1));

        assert_eq!(employees.unlink(&caller, ana.id, "tags", &ids).await?, WIDE as u64);
    }
    Ok(())
}
