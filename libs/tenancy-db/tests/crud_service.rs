#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use anyhow::Result;
use serde_json::json;
use tenancy_db::{DataError, Engine, ValidationError};
use tenancy_query::{Criteria, FindOptions};
use uuid::Uuid;

use common::{Employee, setup};

fn seed_payload(tenant: Uuid, org: Uuid, first: &str) -> serde_json::Value {
    json!({
        "tenant_id": tenant.to_string(),
        "organization_id": org.to_string(),
        "first_name": first,
        "last_name": "Silva",
    })
}

#[tokio::test]
async fn create_then_read_returns_every_supplied_field() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());

        let created = employees
            .create(&json!({
                "tenant_id": tenant.to_string(),
                "organization_id": org.to_string(),
                "first_name": "Ana",
                "last_name": "Silva",
                "email": "ana@example.com",
                "age": 34,
                "active": false,
                "role": "manager",
            }))
            .await?;
        let read = employees.find_one_or_fail(created.id).await?;

        assert_eq!(read, created, "{engine}");
        assert_eq!(read.email.as_deref(), Some("ana@example.com"));
        assert_eq!(read.age, Some(34));
        assert!(!read.active);
        assert_eq!(read.role, "manager");
        assert_eq!(read.created_at, read.updated_at);
        assert!(read.deleted_at.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn column_defaults_apply_when_omitted() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let row = employees
            .create(&seed_payload(Uuid::new_v4(), Uuid::new_v4(), "Ana"))
            .await?;
        assert!(row.active, "{engine}");
        assert_eq!(row.role, "engineer");
        assert!(row.email.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn upsert_by_id_updates_only_supplied_fields() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let original = employees
            .create(&json!({
                "tenant_id": Uuid::new_v4().to_string(),
                "organization_id": Uuid::new_v4().to_string(),
                "first_name": "Ana",
                "last_name": "Silva",
                "age": 34,
            }))
            .await?;

        let upserted = employees
            .create(&json!({"id": original.id.to_string(), "last_name": "Costa"}))
            .await?;

        assert_eq!(upserted.id, original.id);
        assert_eq!(upserted.last_name, "Costa", "{engine}");
        assert_eq!(upserted.first_name, "Ana");
        assert_eq!(upserted.age, Some(34));
        assert_eq!(upserted.created_at, original.created_at);
        assert!(upserted.updated_at >= original.updated_at);
        assert_eq!(employees.count(Criteria::all()).await?, 1);
    }
    Ok(())
}

#[tokio::test]
async fn create_with_an_unknown_id_inserts_it() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    let employees = repos.crud::<Employee>()?;
    let id = Uuid::new_v4();
    let mut payload = seed_payload(Uuid::new_v4(), Uuid::new_v4(), "Ana");
    payload["id"] = json!(id.to_string().to_uppercase());

    let row = employees.create(&payload).await?;
    assert_eq!(row.id, id);
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let row = employees
            .create(&seed_payload(Uuid::new_v4(), Uuid::new_v4(), "Ana"))
            .await?;

        assert!(employees.delete(row.id).await?, "{engine}");
        assert!(!employees.delete(row.id).await?, "{engine}");
        assert!(employees.find_one_or_fail(row.id).await.unwrap_err().is_not_found());
    }
    Ok(())
}

#[tokio::test]
async fn update_returns_the_entity_or_not_found() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let row = employees
            .create(&seed_payload(Uuid::new_v4(), Uuid::new_v4(), "Ana"))
            .await?;

        let updated = employees
            .update(row.id, &json!({"age": 35, "email": "ana@example.com"}))
            .await?;
        assert_eq!(updated.age, Some(35), "{engine}");
        assert_eq!(updated.first_name, "Ana");
        assert_eq!(updated.created_at, row.created_at);

        let err = employees
            .update(Uuid::new_v4(), &json!({"age": 1}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.status(), 404);

        let err = employees
            .update(row.id, &json!({"id": Uuid::new_v4().to_string()}))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
    }
    Ok(())
}

#[tokio::test]
async fn bulk_update_and_delete_report_affected_rows() -> Result<()> {
    let repos = setup(Engine::SeaOrm).await;
    let employees = repos.crud::<Employee>()?;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());
    for name in ["Ana", "Bruno", "Carla"] {
        employees.create(&seed_payload(tenant, org, name)).await?;
    }

    let result = employees
        .update_many(
            Criteria::in_list("first_name", ["Ana", "Bruno"]),
            &json!({"active": false}),
        )
        .await?;
    assert_eq!(result.affected, 2);
    assert_eq!(
        employees.count(Criteria::eq("active", false)).await?,
        2
    );

    let carla = employees
        .find_one_by(Criteria::eq("first_name", "Carla"))
        .await?
        .unwrap();
    assert!(carla.active);
    assert!(
        employees
            .find_one_by(Criteria::eq("first_name", "Zoe"))
            .await?
            .is_none()
    );

    assert_eq!(employees.delete_many(Criteria::eq("active", false)).await?, 2);
    assert_eq!(employees.count(Criteria::all()).await?, 1);
    Ok(())
}

#[tokio::test]
async fn soft_delete_hides_rows_until_restored() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let row = employees
            .create(&seed_payload(Uuid::new_v4(), Uuid::new_v4(), "Ana"))
            .await?;

        assert!(employees.soft_delete(row.id).await?, "{engine}");
        assert!(!employees.soft_delete(row.id).await?);
        assert!(employees.find_one_or_fail(row.id).await.unwrap_err().is_not_found());
        assert_eq!(employees.count(Criteria::all()).await?, 0);

        let all = employees
            .find_all(FindOptions::new().with_deleted())
            .await?;
        assert_eq!(all.total, 1);
        assert!(all.items[0].deleted_at.is_some());

        assert!(employees.restore(row.id).await?);
        assert!(!employees.restore(row.id).await?);
        let back = employees.find_one_or_fail(row.id).await?;
        assert!(back.deleted_at.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn soft_delete_requires_the_option() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    let tags = repos.crud::<common::Tag>()?;
    let err = tags.soft_delete(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DataError::Configuration(_)));
    Ok(())
}

#[tokio::test]
async fn invalid_payloads_never_reach_storage() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.crud::<Employee>()?;
        let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());

        let mut bad_enum = seed_payload(tenant, org, "Ana");
        bad_enum["role"] = json!("intern");
        let err = employees.create(&bad_enum).await.unwrap_err();
        assert!(
            matches!(err, DataError::Validation(ValidationError::Field { ref field, .. }) if field == "role"),
            "{engine}: {err}"
        );

        let mut unknown = seed_payload(tenant, org, "Ana");
        unknown["nickname"] = json!("A");
        let err = employees.create(&unknown).await.unwrap_err();
        assert!(matches!(err, DataError::Validation(ValidationError::Query(_))));

        let mut wrong_type = seed_payload(tenant, org, "Ana");
        wrong_type["age"] = json!("thirty");
        assert_eq!(employees.create(&wrong_type).await.unwrap_err().status(), 400);

        let err = employees.create(&json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, DataError::Validation(ValidationError::Payload(_))));

        assert_eq!(employees.count(Criteria::all()).await?, 0);
    }
    Ok(())
}
