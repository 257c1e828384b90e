#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use anyhow::Result;
use serde_json::json;
use tenancy_db::{ConstraintKind, DataError, Engine};
use tenancy_query::Criteria;
use uuid::Uuid;

use common::{Country, Department, Employee, ctx, setup};

#[tokio::test]
async fn unique_violation_names_the_index_on_both_engines() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.tenant_crud::<Employee>()?;
        let caller = ctx(Uuid::new_v4(), Uuid::new_v4());
        let payload = json!({"first_name": "Ana", "last_name": "Silva", "email": "ana@example.com"});

        employees.create(&caller, &payload).await?;
        let err = employees.create(&caller, &payload).await.unwrap_err();
        match &err {
            DataError::ConstraintViolation { kind, constraint } => {
                assert_eq!(*kind, ConstraintKind::Unique, "{engine}");
                assert_eq!(constraint, "uq_employee_email", "{engine}");
            }
            other => panic!("{engine}: unexpected {other}"),
        }
        assert_eq!(err.status(), 409);
        assert!(!err.is_retryable());

        // same email in another tenant is fine
        employees
            .create(&ctx(Uuid::new_v4(), Uuid::new_v4()), &payload)
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn global_unique_index_is_reported_by_name() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let countries = repos.crud::<Country>()?;
        countries.create(&json!({"code": "PT", "name": "Portugal"})).await?;
        let err = countries
            .create(&json!({"code": "PT", "name": "Portugal again"}))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, DataError::ConstraintViolation { constraint, .. } if constraint == "uq_country_code"),
            "{engine}: {err}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn foreign_key_violation_is_normalized() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.tenant_crud::<Employee>()?;
        let err = employees
            .create(
                &ctx(Uuid::new_v4(), Uuid::new_v4()),
                &json!({
                    "first_name": "Ana",
                    "last_name": "Silva",
                    "department_id": Uuid::new_v4().to_string(),
                }),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(
                &err,
                DataError::ConstraintViolation { kind: ConstraintKind::ForeignKey, constraint }
                    if constraint == "fk_employee_department_id"
            ),
            "{engine}: {err}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn missing_required_column_is_a_not_null_violation() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let employees = repos.tenant_crud::<Employee>()?;
        let err = employees
            .create(&ctx(Uuid::new_v4(), Uuid::new_v4()), &json!({"first_name": "Ana"}))
            .await
            .unwrap_err();
        assert!(
            matches!(
                &err,
                DataError::ConstraintViolation { kind: ConstraintKind::NotNull, constraint }
                    if constraint.contains("last_name")
            ),
            "{engine}: {err}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn deleting_a_department_sets_employee_reference_to_null() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let caller = ctx(Uuid::new_v4(), Uuid::new_v4());
        let departments = repos.tenant_crud::<Department>()?;
        let employees = repos.tenant_crud::<Employee>()?;

        let sales = departments.create(&caller, &json!({"name": "Sales"})).await?;
        let ana = employees
            .create(
                &caller,
                &json!({"first_name": "Ana", "last_name": "Silva", "department_id": sales.id.to_string()}),
            )
            .await?;
        assert_eq!(ana.department_id, Some(sales.id));

        assert!(departments.delete(&caller, sales.id).await?);
        let ana = employees.find_one_or_fail(&caller, ana.id).await?;
        assert_eq!(ana.department_id, None, "{engine}");
        assert_eq!(
            employees
                .count(&caller, Criteria::is_null("department_id"))
                .await?,
            1
        );
    }
    Ok(())
}
