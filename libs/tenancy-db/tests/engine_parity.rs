#![allow(clippy::unwrap_used, clippy::expect_used, clippy::use_debug)]

mod common;

use anyhow::Result;
use serde_json::{Value, json};
use tenancy_db::{
    AdapterQuery, ColumnType, Engine, RawQuery, Record, Repositories, schema_diff,
};
use tenancy_query::{Criteria, OrderKey};
use uuid::Uuid;

use common::{catalog, memory_handle, setup};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn employee(tenant: Uuid, org: Uuid, first: &str, last: &str) -> Record {
    record(json!({
        "tenant_id": tenant.to_string(),
        "organization_id": org.to_string(),
        "first_name": first,
        "last_name": last,
        "created_at": "2026-01-05T09:00:00Z",
        "updated_at": "2026-01-05T09:00:00Z",
    }))
}

async fn ids(repos: &Repositories, engine: Engine, filter: &Criteria) -> Vec<String> {
    let query = AdapterQuery::new(filter.clone()).order_by(OrderKey::asc("id"));
    repos
        .adapter(engine, "employee")
        .unwrap()
        .find(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r["id"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn bootstrap_through_either_engine_yields_a_clean_diff() -> Result<()> {
    for engine in Engine::ALL {
        let repos = setup(engine).await;
        let diff = schema_diff(&repos).await?;
        assert!(diff.is_clean(), "{engine}: {:?}", diff.mismatches);
        // four entities plus the shared join table
        assert_eq!(diff.tables_checked, 5);
    }
    Ok(())
}

#[tokio::test]
async fn empty_database_reports_missing_tables() -> Result<()> {
    let repos = Repositories::new(memory_handle().await, catalog(), Engine::SeaOrm);
    let diff = schema_diff(&repos).await?;
    assert!(!diff.is_clean());
    let missing: Vec<_> = diff
        .mismatches
        .iter()
        .filter(|m| m.detail == "table does not exist")
        .collect();
    // every table, once per engine
    assert_eq!(missing.len(), 10);
    Ok(())
}

#[tokio::test]
async fn live_drift_is_detected() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    repos
        .active("tag")?
        .raw_query(&RawQuery::new(r#"ALTER TABLE "tag" ADD COLUMN "nickname" TEXT"#))
        .await?;

    let diff = schema_diff(&repos).await?;
    let drift: Vec<_> = diff
        .mismatches
        .iter()
        .filter(|m| m.table == "tag")
        .collect();
    assert_eq!(drift.len(), 2, "{drift:?}");
    for m in drift {
        assert_eq!(m.column.as_deref(), Some("nickname"));
        assert_eq!(m.detail, "column is not declared");
        assert!(m.to_string().starts_with("tag.nickname ["));
    }
    Ok(())
}

#[tokio::test]
async fn rows_written_by_one_engine_read_identically_through_the_other() -> Result<()> {
    let repos = setup(Engine::SeaOrm).await;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());

    for writer in Engine::ALL {
        let mut row = employee(tenant, org, "Ana", writer.as_str());
        row.extend(record(json!({
            "email": format!("ana@{}.example", writer.as_str()),
            "age": 34,
            "salary": 4250.5,
            "active": false,
            "role": "analyst",
            "hired_at": "2024-03-01T08:30:00+01:00",
            "profile": {"languages": ["pt", "en"], "remote": true},
        })));
        let written = repos.adapter(writer, "employee")?.insert(row).await?;
        let id = written["id"].as_str().unwrap().to_owned();

        let read = repos
            .adapter(writer.other(), "employee")?
            .find_one_or_fail(&Criteria::eq("id", id))
            .await?;
        assert_eq!(read, written, "written by {writer}");
        assert_eq!(read["hired_at"], json!("2024-03-01T07:30:00.000000Z"));
        assert_eq!(read["profile"]["languages"], json!(["pt", "en"]));
        assert_eq!(read["active"], json!(false));
        assert_eq!(read["salary"], json!(4250.5));
    }
    Ok(())
}

#[tokio::test]
async fn update_by_id_accepts_the_same_id_in_any_case() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());

    for engine in Engine::ALL {
        let adapter = repos.adapter(engine, "employee")?;
        let written = adapter.insert(employee(tenant, org, "Ana", "Silva")).await?;
        let id = Uuid::parse_str(written["id"].as_str().unwrap())?;

        let patch = record(json!({
            "id": id.to_string().to_uppercase(),
            "last_name": "Costa",
        }));
        let updated = adapter.update_by_id(id, patch).await?.unwrap();
        assert_eq!(updated["last_name"], json!("Costa"), "{engine}");
        assert_eq!(updated["id"], written["id"]);

        let err = adapter
            .update_by_id(id, record(json!({"id": Uuid::new_v4().to_string()})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400, "{engine}");
    }
    Ok(())
}

#[tokio::test]
async fn predicates_select_the_same_rows_on_both_engines() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());
    let people = [
        ("Ana", "Silva", Some(34), Some("ana@example.com")),
        ("Bruno", "Souza", Some(41), None),
        ("Carla", "Costa", None, Some("carla@example.com")),
        ("Davi", "silveira", Some(29), None),
        ("Eva", "O'Brien", Some(55), Some("eva@example.com")),
    ];
    let adapter = repos.active("employee")?;
    for (first, last, age, email) in people {
        let mut row = employee(tenant, org, first, last);
        row.insert("age".into(), json!(age));
        row.insert("email".into(), json!(email));
        adapter.insert(row).await?;
    }

    let cases = [
        (Criteria::all(), 5),
        (Criteria::none(), 0),
        (Criteria::in_list("first_name", Vec::<String>::new()), 0),
        (Criteria::in_list("first_name", ["Ana", "Eva", "Zoe"]), 2),
        (Criteria::is_null("email"), 2),
        (Criteria::is_not_null("age"), 4),
        (Criteria::eq("last_name", "O'Brien"), 1),
        (Criteria::ne("last_name", "Silva"), 4),
        (Criteria::between("age", 30, 45), 2),
        (Criteria::gt("age", 34).or(Criteria::is_null("age")), 3),
        (Criteria::le("age", 34).not(), 2),
        (Criteria::like("email", "%@example.com"), 3),
        (Criteria::like("last_name", "S%"), 3),
        (Criteria::in_list("first_name", Vec::<String>::new()).not(), 5),
    ];
    for (filter, expected) in &cases {
        let sea = ids(&repos, Engine::SeaOrm, filter).await;
        let sqlx = ids(&repos, Engine::Sqlx, filter).await;
        assert_eq!(sea, sqlx, "{filter:?}");
        assert_eq!(sea.len(), *expected, "{filter:?}");
    }
    Ok(())
}

#[tokio::test]
async fn ordering_and_windows_agree() -> Result<()> {
    let repos = setup(Engine::SeaOrm).await;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());
    let adapter = repos.active("employee")?;
    for (i, last) in ["Silva", "Costa", "Silva", "Abreu", "Costa", "Silva"]
        .into_iter()
        .enumerate()
    {
        let mut row = employee(tenant, org, &format!("p{i}"), last);
        row.insert("age".into(), json!(i));
        adapter.insert(row).await?;
    }

    let query = AdapterQuery::new(Criteria::all())
        .order_by(OrderKey::desc("last_name"))
        .order_by(OrderKey::asc("age"))
        .offset(1)
        .limit(3);
    let mut results = Vec::new();
    for engine in Engine::ALL {
        let rows = repos.adapter(engine, "employee")?.find(&query).await?;
        let names: Vec<String> = rows
            .iter()
            .map(|r| r["first_name"].as_str().unwrap().to_owned())
            .collect();
        results.push(names);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], ["p2", "p5", "p1"]);
    Ok(())
}

#[tokio::test]
async fn raw_queries_bind_and_decode_the_same_way() -> Result<()> {
    let repos = setup(Engine::Sqlx).await;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());
    let adapter = repos.active("employee")?;
    for (first, age) in [("Ana", 34), ("Bruno", 41), ("Carla", 29)] {
        let mut row = employee(tenant, org, first, "Silva");
        row.insert("age".into(), json!(age));
        row.insert("active".into(), json!(age > 30));
        adapter.insert(row).await?;
    }

    let query = RawQuery::new(
        r#"SELECT "first_name", "age", "active" FROM "employee"
           WHERE "tenant_id" = ? AND "age" >= ? ORDER BY "age" DESC"#,
    )
    .bind(tenant.to_string())
    .bind(30)
    .column("first_name", ColumnType::String)
    .column("age", ColumnType::Integer)
    .column("active", ColumnType::Boolean);

    let sea = repos.adapter(Engine::SeaOrm, "employee")?.raw_query(&query).await?;
    let sqlx = repos.adapter(Engine::Sqlx, "employee")?.raw_query(&query).await?;
    assert_eq!(sea, sqlx);
    assert_eq!(
        Value::Array(sea.into_iter().map(Value::Object).collect()),
        json!([
            {"first_name": "Bruno", "age": 41, "active": true},
            {"first_name": "Ana", "age": 34, "active": true},
        ])
    );
    Ok(())
}

#[tokio::test]
async fn link_and_unlink_agree_across_engines() -> Result<()> {
    let repos = setup(Engine::SeaOrm).await;
    let (tenant, org) = (Uuid::new_v4(), Uuid::new_v4());
    let ana = repos
        .active("employee")?
        .insert(employee(tenant, org, "Ana", "Silva"))
        .await?;
    let ana_id = Uuid::parse_str(ana["id"].as_str().unwrap())?;
    let mut tags = Vec::new();
    for label in ["remote", "onsite", "mentor"] {
        let tag = repos
            .active("tag")?
            .insert(record(json!({
                "tenant_id": tenant.to_string(),
                "label": label,
                "created_at": "2026-01-05T09:00:00Z",
                "updated_at": "2026-01-05T09:00:00Z",
            })))
            .await?;
        tags.push(Uuid::parse_str(tag["id"].as_str().unwrap())?);
    }

    let sea = repos.adapter(Engine::SeaOrm, "employee")?;
    let sqlx = repos.adapter(Engine::Sqlx, "employee")?;
    assert_eq!(sea.link("tags", ana_id, &tags[..2], None).await?, 2);
    // duplicates are skipped
    assert_eq!(sqlx.link("tags", ana_id, &tags, None).await?, 1);
    assert_eq!(sqlx.unlink("tags", ana_id, &tags[1..], None).await?, 2);
    assert_eq!(sea.unlink("tags", ana_id, &tags[1..], None).await?, 0);

    let query = AdapterQuery::new(Criteria::all()).relation("tags");
    for adapter in [&sea, &sqlx] {
        let rows = adapter.find(&query).await?;
        let linked = rows[0]["tags"].as_array().unwrap();
        assert_eq!(linked.len(), 1, "{}", adapter.engine());
        assert_eq!(linked[0]["label"], json!("remote"));
    }

    let err = sea.link("department", ana_id, &tags, None).await.unwrap_err();
    assert_eq!(err.status(), 400);
    let err = sqlx
        .link("tags", ana_id, &[Uuid::new_v4()], None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}
