use std::env;
use uuid::Uuid;

use prospect_crm_api::db::Database;
use prospect_crm_api::db_storage::PgStore;
use prospect_crm_api::models::{Pagination, ProspectChanges, ProspectFilters, ProspectInsert};
use prospect_crm_api::store::CrmStore;
use serde_json::json;

/// Integration smoke test for the Postgres store.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn pg_store_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.migrate().await?;
    let store = PgStore::new(db.pool.clone());

    // Random owner so repeated runs never see each other's rows
    let owner = Uuid::new_v4();
    let insert = ProspectInsert {
        nom: "Smoke 100%_test".to_string(),
        telephone: None,
        adresse: Some("Lyon".to_string()),
        site_web: None,
        email: None,
        score_seo: Some(0),
        message_personnalise: None,
    };
    let prospect = store
        .insert_prospect(owner, &insert)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(prospect.user_id, owner);
    assert_eq!(prospect.score_seo, Some(0));

    // LIKE metacharacters in the search term match literally
    let filters = ProspectFilters {
        search: Some("100%_".to_string()),
        ..Default::default()
    };
    let (items, total) = store
        .list_prospects(owner, &filters, Pagination::default())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(total, 1);
    assert_eq!(items[0].id, prospect.id);

    let changes = ProspectChanges {
        adresse: Some(None),
        ..Default::default()
    };
    let updated = store
        .update_prospect(owner, prospect.id, &changes)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("prospect vanished"))?;
    assert_eq!(updated.adresse, None);
    assert!(updated.updated_at >= prospect.updated_at);

    let enrichment = store
        .insert_enrichment(prospect.id, Some("# ok"), &json!({"score": 1}))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(enrichment.id > 0);

    // Another owner sees nothing
    assert!(store
        .get_prospect(Uuid::new_v4(), prospect.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .is_none());

    assert!(store
        .delete_prospect(owner, prospect.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?);
    let remaining = store
        .list_enrichments(owner, &[prospect.id])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(remaining.is_empty());

    Ok(())
}

/// Custom tables: unique name per owner, records cascade with the table.
#[tokio::test]
#[ignore]
async fn pg_custom_tables_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.migrate().await?;
    let store = PgStore::new(db.pool.clone());
    let owner = Uuid::new_v4();
    let schema = json!({"fields": [{"name": "company", "type": "text", "required": true}]});

    let table = store
        .insert_custom_table(owner, "leads", &schema)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let duplicate = store.insert_custom_table(owner, "leads", &schema).await;
    assert_eq!(duplicate.map(|_| ()).unwrap_err().code(), "CONFLICT");

    let record = store
        .insert_record(table.id, &json!({"company": "ACME"}))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let patch = json!({"city": "Lyon"});
    let merged = store
        .merge_record(table.id, record.id, patch.as_object().unwrap())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("record vanished"))?;
    assert_eq!(merged.data, json!({"company": "ACME", "city": "Lyon"}));

    assert!(store
        .delete_custom_table(owner, table.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?);
    assert!(store
        .get_record(table.id, record.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .is_none());

    Ok(())
}
