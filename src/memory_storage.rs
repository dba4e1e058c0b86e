use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    CustomTable, Enrichment, Pagination, Prospect, ProspectChanges, ProspectFilters,
    ProspectInsert, TableRecord,
};
use crate::store::CrmStore;

/// In-process storage used with `STORAGE_BACKEND=memory` and by the tests.
///
/// Behaves like the Postgres store: same ordering, owner scoping, unique
/// table names per owner and cascading deletes.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    prospects: HashMap<Uuid, Prospect>,
    tables: HashMap<Uuid, CustomTable>,
    records: HashMap<Uuid, TableRecord>,
    enrichments: HashMap<i64, Enrichment>,
    next_enrichment_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing timestamps at Postgres' microsecond precision, so
    /// "newest first" is deterministic even for back-to-back inserts.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now()
            .duration_trunc(Duration::microseconds(1))
            .unwrap_or_else(|_| Utc::now());
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn owns_prospect(&self, owner: Uuid, prospect_id: Uuid) -> bool {
        self.prospects
            .get(&prospect_id)
            .is_some_and(|p| p.user_id == owner)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, String)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn paginate<T>(items: Vec<T>, page: Pagination) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn list_prospects(
        &self,
        owner: Uuid,
        filters: &ProspectFilters,
        page: Pagination,
    ) -> Result<(Vec<Prospect>, i64), AppError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<Prospect> = inner
            .prospects
            .values()
            .filter(|p| p.user_id == owner && filters.matches(p))
            .cloned()
            .collect();
        newest_first(&mut matching, |p| (p.created_at, p.id.to_string()));

        let total = matching.len() as i64;
        Ok((paginate(matching, page), total))
    }

    async fn get_prospect(&self, owner: Uuid, id: Uuid) -> Result<Option<Prospect>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .prospects
            .get(&id)
            .filter(|p| p.user_id == owner)
            .cloned())
    }

    async fn get_prospects(&self, owner: Uuid, ids: &[Uuid]) -> Result<Vec<Prospect>, AppError> {
        let inner = self.inner.read().await;
        let mut prospects: Vec<Prospect> = inner
            .prospects
            .values()
            .filter(|p| p.user_id == owner && ids.contains(&p.id))
            .cloned()
            .collect();
        newest_first(&mut prospects, |p| (p.created_at, p.id.to_string()));
        Ok(prospects)
    }

    async fn insert_prospect(
        &self,
        owner: Uuid,
        prospect: &ProspectInsert,
    ) -> Result<Prospect, AppError> {
        let mut inner = self.inner.write().await;
        let now = inner.tick();
        let created = Prospect {
            id: Uuid::new_v4(),
            nom: prospect.nom.clone(),
            telephone: prospect.telephone.clone(),
            adresse: prospect.adresse.clone(),
            site_web: prospect.site_web.clone(),
            email: prospect.email.clone(),
            score_seo: prospect.score_seo,
            message_personnalise: prospect.message_personnalise.clone(),
            user_id: owner,
            created_at: now,
            updated_at: now,
        };
        inner.prospects.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_prospect(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &ProspectChanges,
    ) -> Result<Option<Prospect>, AppError> {
        let mut inner = self.inner.write().await;
        let now = inner.tick();
        let Some(prospect) = inner
            .prospects
            .get_mut(&id)
            .filter(|p| p.user_id == owner)
        else {
            return Ok(None);
        };
        changes.apply_to(prospect);
        prospect.updated_at = now;
        Ok(Some(prospect.clone()))
    }

    async fn delete_prospect(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        if !inner.owns_prospect(owner, id) {
            return Ok(false);
        }
        inner.prospects.remove(&id);
        inner.enrichments.retain(|_, e| e.id_prospect != id);
        Ok(true)
    }

    async fn list_custom_tables(&self, owner: Uuid) -> Result<Vec<CustomTable>, AppError> {
        let inner = self.inner.read().await;
        let mut tables: Vec<CustomTable> = inner
            .tables
            .values()
            .filter(|t| t.user_id == owner)
            .cloned()
            .collect();
        newest_first(&mut tables, |t| (t.created_at, t.id.to_string()));
        Ok(tables)
    }

    async fn find_custom_table(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<CustomTable>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tables
            .values()
            .find(|t| t.user_id == owner && t.name == name)
            .cloned())
    }

    async fn insert_custom_table(
        &self,
        owner: Uuid,
        name: &str,
        schema: &Value,
    ) -> Result<CustomTable, AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .tables
            .values()
            .any(|t| t.user_id == owner && t.name == name)
        {
            return Err(AppError::Conflict(format!("Table '{}' already exists", name)));
        }
        let now = inner.tick();
        let table = CustomTable {
            id: Uuid::new_v4(),
            name: name.to_string(),
            schema: schema.clone(),
            user_id: owner,
            created_at: now,
            updated_at: now,
        };
        inner.tables.insert(table.id, table.clone());
        Ok(table)
    }

    async fn update_custom_table(
        &self,
        owner: Uuid,
        id: Uuid,
        name: Option<&str>,
        schema: Option<&Value>,
    ) -> Result<Option<CustomTable>, AppError> {
        let mut inner = self.inner.write().await;
        if let Some(new_name) = name {
            if inner
                .tables
                .values()
                .any(|t| t.user_id == owner && t.name == new_name && t.id != id)
            {
                return Err(AppError::Conflict(format!(
                    "Table '{}' already exists",
                    new_name
                )));
            }
        }
        let now = inner.tick();
        let Some(table) = inner.tables.get_mut(&id).filter(|t| t.user_id == owner) else {
            return Ok(None);
        };
        if let Some(new_name) = name {
            table.name = new_name.to_string();
        }
        if let Some(new_schema) = schema {
            table.schema = new_schema.clone();
        }
        table.updated_at = now;
        Ok(Some(table.clone()))
    }

    async fn delete_custom_table(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let owned = inner.tables.get(&id).is_some_and(|t| t.user_id == owner);
        if !owned {
            return Ok(false);
        }
        inner.tables.remove(&id);
        inner.records.retain(|_, r| r.table_id != id);
        Ok(true)
    }

    async fn list_records(
        &self,
        table_id: Uuid,
        page: Pagination,
    ) -> Result<(Vec<TableRecord>, i64), AppError> {
        let inner = self.inner.read().await;
        let mut records: Vec<TableRecord> = inner
            .records
            .values()
            .filter(|r| r.table_id == table_id)
            .cloned()
            .collect();
        newest_first(&mut records, |r| (r.created_at, r.id.to_string()));

        let total = records.len() as i64;
        Ok((paginate(records, page), total))
    }

    async fn get_record(&self, table_id: Uuid, id: Uuid) -> Result<Option<TableRecord>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&id)
            .filter(|r| r.table_id == table_id)
            .cloned())
    }

    async fn insert_record(&self, table_id: Uuid, data: &Value) -> Result<TableRecord, AppError> {
        let mut inner = self.inner.write().await;
        let now = inner.tick();
        let record = TableRecord {
            id: Uuid::new_v4(),
            table_id,
            data: data.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn merge_record(
        &self,
        table_id: Uuid,
        id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<Option<TableRecord>, AppError> {
        let mut inner = self.inner.write().await;
        let now = inner.tick();
        let Some(record) = inner.records.get_mut(&id).filter(|r| r.table_id == table_id) else {
            return Ok(None);
        };
        if !record.data.is_object() {
            record.data = Value::Object(Map::new());
        }
        if let Value::Object(ref mut data) = record.data {
            for (key, value) in patch {
                data.insert(key.clone(), value.clone());
            }
        }
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn delete_record(&self, table_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let exists = inner.records.get(&id).is_some_and(|r| r.table_id == table_id);
        if exists {
            inner.records.remove(&id);
        }
        Ok(exists)
    }

    async fn list_enrichments(
        &self,
        owner: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<Vec<Enrichment>, AppError> {
        let inner = self.inner.read().await;
        let mut enrichments: Vec<Enrichment> = inner
            .enrichments
            .values()
            .filter(|e| prospect_ids.contains(&e.id_prospect))
            .filter(|e| inner.owns_prospect(owner, e.id_prospect))
            .cloned()
            .collect();
        enrichments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(enrichments)
    }

    async fn insert_enrichment(
        &self,
        prospect_id: Uuid,
        rapport_markdown: Option<&str>,
        audit_seo: &Value,
    ) -> Result<Enrichment, AppError> {
        let mut inner = self.inner.write().await;
        if !inner.prospects.contains_key(&prospect_id) {
            return Err(AppError::NotFound("Prospect not found".to_string()));
        }
        let now = inner.tick();
        inner.next_enrichment_id += 1;
        let enrichment = Enrichment {
            id: inner.next_enrichment_id,
            id_prospect: prospect_id,
            rapport_markdown: rapport_markdown.map(str::to_string),
            audit_seo: audit_seo.clone(),
            created_at: now,
        };
        inner.enrichments.insert(enrichment.id, enrichment.clone());
        Ok(enrichment)
    }

    async fn update_enrichment(
        &self,
        owner: Uuid,
        id: i64,
        rapport_markdown: Option<Option<&str>>,
        audit_seo: Option<&Value>,
    ) -> Result<Option<Enrichment>, AppError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .enrichments
            .get(&id)
            .is_some_and(|e| inner.owns_prospect(owner, e.id_prospect));
        if !owned {
            return Ok(None);
        }
        let Some(enrichment) = inner.enrichments.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(rapport) = rapport_markdown {
            enrichment.rapport_markdown = rapport.map(str::to_string);
        }
        if let Some(audit) = audit_seo {
            enrichment.audit_seo = audit.clone();
        }
        Ok(Some(enrichment.clone()))
    }

    async fn delete_enrichment(&self, owner: Uuid, id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .enrichments
            .get(&id)
            .is_some_and(|e| inner.owns_prospect(owner, e.id_prospect));
        if owned {
            inner.enrichments.remove(&id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(nom: &str) -> ProspectInsert {
        ProspectInsert {
            nom: nom.to_string(),
            telephone: None,
            adresse: None,
            site_web: None,
            email: None,
            score_seo: None,
            message_personnalise: None,
        }
    }

    #[tokio::test]
    async fn timestamps_are_strictly_increasing() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let a = store.insert_prospect(owner, &insert("a")).await.unwrap();
        let b = store.insert_prospect(owner, &insert("b")).await.unwrap();
        assert!(b.created_at > a.created_at);
    }

    #[tokio::test]
    async fn deleting_a_table_removes_its_records() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let table = store
            .insert_custom_table(owner, "leads", &json!({"fields": []}))
            .await
            .unwrap();
        store.insert_record(table.id, &json!({"a": 1})).await.unwrap();

        assert!(store.delete_custom_table(owner, table.id).await.unwrap());
        let (records, total) = store
            .list_records(table.id, Pagination::default())
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn enrichments_are_owner_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let prospect = store.insert_prospect(owner, &insert("acme")).await.unwrap();
        let enrichment = store
            .insert_enrichment(prospect.id, Some("# Report"), &json!({}))
            .await
            .unwrap();

        let seen = store.list_enrichments(intruder, &[prospect.id]).await.unwrap();
        assert!(seen.is_empty());
        assert!(!store.delete_enrichment(intruder, enrichment.id).await.unwrap());
        assert!(store
            .update_enrichment(intruder, enrichment.id, Some(None), None)
            .await
            .unwrap()
            .is_none());
    }
}
