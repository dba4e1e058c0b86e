use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    CustomTable, Enrichment, Pagination, Prospect, ProspectChanges, ProspectFilters,
    ProspectInsert, TableRecord,
};
use crate::store::CrmStore;

const PROSPECT_COLUMNS: &str = "id, nom, telephone, adresse, site_web, email, score_seo, \
     message_personnalise, user_id, created_at, updated_at";
const TABLE_COLUMNS: &str = "id, name, schema, user_id, created_at, updated_at";
const RECORD_COLUMNS: &str = "id, table_id, data, created_at, updated_at";

/// Postgres-backed storage for prospects, custom tables and enrichments.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escapes `LIKE` metacharacters so user input is matched literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Appends the owner scope and list filters shared by the page and count
/// queries.
fn push_prospect_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    owner: Uuid,
    filters: &ProspectFilters,
) {
    builder.push(" WHERE user_id = ").push_bind(owner);

    if let Some(ref search) = filters.search {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (nom ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR telephone ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR adresse ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR site_web ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min) = filters.min_score {
        builder.push(" AND score_seo >= ").push_bind(min);
    }
    if let Some(max) = filters.max_score {
        builder.push(" AND score_seo <= ").push_bind(max);
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn list_prospects(
        &self,
        owner: Uuid,
        filters: &ProspectFilters,
        page: Pagination,
    ) -> Result<(Vec<Prospect>, i64), AppError> {
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM prospects",
            PROSPECT_COLUMNS
        ));
        push_prospect_filters(&mut select, owner, filters);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let items = select
            .build_query_as::<Prospect>()
            .fetch_all(&self.pool)
            .await
            .context("listing prospects")?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM prospects");
        push_prospect_filters(&mut count, owner, filters);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("counting prospects")?;

        Ok((items, total))
    }

    async fn get_prospect(&self, owner: Uuid, id: Uuid) -> Result<Option<Prospect>, AppError> {
        let prospect = sqlx::query_as::<_, Prospect>(&format!(
            "SELECT {} FROM prospects WHERE user_id = $1 AND id = $2",
            PROSPECT_COLUMNS
        ))
        .bind(owner)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching prospect")?;

        Ok(prospect)
    }

    async fn get_prospects(&self, owner: Uuid, ids: &[Uuid]) -> Result<Vec<Prospect>, AppError> {
        let prospects = sqlx::query_as::<_, Prospect>(&format!(
            "SELECT {} FROM prospects WHERE user_id = $1 AND id = ANY($2) \
             ORDER BY created_at DESC, id DESC",
            PROSPECT_COLUMNS
        ))
        .bind(owner)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("fetching prospects by id")?;

        Ok(prospects)
    }

    async fn insert_prospect(
        &self,
        owner: Uuid,
        prospect: &ProspectInsert,
    ) -> Result<Prospect, AppError> {
        let created = sqlx::query_as::<_, Prospect>(&format!(
            r#"
            INSERT INTO prospects (
                nom, telephone, adresse, site_web, email, score_seo,
                message_personnalise, user_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
            RETURNING {}
            "#,
            PROSPECT_COLUMNS
        ))
        .bind(&prospect.nom)
        .bind(&prospect.telephone)
        .bind(&prospect.adresse)
        .bind(&prospect.site_web)
        .bind(&prospect.email)
        .bind(prospect.score_seo)
        .bind(&prospect.message_personnalise)
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .context("inserting prospect")?;

        Ok(created)
    }

    async fn update_prospect(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &ProspectChanges,
    ) -> Result<Option<Prospect>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE prospects SET updated_at = now()");

        if let Some(ref nom) = changes.nom {
            builder.push(", nom = ").push_bind(nom.clone());
        }
        if let Some(ref telephone) = changes.telephone {
            builder.push(", telephone = ").push_bind(telephone.clone());
        }
        if let Some(ref adresse) = changes.adresse {
            builder.push(", adresse = ").push_bind(adresse.clone());
        }
        if let Some(ref site_web) = changes.site_web {
            builder.push(", site_web = ").push_bind(site_web.clone());
        }
        if let Some(ref email) = changes.email {
            builder.push(", email = ").push_bind(email.clone());
        }
        if let Some(score_seo) = changes.score_seo {
            builder.push(", score_seo = ").push_bind(score_seo);
        }
        if let Some(ref message) = changes.message_personnalise {
            builder.push(", message_personnalise = ").push_bind(message.clone());
        }

        builder
            .push(" WHERE user_id = ")
            .push_bind(owner)
            .push(" AND id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(PROSPECT_COLUMNS);

        let updated = builder
            .build_query_as::<Prospect>()
            .fetch_optional(&self.pool)
            .await
            .context("updating prospect")?;

        Ok(updated)
    }

    async fn delete_prospect(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM prospects WHERE user_id = $1 AND id = $2")
            .bind(owner)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting prospect")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_custom_tables(&self, owner: Uuid) -> Result<Vec<CustomTable>, AppError> {
        let tables = sqlx::query_as::<_, CustomTable>(&format!(
            "SELECT {} FROM custom_tables WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            TABLE_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("listing custom tables")?;

        Ok(tables)
    }

    async fn find_custom_table(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<CustomTable>, AppError> {
        let table = sqlx::query_as::<_, CustomTable>(&format!(
            "SELECT {} FROM custom_tables WHERE user_id = $1 AND name = $2",
            TABLE_COLUMNS
        ))
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("fetching custom table")?;

        Ok(table)
    }

    async fn insert_custom_table(
        &self,
        owner: Uuid,
        name: &str,
        schema: &Value,
    ) -> Result<CustomTable, AppError> {
        sqlx::query_as::<_, CustomTable>(&format!(
            r#"
            INSERT INTO custom_tables (name, schema, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            RETURNING {}
            "#,
            TABLE_COLUMNS
        ))
        .bind(name)
        .bind(schema)
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Table '{}' already exists", name)),
            other => other,
        })
    }

    async fn update_custom_table(
        &self,
        owner: Uuid,
        id: Uuid,
        name: Option<&str>,
        schema: Option<&Value>,
    ) -> Result<Option<CustomTable>, AppError> {
        sqlx::query_as::<_, CustomTable>(&format!(
            r#"
            UPDATE custom_tables
            SET name = COALESCE($3, name),
                schema = COALESCE($4, schema),
                updated_at = now()
            WHERE user_id = $1 AND id = $2
            RETURNING {}
            "#,
            TABLE_COLUMNS
        ))
        .bind(owner)
        .bind(id)
        .bind(name)
        .bind(schema)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!(
                "Table '{}' already exists",
                name.unwrap_or_default()
            )),
            other => other,
        })
    }

    async fn delete_custom_table(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        // Records go with the table (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM custom_tables WHERE user_id = $1 AND id = $2")
            .bind(owner)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting custom table")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_records(
        &self,
        table_id: Uuid,
        page: Pagination,
    ) -> Result<(Vec<TableRecord>, i64), AppError> {
        let records = sqlx::query_as::<_, TableRecord>(&format!(
            "SELECT {} FROM custom_table_records WHERE table_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            RECORD_COLUMNS
        ))
        .bind(table_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .context("listing table records")?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM custom_table_records WHERE table_id = $1")
                .bind(table_id)
                .fetch_one(&self.pool)
                .await
                .context("counting table records")?;

        Ok((records, total))
    }

    async fn get_record(&self, table_id: Uuid, id: Uuid) -> Result<Option<TableRecord>, AppError> {
        let record = sqlx::query_as::<_, TableRecord>(&format!(
            "SELECT {} FROM custom_table_records WHERE table_id = $1 AND id = $2",
            RECORD_COLUMNS
        ))
        .bind(table_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching table record")?;

        Ok(record)
    }

    async fn insert_record(&self, table_id: Uuid, data: &Value) -> Result<TableRecord, AppError> {
        let record = sqlx::query_as::<_, TableRecord>(&format!(
            r#"
            INSERT INTO custom_table_records (table_id, data, created_at, updated_at)
            VALUES ($1, $2, now(), now())
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(table_id)
        .bind(data)
        .fetch_one(&self.pool)
        .await
        .context("inserting table record")?;

        Ok(record)
    }

    async fn merge_record(
        &self,
        table_id: Uuid,
        id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<Option<TableRecord>, AppError> {
        let record = sqlx::query_as::<_, TableRecord>(&format!(
            r#"
            UPDATE custom_table_records
            SET data = data || $3, updated_at = now()
            WHERE table_id = $1 AND id = $2
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(table_id)
        .bind(id)
        .bind(Value::Object(patch.clone()))
        .fetch_optional(&self.pool)
        .await
        .context("updating table record")?;

        Ok(record)
    }

    async fn delete_record(&self, table_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM custom_table_records WHERE table_id = $1 AND id = $2")
            .bind(table_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting table record")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_enrichments(
        &self,
        owner: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<Vec<Enrichment>, AppError> {
        let enrichments = sqlx::query_as::<_, Enrichment>(
            r#"
            SELECT e.id, e.id_prospect, e.rapport_markdown, e.audit_seo, e.created_at
            FROM informations_enrichies e
            JOIN prospects p ON p.id = e.id_prospect
            WHERE p.user_id = $1 AND e.id_prospect = ANY($2)
            ORDER BY e.created_at DESC, e.id DESC
            "#,
        )
        .bind(owner)
        .bind(prospect_ids)
        .fetch_all(&self.pool)
        .await
        .context("listing enrichments")?;

        Ok(enrichments)
    }

    async fn insert_enrichment(
        &self,
        prospect_id: Uuid,
        rapport_markdown: Option<&str>,
        audit_seo: &Value,
    ) -> Result<Enrichment, AppError> {
        let enrichment = sqlx::query_as::<_, Enrichment>(
            r#"
            INSERT INTO informations_enrichies (id_prospect, rapport_markdown, audit_seo, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id, id_prospect, rapport_markdown, audit_seo, created_at
            "#,
        )
        .bind(prospect_id)
        .bind(rapport_markdown)
        .bind(audit_seo)
        .fetch_one(&self.pool)
        .await
        .context("inserting enrichment")?;

        Ok(enrichment)
    }

    async fn update_enrichment(
        &self,
        owner: Uuid,
        id: i64,
        rapport_markdown: Option<Option<&str>>,
        audit_seo: Option<&Value>,
    ) -> Result<Option<Enrichment>, AppError> {
        let enrichment = sqlx::query_as::<_, Enrichment>(
            r#"
            UPDATE informations_enrichies e
            SET rapport_markdown = CASE WHEN $3 THEN $4 ELSE e.rapport_markdown END,
                audit_seo = COALESCE($5, e.audit_seo)
            FROM prospects p
            WHERE e.id = $1 AND p.id = e.id_prospect AND p.user_id = $2
            RETURNING e.id, e.id_prospect, e.rapport_markdown, e.audit_seo, e.created_at
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(rapport_markdown.is_some())
        .bind(rapport_markdown.flatten())
        .bind(audit_seo)
        .fetch_optional(&self.pool)
        .await
        .context("updating enrichment")?;

        Ok(enrichment)
    }

    async fn delete_enrichment(&self, owner: Uuid, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM informations_enrichies e
            USING prospects p
            WHERE e.id = $1 AND p.id = e.id_prospect AND p.user_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .context("deleting enrichment")?;

        Ok(result.rows_affected() > 0)
    }
}
