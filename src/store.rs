//! Storage port for the CRM.
//!
//! Handlers and services only talk to `CrmStore`; the Postgres
//! implementation lives in `db_storage` and the in-memory one in
//! `memory_storage`. Every prospect, table and enrichment operation takes the
//! owner id so that no implementation can return another user's rows.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    CustomTable, Enrichment, Pagination, Prospect, ProspectChanges, ProspectFilters,
    ProspectInsert, TableRecord,
};

#[async_trait]
pub trait CrmStore: Send + Sync {
    // ---- prospects ----

    /// Owner's prospects matching `filters`, newest first, plus the number of
    /// matching rows ignoring pagination.
    async fn list_prospects(
        &self,
        owner: Uuid,
        filters: &ProspectFilters,
        page: Pagination,
    ) -> Result<(Vec<Prospect>, i64), AppError>;

    async fn get_prospect(&self, owner: Uuid, id: Uuid) -> Result<Option<Prospect>, AppError>;

    /// Owner's prospects among `ids`, newest first. Unknown ids are skipped.
    async fn get_prospects(&self, owner: Uuid, ids: &[Uuid]) -> Result<Vec<Prospect>, AppError>;

    async fn insert_prospect(
        &self,
        owner: Uuid,
        prospect: &ProspectInsert,
    ) -> Result<Prospect, AppError>;

    async fn update_prospect(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: &ProspectChanges,
    ) -> Result<Option<Prospect>, AppError>;

    /// Returns whether a row was removed.
    async fn delete_prospect(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError>;

    // ---- custom table definitions ----

    async fn list_custom_tables(&self, owner: Uuid) -> Result<Vec<CustomTable>, AppError>;

    async fn find_custom_table(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<CustomTable>, AppError>;

    /// Fails with `AppError::Conflict` when the owner already has `name`.
    async fn insert_custom_table(
        &self,
        owner: Uuid,
        name: &str,
        schema: &Value,
    ) -> Result<CustomTable, AppError>;

    async fn update_custom_table(
        &self,
        owner: Uuid,
        id: Uuid,
        name: Option<&str>,
        schema: Option<&Value>,
    ) -> Result<Option<CustomTable>, AppError>;

    /// Removes the table and all of its records.
    async fn delete_custom_table(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError>;

    // ---- custom table records ----
    //
    // Callers resolve `table_id` through `find_custom_table` first, which is
    // where ownership is checked.

    async fn list_records(
        &self,
        table_id: Uuid,
        page: Pagination,
    ) -> Result<(Vec<TableRecord>, i64), AppError>;

    async fn get_record(&self, table_id: Uuid, id: Uuid) -> Result<Option<TableRecord>, AppError>;

    async fn insert_record(&self, table_id: Uuid, data: &Value) -> Result<TableRecord, AppError>;

    /// Shallow-merges `patch` into the stored document.
    async fn merge_record(
        &self,
        table_id: Uuid,
        id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<Option<TableRecord>, AppError>;

    async fn delete_record(&self, table_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    // ---- enriched information ----

    /// Enrichments of the given prospects, restricted to prospects owned by
    /// `owner`, newest first.
    async fn list_enrichments(
        &self,
        owner: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<Vec<Enrichment>, AppError>;

    /// Caller must have checked that `prospect_id` belongs to the owner.
    async fn insert_enrichment(
        &self,
        prospect_id: Uuid,
        rapport_markdown: Option<&str>,
        audit_seo: &Value,
    ) -> Result<Enrichment, AppError>;

    async fn update_enrichment(
        &self,
        owner: Uuid,
        id: i64,
        rapport_markdown: Option<Option<&str>>,
        audit_seo: Option<&Value>,
    ) -> Result<Option<Enrichment>, AppError>;

    async fn delete_enrichment(&self, owner: Uuid, id: i64) -> Result<bool, AppError>;
}
