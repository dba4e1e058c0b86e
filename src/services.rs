use crate::errors::AppError;
use crate::models::*;
use crate::store::CrmStore;
use crate::workflow_client::WorkflowClient;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

pub const FIELD_TYPES: [&str; 7] = [
    "text", "email", "number", "date", "boolean", "textarea", "select",
];

pub const MAX_TABLE_NAME_LEN: usize = 63;

/// Keys managed by the server on custom-table records.
const RECORD_SYSTEM_KEYS: [&str; 3] = ["id", "created_at", "updated_at"];

// ============ Prospects ============

pub struct ProspectService {
    store: Arc<dyn CrmStore>,
}

impl ProspectService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        owner: Uuid,
        query: &ListProspectsQuery,
    ) -> Result<ProspectPage, AppError> {
        let page = Pagination::parse(query.limit.as_deref(), query.offset.as_deref())?;
        let filters = ProspectFilters {
            search: non_empty(query.search.as_deref()).map(str::to_string),
            min_score: parse_score_bound("min_score", query.min_score.as_deref())?,
            max_score: parse_score_bound("max_score", query.max_score.as_deref())?,
        };

        let (items, total) = self.store.list_prospects(owner, &filters, page).await?;
        tracing::debug!("Listed {} of {} prospects for {}", items.len(), total, owner);

        Ok(ProspectPage {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    pub async fn get(&self, owner: Uuid, id: &str) -> Result<Prospect, AppError> {
        let id = parse_uuid(id, "Prospect")?;
        self.store
            .get_prospect(owner, id)
            .await?
            .ok_or_else(|| prospect_not_found(id))
    }

    pub async fn create(&self, owner: Uuid, payload: NewProspect) -> Result<Prospect, AppError> {
        let insert = validate_new_prospect(payload)?;
        let prospect = self.store.insert_prospect(owner, &insert).await?;
        tracing::info!("Created prospect {} for {}", prospect.id, owner);
        Ok(prospect)
    }

    pub async fn update(
        &self,
        owner: Uuid,
        id: &str,
        patch: ProspectPatch,
    ) -> Result<Prospect, AppError> {
        let id = parse_uuid(id, "Prospect")?;
        if patch.is_empty() {
            // Nothing to write, updated_at stays untouched
            return self
                .store
                .get_prospect(owner, id)
                .await?
                .ok_or_else(|| prospect_not_found(id));
        }
        let changes = validate_patch(patch)?;
        let prospect = self
            .store
            .update_prospect(owner, id, &changes)
            .await?
            .ok_or_else(|| prospect_not_found(id))?;
        tracing::info!("Updated prospect {} for {}", id, owner);
        Ok(prospect)
    }

    /// Idempotent: a missing or foreign id is not an error.
    pub async fn delete(&self, owner: Uuid, id: &str) -> Result<(), AppError> {
        let Ok(id) = Uuid::parse_str(id.trim()) else {
            return Ok(());
        };
        let removed = self.store.delete_prospect(owner, id).await?;
        tracing::info!("Delete prospect {} for {} (removed: {})", id, owner, removed);
        Ok(())
    }
}

fn prospect_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Prospect {} not found", id))
}

fn parse_score_bound(name: &str, raw: Option<&str>) -> Result<Option<i32>, AppError> {
    non_empty(raw)
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| AppError::Validation(format!("{} must be an integer", name)))
        })
        .transpose()
}

/// Validates a create payload: `nom` required and non-blank, score in
/// `0..=100`, email well-formed. Blank optional strings become `None`.
pub fn validate_new_prospect(payload: NewProspect) -> Result<ProspectInsert, AppError> {
    let nom = non_empty(payload.nom.as_deref())
        .ok_or_else(|| AppError::Validation("nom is required".to_string()))?
        .to_string();

    let email = normalize_optional(payload.email);
    if let Some(ref email) = email {
        validate_email(email)?;
    }

    Ok(ProspectInsert {
        nom,
        telephone: normalize_optional(payload.telephone),
        adresse: normalize_optional(payload.adresse),
        site_web: normalize_optional(payload.site_web),
        email,
        score_seo: payload.score_seo.map(validate_score).transpose()?,
        message_personnalise: normalize_optional(payload.message_personnalise),
    })
}

/// Validates a partial update. An explicit `null` clears optional fields;
/// `nom` can never be cleared.
pub fn validate_patch(patch: ProspectPatch) -> Result<ProspectChanges, AppError> {
    let nom = match patch.nom {
        None => None,
        Some(value) => Some(
            non_empty(value.as_deref())
                .ok_or_else(|| AppError::Validation("nom cannot be empty".to_string()))?
                .to_string(),
        ),
    };

    let email = patch.email.map(normalize_optional);
    if let Some(Some(ref email)) = email {
        validate_email(email)?;
    }

    let score_seo = match patch.score_seo {
        None => None,
        Some(None) => Some(None),
        Some(Some(score)) => Some(Some(validate_score(score)?)),
    };

    Ok(ProspectChanges {
        nom,
        telephone: patch.telephone.map(normalize_optional),
        adresse: patch.adresse.map(normalize_optional),
        site_web: patch.site_web.map(normalize_optional),
        email,
        score_seo,
        message_personnalise: patch.message_personnalise.map(normalize_optional),
    })
}

pub fn validate_score(score: i64) -> Result<i32, AppError> {
    if !(0..=100).contains(&score) {
        return Err(AppError::Validation(
            "score_seo must be between 0 and 100".to_string(),
        ));
    }
    Ok(score as i32)
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    // local@domain.tld
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email) {
        return Err(AppError::Validation(format!("Invalid email address: {}", email)));
    }
    Ok(())
}

/// Trims the value; blank strings become `None`.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    non_empty(value.as_deref()).map(str::to_string)
}

/// Ids that do not parse cannot name an existing row.
pub fn parse_uuid(raw: &str, entity: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(format!("{} {} not found", entity, raw)))
}

// ============ Custom Tables ============

pub struct CustomTableService {
    store: Arc<dyn CrmStore>,
}

impl CustomTableService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    // ---- definitions ----

    pub async fn list_tables(&self, owner: Uuid) -> Result<Vec<CustomTable>, AppError> {
        self.store.list_custom_tables(owner).await
    }

    pub async fn create_table(
        &self,
        owner: Uuid,
        payload: NewCustomTable,
    ) -> Result<CustomTable, AppError> {
        let name = validate_table_name(&payload.name)?;
        let schema = validate_table_schema(&payload.schema)?;
        let table = self.store.insert_custom_table(owner, name, &schema).await?;
        tracing::info!("Created custom table '{}' for {}", table.name, owner);
        Ok(table)
    }

    pub async fn update_table(
        &self,
        owner: Uuid,
        id: &str,
        patch: CustomTablePatch,
    ) -> Result<CustomTable, AppError> {
        let id = parse_uuid(id, "Custom table")?;
        let name = patch.name.as_deref().map(validate_table_name).transpose()?;
        let schema = patch.schema.as_ref().map(validate_table_schema).transpose()?;

        self.store
            .update_custom_table(owner, id, name, schema.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Custom table {} not found", id)))
    }

    /// Removes the table and its records. Idempotent.
    pub async fn delete_table(&self, owner: Uuid, id: &str) -> Result<(), AppError> {
        let Ok(id) = Uuid::parse_str(id.trim()) else {
            return Ok(());
        };
        let removed = self.store.delete_custom_table(owner, id).await?;
        tracing::info!("Delete custom table {} for {} (removed: {})", id, owner, removed);
        Ok(())
    }

    // ---- records ----

    /// The caller's table named `table_name`, or `TABLE_NOT_FOUND`.
    pub async fn find_table(&self, owner: Uuid, table_name: &str) -> Result<CustomTable, AppError> {
        self.store
            .find_custom_table(owner, table_name)
            .await?
            .ok_or_else(|| AppError::TableNotFound(format!("Table '{}' not found", table_name)))
    }

    pub async fn list_records(
        &self,
        owner: Uuid,
        table_name: &str,
        query: &PageQuery,
    ) -> Result<RecordPage, AppError> {
        let table = self.find_table(owner, table_name).await?;
        let page = Pagination::parse(query.limit.as_deref(), query.offset.as_deref())?;
        let (records, total) = self.store.list_records(table.id, page).await?;

        Ok(RecordPage {
            records: records.iter().map(TableRecord::to_json).collect(),
            total,
            limit: page.limit,
            offset: page.offset,
            table: table.name,
            schema: table.schema,
        })
    }

    pub async fn get_record(
        &self,
        owner: Uuid,
        table_name: &str,
        id: &str,
    ) -> Result<Value, AppError> {
        let table = self.find_table(owner, table_name).await?;
        let id = parse_uuid(id, "Record")?;
        self.store
            .get_record(table.id, id)
            .await?
            .map(|record| record.to_json())
            .ok_or_else(|| record_not_found(id))
    }

    pub async fn create_record(
        &self,
        owner: Uuid,
        table_name: &str,
        body: Value,
    ) -> Result<Value, AppError> {
        let table = self.find_table(owner, table_name).await?;
        let document = record_document(body)?;
        validate_required_fields(&TableSchema::from_stored(&table.schema), &document)?;

        let record = self
            .store
            .insert_record(table.id, &Value::Object(document))
            .await?;
        tracing::info!("Created record {} in '{}' for {}", record.id, table.name, owner);
        Ok(record.to_json())
    }

    pub async fn update_record(
        &self,
        owner: Uuid,
        table_name: &str,
        id: &str,
        body: Value,
    ) -> Result<Value, AppError> {
        let table = self.find_table(owner, table_name).await?;
        let id = parse_uuid(id, "Record")?;
        let patch = record_document(body)?;

        let schema = TableSchema::from_stored(&table.schema);
        for field in schema.required_fields() {
            if patch.get(&field.name).is_some_and(|v| !is_present(v)) {
                return Err(AppError::Validation(format!(
                    "Field '{}' is required",
                    field.name
                )));
            }
        }

        self.store
            .merge_record(table.id, id, &patch)
            .await?
            .map(|record| record.to_json())
            .ok_or_else(|| record_not_found(id))
    }

    pub async fn delete_record(
        &self,
        owner: Uuid,
        table_name: &str,
        id: &str,
    ) -> Result<(), AppError> {
        let table = self.find_table(owner, table_name).await?;
        if let Ok(id) = Uuid::parse_str(id.trim()) {
            self.store.delete_record(table.id, id).await?;
        }
        Ok(())
    }
}

fn record_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Record {} not found", id))
}

/// Accepts only JSON objects and drops server-managed keys.
fn record_document(body: Value) -> Result<Map<String, Value>, AppError> {
    let Value::Object(mut document) = body else {
        return Err(AppError::Validation(
            "Record body must be a JSON object".to_string(),
        ));
    };
    for key in RECORD_SYSTEM_KEYS {
        document.remove(key);
    }
    Ok(document)
}

pub fn validate_table_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    let valid = !name.is_empty()
        && name.len() <= MAX_TABLE_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(AppError::Validation(format!(
            "Table name must be 1-{} characters of letters, digits, '_' or '-'",
            MAX_TABLE_NAME_LEN
        )));
    }
    Ok(name)
}

/// Validates a table schema and returns its normalized form (field types
/// defaulted to `text`).
pub fn validate_table_schema(schema: &Value) -> Result<Value, AppError> {
    if !schema.is_object() {
        return Err(AppError::Validation("schema must be a JSON object".to_string()));
    }
    let parsed: TableSchema = serde_json::from_value(schema.clone())
        .map_err(|e| AppError::Validation(format!("Invalid schema: {}", e)))?;

    let mut seen = HashSet::new();
    for field in &parsed.fields {
        if field.name.trim().is_empty() {
            return Err(AppError::Validation("Field names cannot be empty".to_string()));
        }
        if !FIELD_TYPES.contains(&field.field_type.as_str()) {
            return Err(AppError::Validation(format!(
                "Unknown type '{}' for field '{}'",
                field.field_type, field.name
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate field '{}'",
                field.name
            )));
        }
    }

    serde_json::to_value(&parsed)
        .map_err(|e| AppError::InternalError(format!("Failed to encode schema: {}", e)))
}

/// Every required field must be present with a non-blank value.
pub fn validate_required_fields(
    schema: &TableSchema,
    document: &Map<String, Value>,
) -> Result<(), AppError> {
    let missing: Vec<&str> = schema
        .required_fields()
        .filter(|field| !document.get(&field.name).is_some_and(is_present))
        .map(|field| field.name.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// `false` and `0` count as present; `null` and blank strings do not.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

// ============ Enriched Information ============

pub struct EnrichmentService {
    store: Arc<dyn CrmStore>,
}

impl EnrichmentService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    async fn owned_prospect(&self, owner: Uuid, prospect_id: &str) -> Result<Uuid, AppError> {
        let id = parse_uuid(prospect_id, "Prospect")?;
        self.store
            .get_prospect(owner, id)
            .await?
            .map(|p| p.id)
            .ok_or_else(|| prospect_not_found(id))
    }

    pub async fn list(&self, owner: Uuid, prospect_id: &str) -> Result<Vec<Enrichment>, AppError> {
        let prospect_id = self.owned_prospect(owner, prospect_id).await?;
        self.store.list_enrichments(owner, &[prospect_id]).await
    }

    pub async fn create(
        &self,
        owner: Uuid,
        prospect_id: &str,
        payload: NewEnrichment,
    ) -> Result<Enrichment, AppError> {
        let prospect_id = self.owned_prospect(owner, prospect_id).await?;
        let audit_seo = payload.audit_seo.unwrap_or_else(|| json!({}));
        let enrichment = self
            .store
            .insert_enrichment(prospect_id, payload.rapport_markdown.as_deref(), &audit_seo)
            .await?;
        tracing::info!("Added enrichment {} to prospect {}", enrichment.id, prospect_id);
        Ok(enrichment)
    }

    pub async fn update(
        &self,
        owner: Uuid,
        id: &str,
        patch: EnrichmentPatch,
    ) -> Result<Enrichment, AppError> {
        let id = parse_enrichment_id(id)?;
        let rapport = patch.rapport_markdown.as_ref().map(|r| r.as_deref());
        self.store
            .update_enrichment(owner, id, rapport, patch.audit_seo.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Enrichment {} not found", id)))
    }

    pub async fn delete(&self, owner: Uuid, id: &str) -> Result<(), AppError> {
        if let Ok(id) = id.trim().parse::<i64>() {
            self.store.delete_enrichment(owner, id).await?;
        }
        Ok(())
    }
}

fn parse_enrichment_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::NotFound(format!("Enrichment {} not found", raw)))
}

// ============ Workflows ============

pub struct WorkflowService {
    store: Arc<dyn CrmStore>,
    client: WorkflowClient,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn CrmStore>, client: WorkflowClient) -> Self {
        Self { store, client }
    }

    pub async fn generate_prospects(
        &self,
        owner: Uuid,
        request: GenerateProspectsRequest,
    ) -> Result<Value, AppError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query is required".to_string()));
        }
        self.client
            .generate_prospects(query, request.localisation.trim(), owner)
            .await
    }

    pub async fn seo_audit(&self, owner: Uuid, request: SeoAuditRequest) -> Result<Value, AppError> {
        let prospect = self
            .store
            .get_prospect(owner, request.prospect_id)
            .await?
            .ok_or_else(|| prospect_not_found(request.prospect_id))?;
        self.client.seo_audit(&prospect, owner).await
    }

    pub async fn prospection_email(
        &self,
        owner: Uuid,
        request: ProspectionEmailRequest,
    ) -> Result<Value, AppError> {
        if request.prospect_ids.is_empty() {
            return Err(AppError::Validation(
                "prospect_ids must not be empty".to_string(),
            ));
        }

        let prospects = self.store.get_prospects(owner, &request.prospect_ids).await?;
        if prospects.is_empty() {
            return Err(AppError::NotFound("No matching prospects".to_string()));
        }

        let ids: Vec<Uuid> = prospects.iter().map(|p| p.id).collect();
        let enrichments = self.store.list_enrichments(owner, &ids).await?;
        let payload = attach_enrichments(prospects, enrichments);

        self.client.send_prospection_email(&payload).await
    }
}

fn attach_enrichments(
    prospects: Vec<Prospect>,
    enrichments: Vec<Enrichment>,
) -> Vec<ProspectWithEnrichments> {
    prospects
        .into_iter()
        .map(|prospect| {
            let enrichies = enrichments
                .iter()
                .filter(|e| e.id_prospect == prospect.id)
                .cloned()
                .collect();
            ProspectWithEnrichments {
                prospect,
                enrichies,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_nom() {
        let err = validate_new_prospect(NewProspect::default()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let blank = NewProspect {
            nom: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(validate_new_prospect(blank).is_err());
    }

    #[test]
    fn create_normalizes_blank_optionals_and_keeps_zero_score() {
        let insert = validate_new_prospect(NewProspect {
            nom: Some(" Boulangerie Martin ".to_string()),
            telephone: Some("".to_string()),
            score_seo: Some(0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(insert.nom, "Boulangerie Martin");
        assert_eq!(insert.telephone, None);
        assert_eq!(insert.score_seo, Some(0));
    }

    #[test]
    fn score_bounds_are_inclusive() {
        assert!(validate_score(-1).is_err());
        assert!(validate_score(101).is_err());
        assert_eq!(validate_score(100).unwrap(), 100);
    }

    #[test]
    fn patch_cannot_clear_nom_but_can_clear_optionals() {
        let patch = ProspectPatch {
            nom: Some(None),
            ..Default::default()
        };
        assert!(validate_patch(patch).is_err());

        let patch = ProspectPatch {
            telephone: Some(None),
            score_seo: Some(None),
            ..Default::default()
        };
        let changes = validate_patch(patch).unwrap();
        assert_eq!(changes.telephone, Some(None));
        assert_eq!(changes.score_seo, Some(None));
        assert_eq!(changes.nom, None);
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("contact@exemple.fr"));
        assert!(!is_valid_email("contact@exemple"));
        assert!(!is_valid_email("not an email"));
    }

    #[test]
    fn malformed_ids_are_not_found() {
        assert_eq!(parse_uuid("abc", "Prospect").unwrap_err().code(), "NOT_FOUND");
        assert_eq!(parse_enrichment_id("x1").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn table_names() {
        assert_eq!(validate_table_name("leads_2024").unwrap(), "leads_2024");
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("drop table;").is_err());
        assert!(validate_table_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn schema_is_normalized_and_checked() {
        let normalized = validate_table_schema(&json!({
            "fields": [{"name": "company", "required": true}]
        }))
        .unwrap();
        assert_eq!(normalized["fields"][0]["type"], "text");

        assert!(validate_table_schema(&json!({"fields": [{"name": "x", "type": "blob"}]})).is_err());
        assert!(validate_table_schema(&json!({
            "fields": [{"name": "x"}, {"name": "x", "type": "number"}]
        }))
        .is_err());
        assert!(validate_table_schema(&json!([1, 2])).is_err());
    }

    #[test]
    fn required_fields_accept_false_and_zero() {
        let schema = TableSchema::from_stored(&json!({
            "fields": [
                {"name": "active", "type": "boolean", "required": true},
                {"name": "count", "type": "number", "required": true},
                {"name": "label", "required": true}
            ]
        }));

        let ok = json!({"active": false, "count": 0, "label": "x"});
        assert!(validate_required_fields(&schema, ok.as_object().unwrap()).is_ok());

        let blank = json!({"active": true, "count": 1, "label": "  "});
        let err = validate_required_fields(&schema, blank.as_object().unwrap()).unwrap_err();
        assert!(err.to_string().contains("label"));
    }

    #[test]
    fn record_documents_drop_system_keys() {
        let doc = record_document(json!({"id": "x", "name": "ACME"})).unwrap();
        assert!(!doc.contains_key("id"));
        assert!(record_document(json!("text")).is_err());
    }
}
