use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

// ============ Response Envelope ============

/// Success envelope: `{"success": true, "data": ...}`.
///
/// Errors use the same shape with `success: false` and an `error` object,
/// produced by `AppError::into_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============ Prospects ============

/// A sales lead owned by one user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Prospect {
    pub id: Uuid,
    pub nom: String,
    pub telephone: Option<String>,
    pub adresse: Option<String>,
    pub site_web: Option<String>,
    pub email: Option<String>,
    /// SEO score between 0 and 100.
    pub score_seo: Option<i32>,
    pub message_personnalise: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of `POST /api/prospects`.
///
/// `nom` is optional at the serde level so a missing name surfaces as a
/// `VALIDATION_ERROR` rather than a body rejection.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewProspect {
    pub nom: Option<String>,
    pub telephone: Option<String>,
    pub adresse: Option<String>,
    pub site_web: Option<String>,
    pub email: Option<String>,
    pub score_seo: Option<i64>,
    pub message_personnalise: Option<String>,
}

/// Validated insert, produced by `services::validate_new_prospect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectInsert {
    pub nom: String,
    pub telephone: Option<String>,
    pub adresse: Option<String>,
    pub site_web: Option<String>,
    pub email: Option<String>,
    pub score_seo: Option<i32>,
    pub message_personnalise: Option<String>,
}

/// Payload of `PUT /api/prospects/:id`.
///
/// Outer `None` means "leave unchanged", `Some(None)` means "set to null".
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProspectPatch {
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub nom: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub telephone: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub adresse: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub site_web: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<i64>)]
    pub score_seo: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub message_personnalise: Option<Option<String>>,
}

impl ProspectPatch {
    pub fn is_empty(&self) -> bool {
        self.nom.is_none()
            && self.telephone.is_none()
            && self.adresse.is_none()
            && self.site_web.is_none()
            && self.email.is_none()
            && self.score_seo.is_none()
            && self.message_personnalise.is_none()
    }
}

/// Validated partial update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProspectChanges {
    pub nom: Option<String>,
    pub telephone: Option<Option<String>>,
    pub adresse: Option<Option<String>>,
    pub site_web: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub score_seo: Option<Option<i32>>,
    pub message_personnalise: Option<Option<String>>,
}

impl ProspectChanges {
    /// Applies the changes to an in-memory row.
    pub fn apply_to(&self, prospect: &mut Prospect) {
        if let Some(ref nom) = self.nom {
            prospect.nom = nom.clone();
        }
        if let Some(ref v) = self.telephone {
            prospect.telephone = v.clone();
        }
        if let Some(ref v) = self.adresse {
            prospect.adresse = v.clone();
        }
        if let Some(ref v) = self.site_web {
            prospect.site_web = v.clone();
        }
        if let Some(ref v) = self.email {
            prospect.email = v.clone();
        }
        if let Some(v) = self.score_seo {
            prospect.score_seo = v;
        }
        if let Some(ref v) = self.message_personnalise {
            prospect.message_personnalise = v.clone();
        }
    }
}

/// Raw query string of `GET /api/prospects`.
///
/// Values are kept as strings so that empty parameters (`?min_score=`) are
/// treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListProspectsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub search: Option<String>,
    pub min_score: Option<String>,
    pub max_score: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProspectFilters {
    pub search: Option<String>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
}

impl ProspectFilters {
    /// Whether `prospect` passes these filters. Mirrors the SQL used by the
    /// Postgres store (`ILIKE` OR-match, inclusive score bounds).
    pub fn matches(&self, prospect: &Prospect) -> bool {
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let hit = [
                Some(&prospect.nom),
                prospect.telephone.as_ref(),
                prospect.adresse.as_ref(),
                prospect.site_web.as_ref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if !prospect.score_seo.is_some_and(|s| s >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_score {
            if !prospect.score_seo.is_some_and(|s| s <= max) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Parses `limit`/`offset` query values. Limit is clamped to
    /// `1..=MAX_LIMIT`; a negative offset is rejected.
    pub fn parse(limit: Option<&str>, offset: Option<&str>) -> Result<Self, AppError> {
        let limit = match non_empty(limit) {
            None => DEFAULT_LIMIT,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| AppError::Validation("limit must be an integer".to_string()))?
                .clamp(1, MAX_LIMIT),
        };
        let offset = match non_empty(offset) {
            None => 0,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| AppError::Validation("offset must be an integer".to_string()))?,
        };
        if offset < 0 {
            return Err(AppError::Validation(
                "offset must be greater than or equal to 0".to_string(),
            ));
        }
        Ok(Self { limit, offset })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProspectPage {
    pub items: Vec<Prospect>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ============ Custom Tables ============

/// A user-defined record schema.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct CustomTable {
    pub id: Uuid,
    pub name: String,
    /// `{"description"?: string, "fields": [{"name", "type", "required"}]}`
    #[schema(value_type = Object)]
    pub schema: Value,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl TableSchema {
    /// Reads the schema stored on a table. Schemas written by older clients
    /// may be partial; anything unreadable counts as "no fields".
    pub fn from_stored(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.required)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
}

fn default_field_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCustomTable {
    pub name: String,
    #[schema(value_type = Object)]
    pub schema: Value,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CustomTablePatch {
    pub name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub schema: Option<Value>,
}

/// One stored document of a custom table.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct TableRecord {
    pub id: Uuid,
    pub table_id: Uuid,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableRecord {
    /// Flattens the record into `{id, ...data, created_at, updated_at}`.
    /// System keys always win over same-named document keys.
    pub fn to_json(&self) -> Value {
        let mut object = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        object.insert("id".to_string(), Value::String(self.id.to_string()));
        object.insert(
            "created_at".to_string(),
            Value::String(self.created_at.to_rfc3339()),
        );
        object.insert(
            "updated_at".to_string(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        Value::Object(object)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordPage {
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<Value>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub table: String,
    #[schema(value_type = Object)]
    pub schema: Value,
}

// ============ Enriched Information ============

/// Report and SEO audit attached to a prospect.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Enrichment {
    pub id: i64,
    pub id_prospect: Uuid,
    pub rapport_markdown: Option<String>,
    #[schema(value_type = Object)]
    pub audit_seo: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewEnrichment {
    pub rapport_markdown: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub audit_seo: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EnrichmentPatch {
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    pub rapport_markdown: Option<Option<String>>,
    #[schema(value_type = Option<Object>)]
    pub audit_seo: Option<Value>,
}

// ============ Workflows ============

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateProspectsRequest {
    pub query: String,
    #[serde(default)]
    pub localisation: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SeoAuditRequest {
    pub prospect_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProspectionEmailRequest {
    pub prospect_ids: Vec<Uuid>,
}

/// Prospect as sent to the prospection-email workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ProspectWithEnrichments {
    #[serde(flatten)]
    pub prospect: Prospect,
    pub enrichies: Vec<Enrichment>,
}

// ============ Helpers ============

/// Deserializes a field that is present in the payload (possibly `null`)
/// into `Some(..)`; missing fields stay `None` via `#[serde(default)]`.
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
