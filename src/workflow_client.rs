use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Prospect, ProspectWithEnrichments};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Client for the N8N automation webhooks.
///
/// Each workflow is a GET webhook taking its inputs as query parameters.
/// A workflow whose URL is not configured fails with
/// `WORKFLOW_NOT_CONFIGURED` without any network call.
#[derive(Clone)]
pub struct WorkflowClient {
    client: reqwest::Client,
    generate_prospects_url: Option<String>,
    seo_audit_url: Option<String>,
    prospection_email_url: Option<String>,
}

impl WorkflowClient {
    /// Creates a new `WorkflowClient` from the webhook URLs in `config`.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create workflow client: {}", e))
            })?;

        Ok(Self {
            client,
            generate_prospects_url: config.n8n_generate_prospects_url.clone(),
            seo_audit_url: config.n8n_seo_audit_url.clone(),
            prospection_email_url: config.n8n_prospection_email_url.clone(),
        })
    }

    /// Asks the engine to find new prospects for `query` around `localisation`.
    ///
    /// # Arguments
    ///
    /// * `query` - Business type or keywords to search for.
    /// * `localisation` - Free-form location, may be empty.
    /// * `owner` - The caller; generated prospects are attributed to them.
    pub async fn generate_prospects(
        &self,
        query: &str,
        localisation: &str,
        owner: Uuid,
    ) -> Result<Value, AppError> {
        let params = [
            ("query", query.to_string()),
            ("localisation", localisation.to_string()),
            ("user_id", owner.to_string()),
        ];
        self.trigger("generate-prospects", self.generate_prospects_url.as_deref(), &params)
            .await
    }

    /// Starts an SEO audit of the prospect's website.
    pub async fn seo_audit(&self, prospect: &Prospect, owner: Uuid) -> Result<Value, AppError> {
        let params = [
            ("prospect_id", prospect.id.to_string()),
            ("user_id", owner.to_string()),
            ("site_web", prospect.site_web.clone().unwrap_or_default()),
        ];
        self.trigger("seo-audit", self.seo_audit_url.as_deref(), &params)
            .await
    }

    /// Sends the prospection email for the given prospects and their
    /// enrichments, passed as one JSON-encoded `prospects` parameter.
    pub async fn send_prospection_email(
        &self,
        prospects: &[ProspectWithEnrichments],
    ) -> Result<Value, AppError> {
        let encoded = serde_json::to_string(prospects).map_err(|e| {
            AppError::InternalError(format!("Failed to encode prospects: {}", e))
        })?;
        self.trigger(
            "prospection-email",
            self.prospection_email_url.as_deref(),
            &[("prospects", encoded)],
        )
        .await
    }

    async fn trigger(
        &self,
        workflow: &str,
        base_url: Option<&str>,
        params: &[(&str, String)],
    ) -> Result<Value, AppError> {
        let base_url = base_url.ok_or_else(|| {
            AppError::WorkflowNotConfigured(format!("Workflow '{}' has no webhook URL", workflow))
        })?;

        let url = Url::parse_with_params(base_url, params).map_err(|e| {
            AppError::WorkflowError(format!("Invalid webhook URL for '{}': {}", workflow, e))
        })?;
        tracing::info!("Triggering workflow {}", workflow);

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::WorkflowError(format!("Workflow '{}' request failed: {}", workflow, e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::WorkflowError(format!("Failed to read workflow response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::WorkflowError(format!(
                "Workflow '{}' returned {}: {}",
                workflow, status, body
            )));
        }

        tracing::info!("✓ Workflow {} completed ({})", workflow, status);
        Ok(parse_body(body))
    }
}

/// Engine responses are usually JSON; anything else is wrapped as `{"raw": text}`.
fn parse_body(body: String) -> Value {
    if body.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(&body).unwrap_or_else(|_| json!({ "raw": body }))
}
