//! Prospect CRM API Library
//!
//! This library provides the core functionality for the Prospect CRM API,
//! including storage backends, Supabase authentication, N8N workflow
//! integration, data models, and HTTP handlers.
//!
//! # Modules
//!
//! - `api`: API-layer namespace (handlers and router).
//! - `core`: Domain-layer namespace (models, services, store, errors).
//! - `integrations`: External service integrations.
//! - `admin_handler`: Admin user listing.
//! - `auth`: Bearer token verification against Supabase Auth.
//! - `config`: Configuration management.
//! - `db`: Database connection pool and migrations.
//! - `db_storage`: Postgres implementation of the store.
//! - `enrichment_handler`: Enriched information endpoints.
//! - `errors`: Error handling types.
//! - `handlers`: Shared state, health, prospect endpoints and fallbacks.
//! - `memory_storage`: In-memory implementation of the store.
//! - `models`: Core data models.
//! - `routes`: Router, middleware and OpenAPI document.
//! - `services`: Validation and business rules.
//! - `store`: The `CrmStore` storage trait.
//! - `table_handler`: Custom table definitions and records.
//! - `workflow_client`: N8N webhook client.
//! - `workflow_handler`: Workflow endpoints.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod admin_handler;
pub mod auth;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod enrichment_handler;
pub mod errors;
pub mod handlers;
pub mod memory_storage;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod table_handler;
pub mod workflow_client;
pub mod workflow_handler;
