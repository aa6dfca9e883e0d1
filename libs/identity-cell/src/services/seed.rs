// libs/identity-cell/src/services/seed.rs
use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{IdentityError, Role};

/// Seeds the canonical role rows. Runs once at process start; inserting
/// only the missing names keeps it safe to repeat.
pub struct RoleSeedService {
    supabase: Arc<SupabaseClient>,
}

impl RoleSeedService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Returns the number of role rows created.
    pub async fn ensure_roles(&self) -> Result<usize, IdentityError> {
        debug!("Checking role rows in the identity store");

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            "/rest/v1/roles?select=name",
            None,
            None,
        ).await.map_err(|e| IdentityError::DatabaseError(e.to_string()))?;

        let existing: HashSet<&str> = rows.iter()
            .filter_map(|row| row["name"].as_str())
            .collect();

        let mut created = 0;
        for role in Role::ALL {
            if existing.contains(role.as_str()) {
                continue;
            }

            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

            let _: Vec<Value> = self.supabase.request_with_headers(
                Method::POST,
                "/rest/v1/roles",
                None,
                Some(json!({ "name": role.as_str() })),
                Some(headers),
            ).await.map_err(|e| IdentityError::DatabaseError(e.to_string()))?;

            info!("Seeded missing role {}", role);
            created += 1;
        }

        Ok(created)
    }
}
