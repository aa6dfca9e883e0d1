// libs/identity-cell/src/services/directory.rs
use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AuthenticatedPrincipal, DirectoryUser, IdentityError, Role};

/// Adapter over the identity store: principal resolution, profile lookups
/// and role queries.
pub struct UserDirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl UserDirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Resolve a bearer token to a stable user id and the role set held.
    ///
    /// A token the auth endpoint does not recognise resolves to `Ok(None)`,
    /// never an error; only a role-store fault is surfaced as `Err`.
    pub async fn resolve_principal(
        &self,
        auth_token: &str,
    ) -> Result<Option<AuthenticatedPrincipal>, IdentityError> {
        let auth_user = match self.supabase.get_auth_user(auth_token).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Principal did not resolve: {}", e);
                return Ok(None);
            }
        };

        let user_id = match auth_user["id"].as_str().and_then(|id| Uuid::parse_str(id).ok()) {
            Some(id) => id,
            None => {
                debug!("Auth endpoint returned a record without a usable id");
                return Ok(None);
            }
        };

        let roles = self.roles_of(user_id, auth_token).await?;

        Ok(Some(AuthenticatedPrincipal { user_id, roles }))
    }

    /// Role names assigned to the user. Rows carrying a name outside the
    /// canonical set are skipped.
    pub async fn roles_of(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<HashSet<Role>, IdentityError> {
        let path = format!("/rest/v1/user_roles?user_id=eq.{}&select=role", user_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| IdentityError::DatabaseError(e.to_string()))?;

        let mut roles = HashSet::new();
        for row in &rows {
            let Some(name) = row["role"].as_str() else {
                continue;
            };
            match name.parse::<Role>() {
                Ok(role) => {
                    roles.insert(role);
                }
                Err(_) => {
                    warn!("Skipping unrecognised role {:?} for user {}", name, user_id);
                }
            }
        }

        Ok(roles)
    }

    pub async fn find_user_by_id(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<DirectoryUser>, IdentityError> {
        let path = format!("/rest/v1/profiles?id=eq.{}", user_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| IdentityError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let user: DirectoryUser = serde_json::from_value(rows[0].clone())
            .map_err(|e| IdentityError::DatabaseError(format!("Failed to parse profile: {}", e)))?;

        Ok(Some(user))
    }

    /// All users holding the given role, in store order.
    pub async fn users_in_role(
        &self,
        role: Role,
        auth_token: &str,
    ) -> Result<Vec<DirectoryUser>, IdentityError> {
        debug!("Listing users in role {}", role);

        let path = format!("/rest/v1/user_roles?role=eq.{}&select=user_id", role);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| IdentityError::DatabaseError(e.to_string()))?;

        let ids: Vec<&str> = rows.iter()
            .filter_map(|row| row["user_id"].as_str())
            .collect();

        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.find_users_by_ids(&ids, auth_token).await
    }

    /// Batch profile fetch, preserving store order.
    pub async fn find_users_by_ids(
        &self,
        user_ids: &[&str],
        auth_token: &str,
    ) -> Result<Vec<DirectoryUser>, IdentityError> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        let path = format!("/rest/v1/profiles?id=in.({})", user_ids.join(","));
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| IdentityError::DatabaseError(e.to_string()))?;

        let users: Vec<DirectoryUser> = rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DirectoryUser>, _>>()
            .map_err(|e| IdentityError::DatabaseError(format!("Failed to parse profiles: {}", e)))?;

        Ok(users)
    }
}
