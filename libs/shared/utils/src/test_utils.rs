use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "Customer".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn customer(email: &str) -> Self {
        Self::new(email, "Customer")
    }

    pub fn therapist(email: &str) -> Self {
        Self::new(email, "Therapist")
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, "Receptionist")
    }

    pub fn manager(email: &str) -> Self {
        Self::new(email, "Manager")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "Admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST/auth response bodies used by wiremock-backed tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn auth_user_response(user_id: &str, email: &str) -> serde_json::Value {
        json!({
            "id": user_id,
            "aud": "authenticated",
            "email": email,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn profile_response(user_id: &str, email: &str, full_name: &str) -> serde_json::Value {
        json!({
            "id": user_id,
            "email": email,
            "full_name": full_name,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn role_row(name: &str) -> serde_json::Value {
        json!({ "name": name })
    }

    pub fn user_role_row(user_id: &str, role: &str) -> serde_json::Value {
        json!({
            "user_id": user_id,
            "role": role
        })
    }

    pub fn appointment_row(
        id: i64,
        customer_id: &str,
        therapist_id: Option<&str>,
        service_name: &str,
        start_time: &str,
        end_time: Option<&str>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "customer_id": customer_id,
            "therapist_id": therapist_id,
            "service_name": service_name,
            "start_time": start_time,
            "end_time": end_time,
            "price": 60.0,
            "status": status,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }
}
