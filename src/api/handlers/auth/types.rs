//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::Role;
use super::storage::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WalletChallengeRequest {
    pub wallet_address: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WalletChallengeResponse {
    /// Human-displayable message the wallet must sign verbatim.
    pub challenge: String,
    /// Seconds until the challenge expires.
    pub expires_in: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WalletVerifyRequest {
    pub wallet_address: String,
    pub challenge: String,
    /// Ed25519 signature over the challenge text, 128 hex characters.
    pub signature: String,
    /// Ed25519 public key, 64 hex characters; must match the wallet address.
    pub public_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RequestResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdateRequest {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: bool,
    /// Unix seconds.
    pub created_at: i64,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            wallet_address: user.wallet_address,
            email: user.email,
            role: user.role,
            bio: user.bio,
            avatar_url: user.avatar_url,
            is_public: user.is_public,
            created_at: user.created_at_unix,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn user_response_uses_camel_case() {
        let user = UserRecord {
            id: Uuid::nil(),
            username: "alice".to_string(),
            wallet_address: None,
            email: Some("a@x.com".to_string()),
            role: Role::User,
            bio: None,
            avatar_url: None,
            is_public: true,
            banned: false,
            created_at_unix: 1_700_000_000,
        };
        let json = serde_json::to_value(UserResponse::from(user)).expect("json");
        assert_eq!(json["walletAddress"], serde_json::Value::Null);
        assert_eq!(json["role"], "user");
        assert_eq!(json["isPublic"], true);
        assert_eq!(json["createdAt"], 1_700_000_000);
    }

    #[test]
    fn profile_update_rejects_unknown_fields() {
        let result: Result<ProfileUpdateRequest, _> =
            serde_json::from_str(r#"{"role": "operator"}"#);
        assert!(result.is_err());
    }
}
