use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Identity, IdentityProvider, SignInRequest};
use crate::error::AuthError;

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN: &str = "https://securetoken.googleapis.com/v1/token";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordSignIn<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Firebase Authentication over its REST API (email/password accounts).
#[derive(Debug, Clone)]
pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    async fn lookup_display_name(&self, id_token: &str) -> Result<String, AuthError> {
        let response = self
            .http
            .post(format!("{}/accounts:lookup", IDENTITY_TOOLKIT))
            .query(&[("key", &self.api_key)])
            .json(&serde_json::json!({ "idToken": id_token }))
            .send()
            .await?;
        let lookup: LookupResponse = decode(response).await?;
        lookup
            .users
            .into_iter()
            .next()
            .map(|user| display_name_or_email(user.display_name, user.email))
            .ok_or_else(|| AuthError::Rejected("USER_NOT_FOUND".to_string()))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn interactive_sign_in(&self, request: SignInRequest) -> Result<Identity, AuthError> {
        if request.login.trim().is_empty() || request.secret.is_empty() {
            return Err(AuthError::Cancelled);
        }

        let response = self
            .http
            .post(format!("{}/accounts:signInWithPassword", IDENTITY_TOOLKIT))
            .query(&[("key", &self.api_key)])
            .json(&PasswordSignIn {
                email: request.login.trim(),
                password: &request.secret,
                return_secure_token: true,
            })
            .send()
            .await?;
        let signed_in: SignInResponse = decode(response).await?;

        Ok(Identity {
            display_name: display_name_or_email(signed_in.display_name, signed_in.email),
            refresh_token: signed_in.refresh_token,
            id_token: Some(signed_in.id_token),
        })
    }

    async fn restore(&self, session_token: &str) -> Result<Identity, AuthError> {
        let response = self
            .http
            .post(SECURE_TOKEN)
            .query(&[("key", &self.api_key)])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", session_token)])
            .send()
            .await?;
        let refreshed: RefreshResponse = decode(response).await?;
        let display_name = self.lookup_display_name(&refreshed.id_token).await?;

        Ok(Identity {
            display_name,
            refresh_token: refreshed.refresh_token,
            id_token: Some(refreshed.id_token),
        })
    }
}

fn display_name_or_email(display_name: String, email: String) -> String {
    if display_name.trim().is_empty() {
        email
    } else {
        display_name
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(rejection(&body, status.as_u16()));
    }
    serde_json::from_str(&body).map_err(|e| AuthError::Rejected(format!("malformed response: {}", e)))
}

fn rejection(body: &str, http_status: u16) -> AuthError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => AuthError::Rejected(envelope.error.message),
        Err(_) => AuthError::Rejected(format!("HTTP {}", http_status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_password_sign_in_response() {
        let body = r#"{
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "u1",
            "email": "alice@example.com",
            "displayName": "",
            "idToken": "id-1",
            "registered": true,
            "refreshToken": "refresh-1",
            "expiresIn": "3600"
        }"#;
        let parsed: SignInResponse = serde_json::from_str(body).expect("response should parse");
        assert_eq!(parsed.refresh_token, "refresh-1");
        assert_eq!(
            display_name_or_email(parsed.display_name, parsed.email),
            "alice@example.com"
        );
    }

    #[test]
    fn parses_refresh_response() {
        let body = r#"{"expires_in":"3600","token_type":"Bearer","refresh_token":"r2","id_token":"i2","user_id":"u1","project_id":"42"}"#;
        let parsed: RefreshResponse = serde_json::from_str(body).expect("response should parse");
        assert_eq!(parsed.id_token, "i2");
        assert_eq!(parsed.refresh_token, "r2");
    }

    #[test]
    fn provider_errors_become_rejections() {
        let body = r#"{"error":{"code":400,"message":"INVALID_LOGIN_CREDENTIALS","errors":[]}}"#;
        assert_eq!(
            rejection(body, 400),
            AuthError::Rejected("INVALID_LOGIN_CREDENTIALS".to_string())
        );
        assert_eq!(rejection("<html>", 502), AuthError::Rejected("HTTP 502".to_string()));
    }

    #[tokio::test]
    async fn empty_form_counts_as_cancelled() {
        let auth = FirebaseAuth::new("key").expect("client should build");
        let err = auth
            .interactive_sign_in(SignInRequest::default())
            .await
            .expect_err("empty credentials should not reach the provider");
        assert_eq!(err, AuthError::Cancelled);
    }
}
