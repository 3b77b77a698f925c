use async_trait::async_trait;
use rand::{thread_rng, Rng};

use super::{Identity, IdentityProvider, SignInRequest};
use crate::error::AuthError;

/// Identity provider for offline mode: any login is accepted as the display
/// name, and an empty one gets a random nickname.
#[derive(Debug, Clone, Default)]
pub struct OfflineIdentityProvider;

#[async_trait]
impl IdentityProvider for OfflineIdentityProvider {
    async fn interactive_sign_in(&self, request: SignInRequest) -> Result<Identity, AuthError> {
        let login = request.login.trim();
        let display_name = if login.is_empty() {
            generate_random_nickname()
        } else {
            login.to_string()
        };
        // The token carries the display name so a restart can restore it.
        let refresh_token = format!("offline:{}:{}", uuid::Uuid::new_v4().simple(), display_name);
        Ok(Identity {
            display_name,
            refresh_token,
            id_token: None,
        })
    }

    async fn restore(&self, session_token: &str) -> Result<Identity, AuthError> {
        let mut parts = session_token.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("offline"), Some(_), Some(name)) if !name.is_empty() => Ok(Identity {
                display_name: name.to_string(),
                refresh_token: session_token.to_string(),
                id_token: None,
            }),
            _ => Err(AuthError::Rejected("not an offline session token".to_string())),
        }
    }
}

/// Format: {adjective}{noun}{number}
fn generate_random_nickname() -> String {
    let adjectives = [
        "shadow", "cyber", "quantum", "neon", "digital", "ghost", "swift", "silent",
        "cosmic", "lunar", "solar", "crystal", "sonic", "mystic", "rapid", "bright",
    ];

    let nouns = [
        "agent", "runner", "coder", "node", "byte", "cipher", "signal", "pulse",
        "wave", "core", "link", "port", "daemon", "thread", "kernel", "shell",
    ];

    let mut rng = thread_rng();
    let adjective = adjectives[rng.gen_range(0..adjectives.len())];
    let noun = nouns[rng.gen_range(0..nouns.len())];
    let number: u16 = rng.gen_range(100..9999);

    format!("{}{}{}", adjective, noun, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_round_trips_through_restore() {
        let provider = OfflineIdentityProvider;
        let identity = provider
            .interactive_sign_in(SignInRequest {
                login: "  Alice: the great ".to_string(),
                secret: String::new(),
            })
            .await
            .expect("offline sign-in always works");
        assert_eq!(identity.display_name, "Alice: the great");

        let restored = provider
            .restore(&identity.refresh_token)
            .await
            .expect("own token should restore");
        assert_eq!(restored, identity);
    }

    #[tokio::test]
    async fn empty_login_gets_generated_nickname() {
        let identity = OfflineIdentityProvider
            .interactive_sign_in(SignInRequest::default())
            .await
            .unwrap();
        assert!(!identity.display_name.is_empty());
        assert!(identity.display_name.chars().last().unwrap().is_ascii_digit());
    }

    #[tokio::test]
    async fn foreign_tokens_do_not_restore() {
        let err = OfflineIdentityProvider
            .restore("AMf-vBx-firebase-refresh-token")
            .await
            .expect_err("foreign token should be rejected");
        assert!(matches!(err, AuthError::Rejected(_)));
    }
}
