//! Credential decoding for the `auth` operation.
//!
//! Clients present an HS256-signed JWT whose claims carry an opaque lookup
//! token. The server only verifies the signature and hands the token to the
//! [`UserDirectory`](super::UserDirectory).

use crate::error::AuthError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a client credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Opaque token resolved to a user by the directory
    pub token: String,

    /// Expiry as seconds since the Unix epoch; validated only when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Decodes and verifies client credentials.
pub trait CredentialVerifier: Send + Sync + 'static {
    fn decode_credential(&self, credential: &str) -> Result<CredentialClaims, AuthError>;
}

/// HS256 JWT verifier sharing one secret with the credential issuer.
pub struct JwtCredentialVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtCredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCredentialVerifier").finish_non_exhaustive()
    }
}

impl JwtCredentialVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::default();
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Signs `claims` into a credential this verifier accepts.
    pub fn issue_credential(&self, claims: &CredentialClaims) -> Result<String, AuthError> {
        Ok(encode(&Header::default(), claims, &self.encoding_key)?)
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    fn decode_credential(&self, credential: &str) -> Result<CredentialClaims, AuthError> {
        let data = decode::<CredentialClaims>(credential, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(token: &str) -> CredentialClaims {
        CredentialClaims {
            token: token.to_string(),
            exp: None,
        }
    }

    #[test]
    fn test_issued_credential_decodes() {
        let verifier = JwtCredentialVerifier::new(b"secret");
        let credential = verifier.issue_credential(&claims("tok-1")).unwrap();
        assert_eq!(verifier.decode_credential(&credential).unwrap(), claims("tok-1"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issuer = JwtCredentialVerifier::new(b"secret");
        let verifier = JwtCredentialVerifier::new(b"other-secret");
        let credential = issuer.issue_credential(&claims("tok-1")).unwrap();

        assert!(matches!(
            verifier.decode_credential(&credential),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_garbage_and_expired_credentials_are_rejected() {
        let verifier = JwtCredentialVerifier::new(b"secret");
        assert!(verifier.decode_credential("not-a-jwt").is_err());

        let expired = verifier
            .issue_credential(&CredentialClaims {
                token: "tok-1".to_string(),
                exp: Some(1),
            })
            .unwrap();
        assert!(verifier.decode_credential(&expired).is_err());
    }
}
