//! Signed, time-boxed credentials.
//!
//! Two independent issuers live here: [`SessionTokens`] for the ordinary
//! `Authorization` header and [`FileTokens`] for archive downloads. Each owns
//! its own secret type, so a session secret can never be handed to the file
//! verifier by mistake, and each stamps its tokens with a distinct `typ`
//! claim. A token only verifies when both the signature and the kind match.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a token was refused.
///
/// Callers on the download route collapse all of these into one response;
/// the distinction is kept for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token was not issued for this purpose")]
    WrongScope,
    #[error("failed to sign token")]
    Signing,
}

/// Role carried by a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superuser,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Kind {
    Session,
    File,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    typ: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    iat: i64,
    exp: i64,
}

/// Secret used to sign login sessions.
#[derive(Clone)]
pub struct SessionSecret(Vec<u8>);

/// Secret used to sign file-access tokens.
#[derive(Clone)]
pub struct FileTokenSecret(Vec<u8>);

impl SessionSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }
}

impl FileTokenSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

impl fmt::Debug for FileTokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileTokenSecret(..)")
    }
}

/// HS256 signer bound to one token kind. Not exported: the public issuers
/// below are the only way to construct one.
#[derive(Clone)]
struct Signer {
    kind: Kind,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Signer {
    fn new(kind: Kind, secret: &[u8], ttl: Duration) -> Self {
        Self {
            kind,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    fn issue(
        &self,
        subject: &str,
        role: Option<Role>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = now.checked_add_signed(ttl).ok_or(TokenError::Signing)?;
        let claims = Claims {
            sub: subject.to_string(),
            typ: self.kind,
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Signing)
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::WrongScope,
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.typ != self.kind {
            return Err(TokenError::WrongScope);
        }
        Ok(data.claims)
    }
}

/// Authenticated session principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub role: Role,
}

/// Issues and verifies login session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    signer: Signer,
}

impl SessionTokens {
    pub fn new(secret: &SessionSecret, ttl: Duration) -> Self {
        Self {
            signer: Signer::new(Kind::Session, &secret.0, ttl),
        }
    }

    /// Issues a session token with the default lifetime.
    pub fn issue(&self, subject: &str, role: Role) -> Result<String, TokenError> {
        self.signer.issue(subject, Some(role), self.signer.ttl)
    }

    /// Verifies a session token and returns the principal it names.
    pub fn verify(&self, token: &str) -> Result<Session, TokenError> {
        let claims = self.signer.verify(token)?;
        let role = claims.role.ok_or(TokenError::Malformed)?;
        Ok(Session {
            subject: claims.sub,
            role,
        })
    }
}

/// Issues and verifies file-access tokens.
///
/// A file token names only its subject and expiry. It is not bound to any
/// backup name, so one token may fetch any archive until it expires.
#[derive(Clone)]
pub struct FileTokens {
    signer: Signer,
}

impl FileTokens {
    pub fn new(secret: &FileTokenSecret, ttl: Duration) -> Self {
        Self {
            signer: Signer::new(Kind::File, &secret.0, ttl),
        }
    }

    /// Issues a token with the configured lifetime.
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.signer.issue(subject, None, self.signer.ttl)
    }

    /// Issues a token with an explicit lifetime.
    pub fn issue_with_ttl(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        self.signer.issue(subject, None, ttl)
    }

    /// Verifies a file token and returns its subject.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        Ok(self.signer.verify(token)?.sub)
    }
}
