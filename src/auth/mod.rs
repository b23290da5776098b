//! Caller authentication.
//!
//! Classifies requests as superuser, record or anonymous from the session
//! token, and verifies the separate file-access tokens used for downloads.

mod token;

pub use token::{
    FileTokenSecret, FileTokens, Role, Session, SessionSecret, SessionTokens, TokenError,
};

/// Who is making a request, as far as the backup API cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Superuser(String),
    Record(String),
    Anonymous,
}

impl Caller {
    /// Classifies the raw `Authorization` header value.
    ///
    /// Both `Bearer <token>` and a bare token are accepted. Anything that
    /// fails verification is treated as anonymous.
    pub fn classify(header: Option<&str>, sessions: &SessionTokens) -> Self {
        let Some(raw) = header.map(str::trim).filter(|h| !h.is_empty()) else {
            return Self::Anonymous;
        };
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

        match sessions.verify(token) {
            Ok(Session {
                subject,
                role: Role::Superuser,
            }) => Self::Superuser(subject),
            Ok(Session {
                subject,
                role: Role::Record,
            }) => Self::Record(subject),
            Err(_) => Self::Anonymous,
        }
    }

    pub fn is_superuser(&self) -> bool {
        matches!(self, Self::Superuser(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sessions() -> SessionTokens {
        SessionTokens::new(&SessionSecret::new("s"), Duration::hours(1))
    }

    #[test]
    fn test_classify_roles() {
        let tokens = sessions();
        let admin = tokens.issue("a1", Role::Superuser).unwrap();
        let user = tokens.issue("u1", Role::Record).unwrap();

        assert_eq!(
            Caller::classify(Some(&format!("Bearer {admin}")), &tokens),
            Caller::Superuser("a1".into())
        );
        assert_eq!(
            Caller::classify(Some(&user), &tokens),
            Caller::Record("u1".into())
        );
        assert_eq!(Caller::classify(None, &tokens), Caller::Anonymous);
        assert_eq!(Caller::classify(Some("junk"), &tokens), Caller::Anonymous);
    }

    #[test]
    fn test_file_token_does_not_authenticate_session() {
        let tokens = sessions();
        let file = FileTokens::new(&FileTokenSecret::new("f"), Duration::minutes(1))
            .issue("a1")
            .unwrap();
        assert!(!Caller::classify(Some(&file), &tokens).is_superuser());
    }
}
