use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

/// Payload trusted from the sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub email: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Stored participant profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub fn from_identity(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.trim().to_owned(),
            email: identity.email.clone(),
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Refresh provider-owned fields; `created_at` is kept.
    pub fn touch(&mut self, identity: &Identity, now: DateTime<Utc>) {
        self.display_name = identity.display_name.trim().to_owned();
        self.email = identity.email.clone();
        self.last_seen_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn touch_keeps_created_at() {
        let id = Identity::new(UserId::new("u1").unwrap(), " Ada ");
        let mut profile = UserProfile::from_identity(&id, fixed_now());
        assert_eq!(profile.display_name, "Ada");

        let later = fixed_now() + chrono::Duration::hours(2);
        profile.touch(&id.clone().with_email("ada@example.org"), later);
        assert_eq!(profile.created_at, fixed_now());
        assert_eq!(profile.last_seen_at, later);
        assert_eq!(profile.email.as_deref(), Some("ada@example.org"));
    }
}
