use std::sync::Arc;

use tracing::info;

use survey_core::model::{Identity, UserProfile};
use storage::repository::ProfileRepository;

use crate::error::ProfileError;
use crate::Clock;

/// Keeps a profile document per participant seen by the identity provider.
#[derive(Clone)]
pub struct ProfileService {
    clock: Clock,
    profiles: Arc<dyn ProfileRepository>,
}

impl ProfileService {
    #[must_use]
    pub fn new(clock: Clock, profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { clock, profiles }
    }

    /// Create the profile on first sight; afterwards refresh name, email and
    /// last-seen time.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Storage` if the profile cannot be read or written.
    pub async fn ensure_profile(&self, identity: &Identity) -> Result<UserProfile, ProfileError> {
        let now = self.clock.now();
        let profile = match self.profiles.get_profile(&identity.user_id).await? {
            Some(mut existing) => {
                existing.touch(identity, now);
                existing
            }
            None => {
                info!(user = %identity.user_id, "creating participant profile");
                UserProfile::from_identity(identity, now)
            }
        };
        self.profiles.put_profile(&profile).await?;
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `ProfileError::Storage` if the collection cannot be read.
    pub async fn list_profiles(&self) -> Result<Vec<UserProfile>, ProfileError> {
        Ok(self.profiles.list_profiles().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::repository::InMemoryRepository;
    use survey_core::model::UserId;
    use survey_core::time::{fixed_clock, fixed_now};

    #[tokio::test]
    async fn second_sight_keeps_creation_time() {
        let repo: Arc<dyn ProfileRepository> = Arc::new(InMemoryRepository::new());
        let identity = Identity::new(UserId::new("u1").unwrap(), "Ada");

        let first = ProfileService::new(fixed_clock(), Arc::clone(&repo))
            .ensure_profile(&identity)
            .await
            .unwrap();
        assert_eq!(first.created_at, fixed_now());

        let mut later = fixed_clock();
        later.advance(Duration::hours(2));
        let second = ProfileService::new(later, Arc::clone(&repo))
            .ensure_profile(&identity.clone().with_email("ada@example.org"))
            .await
            .unwrap();
        assert_eq!(second.created_at, fixed_now());
        assert_eq!(second.last_seen_at, fixed_now() + Duration::hours(2));
        assert_eq!(second.email.as_deref(), Some("ada@example.org"));
        assert_eq!(repo.list_profiles().await.unwrap().len(), 1);
    }
}
