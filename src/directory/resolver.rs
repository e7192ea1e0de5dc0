use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::directory::DirectoryStore;
use crate::primitives::{AuthUser, Company, CompanyUser, Profile, Role};

/// Resolved role plus whatever auxiliary rows the role calls for.
#[derive(Debug, Clone, Serialize)]
pub struct RoleContext {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator: Option<CompanyUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator_company: Option<Company>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// Role resolution service.
///
/// The role is read from user metadata (defaulting to student), never
/// re-derived from the database here; reconciling metadata against the
/// directory is the sign-in flows' job. Sub-query failures are logged and
/// leave the corresponding field unset; resolution always completes so the
/// caller never hangs on a missing auxiliary row.
pub struct RoleResolver {
    directory: Arc<dyn DirectoryStore>,
    cache: RwLock<HashMap<String, (Instant, RoleContext)>>,
    cache_ttl: Duration,
}

impl RoleResolver {
    pub fn new(directory: Arc<dyn DirectoryStore>, cache_ttl: Duration) -> Self {
        Self {
            directory,
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// Resolve the role context for a user.
    ///
    /// Served from a per-user cache within its TTL window; the cache is not
    /// invalidated on server-side writes, so it can briefly return stale
    /// auxiliary data.
    pub async fn resolve(&self, user: &AuthUser) -> RoleContext {
        if let Some((cached_at, context)) = self.cache.read().get(&user.id) {
            if cached_at.elapsed() < self.cache_ttl {
                debug!(user_id = %user.id, "Serving role context from cache");
                return context.clone();
            }
        }

        let context = self.resolve_uncached(user).await;
        self.cache
            .write()
            .insert(user.id.clone(), (Instant::now(), context.clone()));
        context
    }

    /// Drop any cached context for a user (used on sign-out).
    pub fn invalidate(&self, user_id: &str) {
        self.cache.write().remove(user_id);
    }

    async fn resolve_uncached(&self, user: &AuthUser) -> RoleContext {
        let role = user.metadata.role.unwrap_or(Role::Student);

        let mut context = RoleContext {
            role,
            company: None,
            collaborator: None,
            collaborator_company: None,
            profile: None,
        };

        match role {
            Role::Company => match self.directory.find_company_by_auth_user(&user.id).await {
                Ok(company) => context.company = company,
                Err(err) => {
                    warn!(user_id = %user.id, %err, "Failed to load company row for role context");
                }
            },
            Role::Collaborator => match self.directory.find_collaborator(&user.id).await {
                Ok(Some((collaborator, company))) => {
                    context.collaborator = Some(collaborator);
                    context.collaborator_company = Some(company);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(user_id = %user.id, %err, "Failed to load collaborator rows for role context");
                }
            },
            Role::Producer | Role::Student => {}
        }

        // The profile mirror is fetched for display and cross-checking only;
        // metadata stays authoritative on disagreement.
        match self.directory.get_profile(&user.id).await {
            Ok(profile) => {
                if let Some(profile) = &profile {
                    if let Some(profile_role) = profile.role {
                        if profile_role != role {
                            warn!(
                                user_id = %user.id,
                                metadata_role = %role,
                                profile_role = %profile_role,
                                "Profile role disagrees with metadata role"
                            );
                        }
                    }
                }
                context.profile = profile;
            }
            Err(err) => {
                warn!(user_id = %user.id, %err, "Failed to load profile row for role context");
            }
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::directory::memory::MemoryDirectory;
    use crate::directory::DirectoryError;
    use crate::primitives::UserMetadata;

    /// Directory wrapper counting how many queries reach the backend.
    struct CountingDirectory {
        inner: MemoryDirectory,
        queries: AtomicUsize,
    }

    impl CountingDirectory {
        fn new(inner: MemoryDirectory) -> Self {
            Self {
                inner,
                queries: AtomicUsize::new(0),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectoryStore for CountingDirectory {
        async fn find_company_by_auth_user(
            &self,
            user_id: &str,
        ) -> Result<Option<Company>, DirectoryError> {
            let _ = self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.find_company_by_auth_user(user_id).await
        }

        async fn find_company_by_contact_email(
            &self,
            email: &str,
        ) -> Result<Option<Company>, DirectoryError> {
            let _ = self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.find_company_by_contact_email(email).await
        }

        async fn find_collaborator(
            &self,
            user_id: &str,
        ) -> Result<Option<(CompanyUser, Company)>, DirectoryError> {
            let _ = self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.find_collaborator(user_id).await
        }

        async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError> {
            let _ = self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.get_profile(user_id).await
        }

        async fn clear_company_password_flag(
            &self,
            company_id: &str,
        ) -> Result<(), DirectoryError> {
            self.inner.clear_company_password_flag(company_id).await
        }

        async fn clear_collaborator_password_flag(
            &self,
            collaborator_id: &str,
        ) -> Result<(), DirectoryError> {
            self.inner
                .clear_collaborator_password_flag(collaborator_id)
                .await
        }
    }

    fn user(id: &str, role: Option<Role>) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            metadata: UserMetadata {
                role,
                ..UserMetadata::default()
            },
        }
    }

    fn company(id: &str, auth_user_id: Option<&str>) -> Company {
        Company {
            id: id.to_string(),
            name: format!("Company {id}"),
            contact_email: format!("{id}@corp.example.com"),
            auth_user_id: auth_user_id.map(str::to_string),
            needs_password_change: false,
            subscription_plan_id: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            seat_limit: None,
        }
    }

    #[tokio::test]
    async fn company_role_attaches_company_row() {
        let directory = MemoryDirectory::new();
        directory.insert_company(company("c-1", Some("u-1")));

        let resolver = RoleResolver::new(Arc::new(directory), Duration::from_secs(300));
        let context = resolver.resolve(&user("u-1", Some(Role::Company))).await;

        assert_eq!(context.role, Role::Company);
        assert_eq!(context.company.unwrap().id, "c-1");
        assert!(context.collaborator.is_none());
    }

    #[tokio::test]
    async fn collaborator_role_attaches_membership_and_company() {
        let directory = MemoryDirectory::new();
        directory.insert_company(company("c-1", None));
        directory.insert_collaborator(CompanyUser {
            id: "cu-1".to_string(),
            company_id: "c-1".to_string(),
            auth_user_id: "u-2".to_string(),
            name: "Bia".to_string(),
            email: "bia@corp.example.com".to_string(),
            needs_password_change: true,
        });

        let resolver = RoleResolver::new(Arc::new(directory), Duration::from_secs(300));
        let context = resolver.resolve(&user("u-2", Some(Role::Collaborator))).await;

        assert_eq!(context.role, Role::Collaborator);
        assert_eq!(context.collaborator.unwrap().id, "cu-1");
        assert_eq!(context.collaborator_company.unwrap().id, "c-1");
    }

    #[tokio::test]
    async fn missing_role_defaults_to_student_with_no_auxiliary_fetch() {
        let directory = MemoryDirectory::new();
        let resolver = RoleResolver::new(Arc::new(directory), Duration::from_secs(300));

        let context = resolver.resolve(&user("u-3", None)).await;
        assert_eq!(context.role, Role::Student);
        assert!(context.company.is_none());
        assert!(context.collaborator.is_none());
    }

    #[tokio::test]
    async fn resolution_is_idempotent_for_unchanged_data() {
        let directory = MemoryDirectory::new();
        directory.insert_company(company("c-1", Some("u-1")));

        // Zero TTL so every call hits the backing store.
        let resolver = RoleResolver::new(Arc::new(directory), Duration::ZERO);
        let u = user("u-1", Some(Role::Company));

        let first = resolver.resolve(&u).await;
        let second = resolver.resolve(&u).await;
        assert_eq!(first.role, second.role);
        assert_eq!(
            first.company.as_ref().map(|c| &c.id),
            second.company.as_ref().map(|c| &c.id)
        );
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups_within_ttl() {
        let counting = Arc::new(CountingDirectory::new(MemoryDirectory::new()));
        let resolver = RoleResolver::new(
            Arc::clone(&counting) as Arc<dyn DirectoryStore>,
            Duration::from_secs(300),
        );
        let u = user("u-4", None);

        let _ = resolver.resolve(&u).await;
        let after_first = counting.query_count();
        let _ = resolver.resolve(&u).await;
        assert_eq!(counting.query_count(), after_first);

        resolver.invalidate(&u.id);
        let _ = resolver.resolve(&u).await;
        assert!(counting.query_count() > after_first);
    }
}
