use async_trait::async_trait;
use parking_lot::RwLock;

use crate::directory::{DirectoryError, DirectoryStore};
use crate::primitives::{Company, CompanyUser, Profile};

/// In-memory directory backend for development and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    companies: RwLock<Vec<Company>>,
    collaborators: RwLock<Vec<CompanyUser>>,
    profiles: RwLock<Vec<Profile>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_company(&self, company: Company) {
        self.companies.write().push(company);
    }

    pub fn insert_collaborator(&self, collaborator: CompanyUser) {
        self.collaborators.write().push(collaborator);
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.write().push(profile);
    }

    pub fn company(&self, company_id: &str) -> Option<Company> {
        self.companies
            .read()
            .iter()
            .find(|c| c.id == company_id)
            .cloned()
    }

    pub fn collaborator(&self, collaborator_id: &str) -> Option<CompanyUser> {
        self.collaborators
            .read()
            .iter()
            .find(|c| c.id == collaborator_id)
            .cloned()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn find_company_by_auth_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Company>, DirectoryError> {
        Ok(self
            .companies
            .read()
            .iter()
            .find(|c| c.auth_user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn find_company_by_contact_email(
        &self,
        email: &str,
    ) -> Result<Option<Company>, DirectoryError> {
        Ok(self
            .companies
            .read()
            .iter()
            .find(|c| c.contact_email == email)
            .cloned())
    }

    async fn find_collaborator(
        &self,
        user_id: &str,
    ) -> Result<Option<(CompanyUser, Company)>, DirectoryError> {
        let collaborator = self
            .collaborators
            .read()
            .iter()
            .find(|c| c.auth_user_id == user_id)
            .cloned();

        match collaborator {
            Some(collaborator) => {
                let company = self.company(&collaborator.company_id).ok_or_else(|| {
                    DirectoryError::Store(format!(
                        "collaborator {} references missing company {}",
                        collaborator.id, collaborator.company_id
                    ))
                })?;
                Ok(Some((collaborator, company)))
            }
            None => Ok(None),
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError> {
        Ok(self
            .profiles
            .read()
            .iter()
            .find(|p| p.id == user_id)
            .cloned())
    }

    async fn clear_company_password_flag(&self, company_id: &str) -> Result<(), DirectoryError> {
        let mut companies = self.companies.write();
        if let Some(company) = companies.iter_mut().find(|c| c.id == company_id) {
            company.needs_password_change = false;
        }
        Ok(())
    }

    async fn clear_collaborator_password_flag(
        &self,
        collaborator_id: &str,
    ) -> Result<(), DirectoryError> {
        let mut collaborators = self.collaborators.write();
        if let Some(collaborator) = collaborators.iter_mut().find(|c| c.id == collaborator_id) {
            collaborator.needs_password_change = false;
        }
        Ok(())
    }
}
