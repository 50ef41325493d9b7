// 🏢 Company (tenant)
// The identifier is the company scope every other entity keys under.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,

    /// Accounting identifier (e.g. "ACME1"); used as the company scope
    pub identifier: String,

    pub name: String,
}

impl Company {
    pub fn new(id: i64, identifier: &str, name: &str) -> Self {
        Company {
            id,
            identifier: identifier.trim().to_string(),
            name: name.trim().to_string(),
        }
    }

    /// Scope string handed to key composition
    pub fn scope(&self) -> &str {
        &self.identifier
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.identifier.eq_ignore_ascii_case(identifier.trim())
    }
}

// ============================================================================
// COMPANY REGISTRY
// ============================================================================

/// In-memory company registry
///
/// Shared through clones; every clone sees the same companies.
#[derive(Debug, Clone, Default)]
pub struct CompanyRegistry {
    companies: Arc<RwLock<Vec<Company>>>,
}

impl CompanyRegistry {
    pub fn new() -> Self {
        CompanyRegistry::default()
    }

    /// Register a company, assigning the next id; an existing identifier is
    /// returned unchanged
    pub fn register(&self, identifier: &str, name: &str) -> Company {
        let mut companies = self
            .companies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = companies.iter().find(|c| c.matches(identifier)) {
            return existing.clone();
        }

        let company = Company::new(companies.len() as i64 + 1, identifier, name);
        companies.push(company.clone());
        company
    }

    pub fn find(&self, identifier: &str) -> Option<Company> {
        let companies = self
            .companies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        companies.iter().find(|c| c.matches(identifier)).cloned()
    }

    pub fn count(&self) -> usize {
        self.companies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
