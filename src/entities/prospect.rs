// 👤 Prospect Entity
// A person at a postal location, scoped to one company.
//
// Key: company | full name | first name | last name | address1 | city | state | postal code

use super::{canonical_entity, EntityKind, Location, Provenance};
use crate::fields::{format_name, nullify, postal_code_short, split_name, RawRow};
use crate::identity;
use serde::{Deserialize, Serialize};

// ============================================================================
// NAME
// ============================================================================

/// Name parts as found in the source; gaps are filled at construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonName {
    pub full: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PersonName {
    /// From a single display name ("Doe, John" or "John Doe")
    pub fn from_full(full: Option<&str>) -> Self {
        let full = full.and_then(nullify);
        let (first, last) = full.map(split_name).unwrap_or((None, None));

        PersonName {
            full: full.map(str::to_string),
            first,
            last,
        }
    }

    /// From whatever parts the source carries
    pub fn from_parts(full: Option<&str>, first: Option<&str>, last: Option<&str>) -> Self {
        let first = first.and_then(nullify);
        let last = last.and_then(nullify);

        match full.and_then(nullify) {
            Some(full) if first.is_none() && last.is_none() => PersonName::from_full(Some(full)),
            Some(full) => PersonName {
                full: Some(full.to_string()),
                first: first.map(str::to_string),
                last: last.map(str::to_string),
            },
            None => PersonName {
                full: format_name(&[first, last]),
                first: first.map(str::to_string),
                last: last.map(str::to_string),
            },
        }
    }
}

// ============================================================================
// DETAILS
// ============================================================================

/// Demographic enrichment carried by some prospect feeds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProspectDetails {
    pub age: Option<i64>,
    pub year_built: Option<i64>,

    /// Lower bound of the estimated household income band, in dollars
    pub estimated_income: Option<i64>,

    /// Net worth band, kept as the source wrote it
    pub net_worth: Option<String>,
}

impl ProspectDetails {
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.year_built.is_none()
            && self.estimated_income.is_none()
            && self.net_worth.is_none()
    }
}

// ============================================================================
// PROSPECT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    pub company: String,
    pub key: String,
    pub external_id: String,

    // ========================================================================
    // VALUES
    // ========================================================================
    pub name: PersonName,
    pub location: Location,
    pub postal_code_short: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,

    /// Suppression flags - hard excludes for every export
    pub do_not_mail: bool,
    pub do_not_contact: bool,

    pub is_active: bool,
    pub is_deleted: bool,
    pub is_club_member: bool,
    pub tags: Vec<String>,
    pub details: ProspectDetails,

    // ========================================================================
    // METADATA
    // ========================================================================
    pub provenance: Provenance,
    pub raw: RawRow,
    pub review_flags: Vec<String>,
}

impl Prospect {
    pub fn new(company: &str, name: PersonName, location: Location) -> Self {
        let key = identity::compose_key(
            company,
            &[
                name.full.as_deref(),
                name.first.as_deref(),
                name.last.as_deref(),
                location.address1.as_deref(),
                location.city.as_deref(),
                location.state.as_deref(),
                location.postal_code.as_deref(),
            ],
        );
        let external_id = identity::external_id(company, &key);
        let postal_code_short = location.postal_code.as_deref().and_then(postal_code_short);

        Prospect {
            company: company.trim().to_string(),
            key,
            external_id,
            name,
            location,
            postal_code_short,
            email: None,
            phone: None,
            do_not_mail: false,
            do_not_contact: false,
            is_active: true,
            is_deleted: false,
            is_club_member: false,
            tags: Vec::new(),
            details: ProspectDetails::default(),
            provenance: Provenance::default(),
            raw: RawRow::new(),
            review_flags: Vec::new(),
        }
    }

    pub fn with_contact(mut self, email: Option<String>, phone: Option<String>) -> Self {
        self.email = email;
        self.phone = phone;
        self
    }

    pub fn with_suppression(mut self, do_not_mail: bool, do_not_contact: bool) -> Self {
        self.do_not_mail = do_not_mail;
        self.do_not_contact = do_not_contact;
        self
    }

    pub fn with_status(mut self, is_active: bool, is_deleted: bool) -> Self {
        self.is_active = is_active;
        self.is_deleted = is_deleted;
        self
    }

    pub fn with_club_member(mut self, is_club_member: bool) -> Self {
        self.is_club_member = is_club_member;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_details(mut self, details: ProspectDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_provenance(mut self, source_id: &str, source_name: &str) -> Self {
        self.provenance = Provenance {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
        };
        self
    }

    pub fn with_raw(mut self, raw: RawRow) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_review_flags(mut self, flags: Vec<String>) -> Self {
        self.review_flags.extend(flags);
        self
    }

    /// Display name used in exports
    pub fn display_name(&self) -> String {
        self.name.full.clone().unwrap_or_default()
    }

    /// Has a usable postal destination: city, state, postal code and a
    /// five-character short postal code
    pub fn is_mailable(&self) -> bool {
        self.is_active
            && !self.is_deleted
            && self.location.city.is_some()
            && self.location.state.is_some()
            && self.location.postal_code.is_some()
            && self
                .postal_code_short
                .as_ref()
                .map(|p| p.len() >= 5)
                .unwrap_or(false)
    }

    pub fn has_any_tag(&self, wanted: &[String]) -> bool {
        wanted
            .iter()
            .any(|w| self.tags.iter().any(|t| t.eq_ignore_ascii_case(w)))
    }
}

canonical_entity!(Prospect, EntityKind::Prospect, |p: &Prospect| {
    p.name.full.is_some() && p.location.is_complete()
});
