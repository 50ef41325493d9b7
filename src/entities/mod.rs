// Canonical Entities
// Every legacy source converges on these five value objects (+ the company
// that scopes them).
//
// Each entity has:
// - Company scope (identifier) that is always the first key component
// - Key computed once at construction from its identity-bearing fields
// - External id derived one-way from (company, key) - the upsert handle
// - Raw source row kept for audit, never used in key computation
//
// Entities are immutable by convention: a changed input row produces a new
// value with the same key, never a mutated one.

pub mod address;
pub mod company;
pub mod customer;
pub mod invoice;
pub mod mail_package;
pub mod prospect;

pub use address::{Address, AddressType};
pub use company::{Company, CompanyRegistry};
pub use customer::Customer;
pub use invoice::Invoice;
pub use mail_package::MailPackage;
pub use prospect::{PersonName, Prospect, ProspectDetails};

use crate::error::UnificationError;
use crate::fields::{nullify, RawRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Prospect,
    Address,
    Customer,
    Invoice,
    MailPackage,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Prospect => "prospect",
            EntityKind::Address => "address",
            EntityKind::Customer => "customer",
            EntityKind::Invoice => "invoice",
            EntityKind::MailPackage => "mail_package",
        }
    }

    pub fn all() -> [EntityKind; 5] {
        [
            EntityKind::Prospect,
            EntityKind::Address,
            EntityKind::Customer,
            EntityKind::Invoice,
            EntityKind::MailPackage,
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        EntityKind::all()
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnificationError::UnknownTarget(s.to_string()))
    }
}

// ============================================================================
// SHARED VALUES
// ============================================================================

/// Postal location shared by prospects and addresses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

impl Location {
    /// Build a location, trimming every part and dropping null-like values.
    /// State codes are upper-cased.
    pub fn new(
        address1: Option<&str>,
        address2: Option<&str>,
        city: Option<&str>,
        state: Option<&str>,
        postal_code: Option<&str>,
    ) -> Self {
        let clean = |v: Option<&str>| v.and_then(nullify).map(str::to_string);

        Location {
            address1: clean(address1),
            address2: clean(address2),
            city: clean(city),
            state: clean(state).map(|s| s.to_uppercase()),
            postal_code: clean(postal_code),
        }
    }

    /// Address line 1, city, state and postal code all present
    pub fn is_complete(&self) -> bool {
        self.address1.is_some()
            && self.city.is_some()
            && self.state.is_some()
            && self.postal_code.is_some()
    }
}

/// Which legacy format produced an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_id: String,
    pub source_name: String,
}

// ============================================================================
// CANONICAL ENTITY CONTRACT
// ============================================================================

pub trait CanonicalEntity {
    fn kind(&self) -> EntityKind;

    fn company(&self) -> &str;

    fn key(&self) -> &str;

    fn external_id(&self) -> &str;

    /// Cheap sanity check: identity-bearing fields are non-empty
    fn is_valid(&self) -> bool;

    fn raw(&self) -> &RawRow;

    /// Notes left for manual review (e.g. an unparseable historical date)
    fn review_flags(&self) -> &[String];
}

/// Any canonical entity a parser can emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Prospect(Prospect),
    Address(Address),
    Customer(Customer),
    Invoice(Invoice),
    MailPackage(MailPackage),
}

impl Record {
    pub fn entity(&self) -> &dyn CanonicalEntity {
        match self {
            Record::Prospect(p) => p,
            Record::Address(a) => a,
            Record::Customer(c) => c,
            Record::Invoice(i) => i,
            Record::MailPackage(m) => m,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.entity().kind()
    }

    pub fn external_id(&self) -> &str {
        self.entity().external_id()
    }

    pub fn is_valid(&self) -> bool {
        self.entity().is_valid()
    }

    pub fn is_flagged(&self) -> bool {
        !self.entity().review_flags().is_empty()
    }
}

/// Implements [`CanonicalEntity`] for a struct carrying the standard fields
macro_rules! canonical_entity {
    ($ty:ty, $kind:expr, $valid:expr) => {
        impl $crate::entities::CanonicalEntity for $ty {
            fn kind(&self) -> $crate::entities::EntityKind {
                $kind
            }

            fn company(&self) -> &str {
                &self.company
            }

            fn key(&self) -> &str {
                &self.key
            }

            fn external_id(&self) -> &str {
                &self.external_id
            }

            fn is_valid(&self) -> bool {
                let check: fn(&$ty) -> bool = $valid;
                check(self)
            }

            fn raw(&self) -> &$crate::fields::RawRow {
                &self.raw
            }

            fn review_flags(&self) -> &[String] {
                &self.review_flags
            }
        }
    };
}

pub(crate) use canonical_entity;
