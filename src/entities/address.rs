// 🏠 Address Entity
// Key: company | address1 | city | state | postal code
//
// Linked 1:1 to the prospect it was parsed alongside.

use super::{canonical_entity, EntityKind, Location, Provenance};
use crate::fields::RawRow;
use crate::identity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    #[default]
    Residential,
    Commercial,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Residential => "residential",
            AddressType::Commercial => "commercial",
        }
    }

    /// Delivery-type indicator from address verification: "B" (business)
    /// and "Y" mark commercial deliveries, everything else is residential
    pub fn from_indicator(indicator: Option<&str>) -> Self {
        match indicator.map(|i| i.trim().to_uppercase()) {
            Some(i) if i == "B" || i == "Y" => AddressType::Commercial,
            _ => AddressType::Residential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub company: String,
    pub key: String,
    pub external_id: String,

    pub location: Location,
    pub prospect_external_id: Option<String>,
    pub address_type: AddressType,
    pub is_vacant: bool,
    pub verified_at: Option<NaiveDateTime>,

    pub provenance: Provenance,
    pub raw: RawRow,
    pub review_flags: Vec<String>,
}

impl Address {
    pub fn new(company: &str, location: Location) -> Self {
        let key = identity::compose_key(
            company,
            &[
                location.address1.as_deref(),
                location.city.as_deref(),
                location.state.as_deref(),
                location.postal_code.as_deref(),
            ],
        );
        let external_id = identity::external_id(company, &key);

        Address {
            company: company.trim().to_string(),
            key,
            external_id,
            location,
            prospect_external_id: None,
            address_type: AddressType::Residential,
            is_vacant: false,
            verified_at: None,
            provenance: Provenance::default(),
            raw: RawRow::new(),
            review_flags: Vec::new(),
        }
    }

    pub fn with_prospect(mut self, prospect_external_id: &str) -> Self {
        self.prospect_external_id = Some(prospect_external_id.to_string());
        self
    }

    pub fn with_classification(mut self, address_type: AddressType, is_vacant: bool) -> Self {
        self.address_type = address_type;
        self.is_vacant = is_vacant;
        self
    }

    pub fn with_verified_at(mut self, verified_at: Option<NaiveDateTime>) -> Self {
        self.verified_at = verified_at;
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

    pub fn is_commercial(&self) -> bool {
        self.address_type == AddressType::Commercial
    }
}

canonical_entity!(Address, EntityKind::Address, |a: &Address| {
    a.location.is_complete()
});
