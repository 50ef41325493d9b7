// 💳 Customer Entity
// A prospect with purchase history.
//
// Key: company | name | linked prospect external id
//
// Only materialized when lifetime value or invoice count shows an actual
// purchase; otherwise there is no customer for the row.

use super::{canonical_entity, EntityKind, Prospect, Provenance};
use crate::fields::{format_decimal, RawRow};
use crate::identity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub company: String,
    pub key: String,
    pub external_id: String,

    pub name: String,
    pub prospect_external_id: String,

    /// Two-place decimal string
    pub lifetime_value: String,
    pub count_invoices: i64,
    pub first_invoiced_at: Option<NaiveDateTime>,
    pub last_invoiced_at: Option<NaiveDateTime>,

    /// Two-place decimal string
    pub first_sale_amount: String,
    pub last_invoice_number: Option<String>,

    pub is_active: bool,
    pub is_club_member: bool,
    pub has_installation: bool,

    pub provenance: Provenance,
    pub raw: RawRow,
    pub review_flags: Vec<String>,
}

impl Customer {
    /// Customer for `prospect` when the history shows a purchase, else None
    pub fn materialize(
        prospect: &Prospect,
        lifetime_value: Option<f64>,
        count_invoices: Option<i64>,
    ) -> Option<Self> {
        let lifetime_value = lifetime_value.unwrap_or(0.0);
        let count_invoices = count_invoices.unwrap_or(0);

        if lifetime_value <= 0.0 && count_invoices <= 0 {
            return None;
        }

        let name = prospect.display_name();
        let key = identity::compose_key(
            &prospect.company,
            &[Some(name.as_str()), Some(prospect.external_id.as_str())],
        );
        let external_id = identity::external_id(&prospect.company, &key);

        Some(Customer {
            company: prospect.company.clone(),
            key,
            external_id,
            name,
            prospect_external_id: prospect.external_id.clone(),
            lifetime_value: format_decimal(lifetime_value),
            count_invoices: count_invoices.max(0),
            first_invoiced_at: None,
            last_invoiced_at: None,
            first_sale_amount: format_decimal(0.0),
            last_invoice_number: None,
            is_active: true,
            is_club_member: prospect.is_club_member,
            has_installation: false,
            provenance: prospect.provenance.clone(),
            raw: prospect.raw.clone(),
            review_flags: Vec::new(),
        })
    }

    pub fn with_invoice_span(
        mut self,
        first_invoiced_at: Option<NaiveDateTime>,
        last_invoiced_at: Option<NaiveDateTime>,
    ) -> Self {
        self.first_invoiced_at = first_invoiced_at;
        self.last_invoiced_at = last_invoiced_at;
        self
    }

    pub fn with_first_sale_amount(mut self, amount: Option<f64>) -> Self {
        self.first_sale_amount = format_decimal(amount.unwrap_or(0.0));
        self
    }

    pub fn with_last_invoice_number(mut self, number: Option<String>) -> Self {
        self.last_invoice_number = number;
        self
    }

    pub fn with_flags(mut self, is_active: bool, is_club_member: bool, has_installation: bool) -> Self {
        self.is_active = is_active;
        self.is_club_member = is_club_member;
        self.has_installation = has_installation;
        self
    }

    pub fn with_review_flags(mut self, flags: Vec<String>) -> Self {
        self.review_flags.extend(flags);
        self
    }

    /// Lifetime value as a number, for rule evaluation
    pub fn lifetime_value_amount(&self) -> f64 {
        self.lifetime_value.parse().unwrap_or(0.0)
    }
}

canonical_entity!(Customer, EntityKind::Customer, |c: &Customer| {
    !c.name.trim().is_empty() && !c.prospect_external_id.is_empty()
});
