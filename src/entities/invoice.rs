// 🧾 Invoice Entity
// Key: company | invoice number | trade name (or revenue type) | total
//
// One per legacy invoice row. `invoiced_at` is null when the source date
// is missing or unparseable.

use super::{canonical_entity, EntityKind, Provenance};
use crate::fields::{format_decimal, nullify, RawRow};
use crate::identity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub company: String,
    pub key: String,
    pub external_id: String,

    pub invoice_number: Option<String>,
    pub trade: Option<String>,

    /// Money fields are two-place decimal strings
    pub total: String,
    pub sub_total: String,
    pub tax: String,
    pub balance: String,

    pub invoiced_at: Option<NaiveDateTime>,
    pub job_number: Option<String>,
    pub description: Option<String>,
    pub prospect_external_id: Option<String>,

    pub provenance: Provenance,
    pub raw: RawRow,
    pub review_flags: Vec<String>,
}

impl Invoice {
    /// `trade` is the trade name, or the revenue type when there is none
    pub fn new(company: &str, invoice_number: Option<&str>, trade: Option<&str>, total: f64) -> Self {
        let invoice_number = invoice_number.and_then(nullify).map(str::to_string);
        let trade = trade.and_then(nullify).map(str::to_string);
        let total = format_decimal(total);

        let key = identity::compose_key(
            company,
            &[invoice_number.as_deref(), trade.as_deref(), Some(total.as_str())],
        );
        let external_id = identity::external_id(company, &key);

        Invoice {
            company: company.trim().to_string(),
            key,
            external_id,
            invoice_number,
            trade,
            total,
            sub_total: format_decimal(0.0),
            tax: format_decimal(0.0),
            balance: format_decimal(0.0),
            invoiced_at: None,
            job_number: None,
            description: None,
            prospect_external_id: None,
            provenance: Provenance::default(),
            raw: RawRow::new(),
            review_flags: Vec::new(),
        }
    }

    pub fn with_amounts(mut self, sub_total: Option<f64>, tax: Option<f64>, balance: Option<f64>) -> Self {
        self.sub_total = format_decimal(sub_total.unwrap_or(0.0));
        self.tax = format_decimal(tax.unwrap_or(0.0));
        self.balance = format_decimal(balance.unwrap_or(0.0));
        self
    }

    pub fn with_invoiced_at(mut self, invoiced_at: Option<NaiveDateTime>) -> Self {
        self.invoiced_at = invoiced_at;
        self
    }

    pub fn with_job(mut self, job_number: Option<String>, description: Option<String>) -> Self {
        self.job_number = job_number;
        self.description = description;
        self
    }

    pub fn with_prospect(mut self, prospect_external_id: &str) -> Self {
        self.prospect_external_id = Some(prospect_external_id.to_string());
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
}

canonical_entity!(Invoice, EntityKind::Invoice, |i: &Invoice| {
    i.invoice_number.is_some()
});
