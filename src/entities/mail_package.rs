// 📬 Mail Package Entity
// Key: company | mailing series code | package name
//
// A single source row fans out into one package per populated mailing-date
// column.

use super::{canonical_entity, EntityKind, Provenance};
use crate::fields::{nullify, RawRow};
use crate::identity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailPackage {
    pub company: String,
    pub key: String,
    pub external_id: String,

    pub series_code: String,
    pub package_name: String,

    /// 1-based position of the mailing-date column that produced this package
    pub drop_number: u8,
    pub mailed_at: Option<NaiveDateTime>,

    pub provenance: Provenance,
    pub raw: RawRow,
    pub review_flags: Vec<String>,
}

impl MailPackage {
    pub fn new(company: &str, series_code: &str, package_name: &str, drop_number: u8) -> Self {
        let series_code = nullify(series_code).unwrap_or_default().to_string();
        let package_name = nullify(package_name).unwrap_or_default().to_string();

        let key = identity::compose_key(
            company,
            &[Some(series_code.as_str()), Some(package_name.as_str())],
        );
        let external_id = identity::external_id(company, &key);

        MailPackage {
            company: company.trim().to_string(),
            key,
            external_id,
            series_code,
            package_name,
            drop_number,
            mailed_at: None,
            provenance: Provenance::default(),
            raw: RawRow::new(),
            review_flags: Vec::new(),
        }
    }

    pub fn with_mailed_at(mut self, mailed_at: Option<NaiveDateTime>) -> Self {
        self.mailed_at = mailed_at;
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

canonical_entity!(MailPackage, EntityKind::MailPackage, |m: &MailPackage| {
    !m.series_code.is_empty() && !m.package_name.is_empty()
});
