// 🏗️ Parser Framework
// One parser per (legacy source format, canonical entity target).
//
// SourceFormat is a tagged variant carrying a small profile of per-format
// constants; the parsing itself lives in free functions, one submodule per
// source family. A physical file may be parsed several times, once per target
// (e.g. the invoice stream yields prospects and, separately, invoices).
//
// Parsing is pure: a raw row in, canonical records out. No I/O.

pub mod generic_ingest;
pub mod mail_manager;
pub mod mail_manager_life;

use crate::entities::Record;
use crate::error::{Result, UnificationError};
use crate::fields::{self, DateField, RawRow};
use crate::schema;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use crate::entities::EntityKind as EntityTarget;

// ============================================================================
// SOURCE FORMAT
// ============================================================================

/// Legacy line-of-business tools we ingest from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Direct-mail address-verification extract
    MailManager,

    /// Insurance / "life" book-of-business extract
    MailManagerLife,

    /// Generic invoice stream
    GenericIngestInvoices,

    /// Generic membership stream
    GenericIngestMembers,

    /// Generic prospect list
    GenericIngestProspects,
}

/// Constants that distinguish one source format from another
#[derive(Debug)]
pub struct FormatProfile {
    /// Short code stamped onto entities for provenance
    pub source_id: &'static str,

    /// Human-readable name
    pub source_name: &'static str,

    /// Reliable file-name heuristic, when one exists
    pub file_name_heuristic: Option<fn(&str) -> bool>,

    /// Entity targets this format can produce, primary first
    pub targets: &'static [EntityTarget],
}

static MAIL_MANAGER: FormatProfile = FormatProfile {
    source_id: "MM",
    source_name: "Mail Manager",
    file_name_heuristic: Some(mail_manager::matches_file_name),
    targets: &[
        EntityTarget::Prospect,
        EntityTarget::Address,
        EntityTarget::Customer,
        EntityTarget::MailPackage,
    ],
};

static MAIL_MANAGER_LIFE: FormatProfile = FormatProfile {
    source_id: "MML",
    source_name: "Mail Manager Life",
    file_name_heuristic: Some(mail_manager_life::matches_file_name),
    targets: &[
        EntityTarget::Prospect,
        EntityTarget::Address,
        EntityTarget::Customer,
        EntityTarget::Invoice,
    ],
};

static GENERIC_INVOICES: FormatProfile = FormatProfile {
    source_id: "GI-INV",
    source_name: "Generic Ingest Invoices",
    file_name_heuristic: None,
    targets: &[EntityTarget::Prospect, EntityTarget::Invoice],
};

static GENERIC_MEMBERS: FormatProfile = FormatProfile {
    source_id: "GI-MEM",
    source_name: "Generic Ingest Members",
    file_name_heuristic: None,
    targets: &[EntityTarget::Prospect],
};

static GENERIC_PROSPECTS: FormatProfile = FormatProfile {
    source_id: "GI-PRO",
    source_name: "Generic Ingest Prospects",
    file_name_heuristic: None,
    targets: &[EntityTarget::Prospect, EntityTarget::Address],
};

impl SourceFormat {
    pub fn all() -> [SourceFormat; 5] {
        [
            SourceFormat::MailManager,
            SourceFormat::MailManagerLife,
            SourceFormat::GenericIngestInvoices,
            SourceFormat::GenericIngestMembers,
            SourceFormat::GenericIngestProspects,
        ]
    }

    pub fn profile(&self) -> &'static FormatProfile {
        match self {
            SourceFormat::MailManager => &MAIL_MANAGER,
            SourceFormat::MailManagerLife => &MAIL_MANAGER_LIFE,
            SourceFormat::GenericIngestInvoices => &GENERIC_INVOICES,
            SourceFormat::GenericIngestMembers => &GENERIC_MEMBERS,
            SourceFormat::GenericIngestProspects => &GENERIC_PROSPECTS,
        }
    }

    /// Machine name used on the command line and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::MailManager => "mail_manager",
            SourceFormat::MailManagerLife => "mail_manager_life",
            SourceFormat::GenericIngestInvoices => "generic_invoices",
            SourceFormat::GenericIngestMembers => "generic_members",
            SourceFormat::GenericIngestProspects => "generic_prospects",
        }
    }

    pub fn source_id(&self) -> &'static str {
        self.profile().source_id
    }

    pub fn source_name(&self) -> &'static str {
        self.profile().source_name
    }

    pub fn targets(&self) -> &'static [EntityTarget] {
        self.profile().targets
    }

    pub fn supports(&self, target: EntityTarget) -> bool {
        self.targets().contains(&target)
    }

    /// Defaults to false when the format has no reliable heuristic
    pub fn has_matching_file_name(&self, file_name: &str) -> bool {
        self.profile()
            .file_name_heuristic
            .map(|heuristic| heuristic(&file_name.trim().to_lowercase()))
            .unwrap_or(false)
    }

    /// Required headers of one of this format's parsers
    fn required_headers(&self, target: EntityTarget) -> &'static [&'static str] {
        match self {
            SourceFormat::MailManager => mail_manager::required_headers(target),
            SourceFormat::MailManagerLife => mail_manager_life::required_headers(target),
            SourceFormat::GenericIngestInvoices
            | SourceFormat::GenericIngestMembers
            | SourceFormat::GenericIngestProspects => {
                generic_ingest::required_headers(*self, target)
            }
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

impl FromStr for SourceFormat {
    type Err = UnificationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        SourceFormat::all()
            .into_iter()
            .find(|f| f.as_str() == wanted || f.source_id().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UnificationError::UnknownFormat(s.to_string()))
    }
}

// ============================================================================
// PARSE OPTIONS
// ============================================================================

/// What to do with a historical date that is present but unparseable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidDatePolicy {
    /// Silently store null
    #[default]
    Null,

    /// Store null and leave a review flag on the entity
    Flag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub invalid_dates: InvalidDatePolicy,
}

// ============================================================================
// ROW CONTEXT
// ============================================================================

/// Per-row state handed to the family parse functions
pub(crate) struct RowContext<'a> {
    pub company: &'a str,
    pub format: SourceFormat,
    pub row: &'a RawRow,
    policy: InvalidDatePolicy,
    flags: Vec<String>,
}

impl<'a> RowContext<'a> {
    fn new(company: &'a str, format: SourceFormat, row: &'a RawRow, options: ParseOptions) -> Self {
        RowContext {
            company,
            format,
            row,
            policy: options.invalid_dates,
            flags: Vec::new(),
        }
    }

    pub fn field(&self, column: &str) -> Option<&'a str> {
        fields::field(self.row, column)
    }

    pub fn string(&self, column: &str) -> Option<String> {
        self.field(column).map(str::to_string)
    }

    pub fn coalesce(&self, columns: &[&str]) -> Option<&'a str> {
        fields::coalesce(self.row, columns)
    }

    pub fn boolean(&self, column: &str) -> bool {
        fields::boolean(self.field(column))
    }

    pub fn money(&self, column: &str) -> Option<f64> {
        fields::money(self.field(column))
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        fields::integer(self.field(column))
    }

    /// Date column; invalid values become None, flagged when the policy says so
    pub fn date(&mut self, column: &str) -> Option<NaiveDateTime> {
        match fields::parse_date(self.field(column)) {
            DateField::Parsed(value) => Some(value),
            DateField::Missing => None,
            DateField::Invalid(raw) => {
                if self.policy == InvalidDatePolicy::Flag {
                    self.flags.push(format!("invalid date in '{}': {}", column, raw));
                }
                None
            }
        }
    }

    /// Review flags gathered since the last call
    pub fn take_flags(&mut self) -> Vec<String> {
        std::mem::take(&mut self.flags)
    }

    pub fn raw(&self) -> RawRow {
        self.row.clone()
    }

    pub fn source_id(&self) -> &'static str {
        self.format.source_id()
    }

    pub fn source_name(&self) -> &'static str {
        self.format.source_name()
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// A concrete parser: one source format producing one entity target
#[derive(Debug, Clone)]
pub struct Parser {
    company: String,
    format: SourceFormat,
    target: EntityTarget,
    options: ParseOptions,
}

impl Parser {
    /// Fails when the format does not carry the requested entity
    pub fn new(
        company: &str,
        format: SourceFormat,
        target: EntityTarget,
        options: ParseOptions,
    ) -> Result<Self> {
        if !format.supports(target) {
            return Err(UnificationError::UnsupportedTarget {
                format: format.source_name().to_string(),
                target: target.to_string(),
            });
        }

        Ok(Parser {
            company: company.trim().to_string(),
            format,
            target,
            options,
        })
    }

    /// Every parser a format offers, in profile order
    pub fn all_for(company: &str, format: SourceFormat, options: ParseOptions) -> Vec<Parser> {
        format
            .targets()
            .iter()
            .map(|&target| Parser {
                company: company.trim().to_string(),
                format,
                target,
                options,
            })
            .collect()
    }

    /// "Mail Manager/address"
    pub fn name(&self) -> String {
        format!("{}/{}", self.format.source_name(), self.target)
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn target(&self) -> EntityTarget {
        self.target
    }

    /// Minimal column set the source file must contain
    pub fn required_headers(&self) -> &'static [&'static str] {
        self.format.required_headers(self.target)
    }

    pub fn source_id(&self) -> &'static str {
        self.format.source_id()
    }

    pub fn source_name(&self) -> &'static str {
        self.format.source_name()
    }

    pub fn has_matching_file_name(&self, file_name: &str) -> bool {
        self.format.has_matching_file_name(file_name)
    }

    /// Check a file's (sanitized) header row before any row is parsed
    pub fn validate_headers(&self, headers: &[String]) -> Result<()> {
        schema::validate_required(&self.name(), self.required_headers(), headers)
    }

    /// Parse one row into every record it yields for this target
    ///
    /// Prospect, address, customer and invoice targets yield zero or one
    /// record; mail packages fan out to one per populated mailing column.
    pub fn parse_records(&self, row: &RawRow) -> Vec<Record> {
        let mut ctx = RowContext::new(&self.company, self.format, row, self.options);

        match self.format {
            SourceFormat::MailManager => mail_manager::parse(&mut ctx, self.target),
            SourceFormat::MailManagerLife => mail_manager_life::parse(&mut ctx, self.target),
            SourceFormat::GenericIngestInvoices
            | SourceFormat::GenericIngestMembers
            | SourceFormat::GenericIngestProspects => {
                generic_ingest::parse(&mut ctx, self.target)
            }
        }
    }

    /// Parse one row into its single record (the first, for fan-out targets)
    pub fn parse_record(&self, row: &RawRow) -> Option<Record> {
        self.parse_records(row).into_iter().next()
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the source format of an unlabeled file
///
/// A format matches only when its file-name heuristic matches AND the
/// (sanitized) headers satisfy its primary parser. Formats without a
/// heuristic are never auto-detected.
pub fn detect_format(file_name: &Path, headers: &[String]) -> Result<SourceFormat> {
    let name = file_name
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    SourceFormat::all()
        .into_iter()
        .filter(|format| format.has_matching_file_name(name))
        .find(|format| {
            format
                .targets()
                .first()
                .map(|&primary| {
                    schema::missing_headers(format.required_headers(primary), headers).is_empty()
                })
                .unwrap_or(false)
        })
        .ok_or_else(|| UnificationError::UnknownFormat(name.to_string()))
}

/// Tag stamped on prospects from versioned feeds
pub(crate) fn version_tag(version: Option<&str>) -> Option<String> {
    version.map(|v| format!("v.{}", v.trim()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CanonicalEntity;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// A value every parser reads as meaningful for the given column
    fn sample_value(column: &str) -> String {
        match column {
            "ltv" | "numinvoices" | "numinv" | "total" | "lastamt" => "100".to_string(),
            "state" => "CA".to_string(),
            "zip" | "zip4" => "12345".to_string(),
            "mailing1" => "2024-03-01".to_string(),
            other => format!("{} value", other),
        }
    }

    #[test]
    fn test_source_format_profiles() {
        assert_eq!(SourceFormat::MailManager.source_id(), "MM");
        assert_eq!(SourceFormat::MailManagerLife.source_name(), "Mail Manager Life");
        assert!(SourceFormat::GenericIngestInvoices.supports(EntityTarget::Invoice));
        assert!(!SourceFormat::GenericIngestMembers.supports(EntityTarget::Invoice));
    }

    #[test]
    fn test_source_format_from_str() {
        assert_eq!(
            "mail-manager".parse::<SourceFormat>().unwrap(),
            SourceFormat::MailManager
        );
        assert_eq!("MML".parse::<SourceFormat>().unwrap(), SourceFormat::MailManagerLife);
        assert!(matches!(
            "quickbooks".parse::<SourceFormat>(),
            Err(UnificationError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_file_name_heuristics() {
        assert!(SourceFormat::MailManagerLife.has_matching_file_name("BOOK.DBF"));
        assert!(SourceFormat::MailManager.has_matching_file_name("mailmanager_march.csv"));
        assert!(SourceFormat::MailManager.has_matching_file_name("MM_export.csv"));
        assert!(!SourceFormat::MailManager.has_matching_file_name("mailmanager.dbf"));
        assert!(!SourceFormat::GenericIngestInvoices.has_matching_file_name("invoices.csv"));
    }

    #[test]
    fn test_parser_rejects_unsupported_target() {
        let result = Parser::new(
            "acme1",
            SourceFormat::GenericIngestMembers,
            EntityTarget::Invoice,
            ParseOptions::default(),
        );

        assert!(matches!(
            result,
            Err(UnificationError::UnsupportedTarget { .. })
        ));
    }

    #[test]
    fn test_validate_headers_reports_missing() {
        let parser = Parser::new(
            "acme1",
            SourceFormat::MailManager,
            EntityTarget::Address,
            ParseOptions::default(),
        )
        .unwrap();

        let err = parser
            .validate_headers(&headers(&["fullname", "dlvryaddrs", "state"]))
            .unwrap_err();

        match err {
            UnificationError::MissingHeaders { parser, missing } => {
                assert_eq!(parser, "Mail Manager/address");
                assert_eq!(missing, vec!["city".to_string(), "zip4".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_detect_format_needs_name_and_headers() {
        let mm_headers = headers(&["fullname", "dlvryaddrs", "city", "state", "zip4"]);

        assert_eq!(
            detect_format(Path::new("/tmp/mm_march.csv"), &mm_headers).unwrap(),
            SourceFormat::MailManager
        );
        // Right name, wrong headers
        assert!(detect_format(Path::new("mm_march.csv"), &headers(&["name"])).is_err());
        // Right headers, no heuristic
        assert!(detect_format(Path::new("march.csv"), &mm_headers).is_err());
    }

    #[test]
    fn test_required_headers_are_read_by_every_parser() {
        for format in SourceFormat::all() {
            for parser in Parser::all_for("acme1", format, ParseOptions::default()) {
                let full: RawRow = parser
                    .required_headers()
                    .iter()
                    .map(|h| (h.to_string(), sample_value(h)))
                    .collect();

                let summary = |row: &RawRow| -> Vec<(String, bool)> {
                    parser
                        .parse_records(row)
                        .iter()
                        .map(|r| (r.external_id().to_string(), r.is_valid()))
                        .collect()
                };
                let baseline = summary(&full);
                assert!(!baseline.is_empty(), "{} produced nothing", parser.name());

                for header in parser.required_headers() {
                    let mut reduced = full.clone();
                    reduced.remove(*header);
                    assert_ne!(
                        baseline,
                        summary(&reduced),
                        "{} ignores required header {}",
                        parser.name(),
                        header
                    );
                }
            }
        }
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let row: RawRow = [
            ("fullname", "John Doe"),
            ("dlvryaddrs", "123 Main St"),
            ("city", "Anytown"),
            ("state", "CA"),
            ("zip4", "12345"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for parser in Parser::all_for("acme1", SourceFormat::MailManager, ParseOptions::default()) {
            let first = parser.parse_records(&row);
            let second = parser.parse_records(&row);
            assert_eq!(first, second);
            for record in &first {
                assert!(!record.entity().key().is_empty());
            }
        }
    }

    #[test]
    fn test_invalid_date_policy_flag() {
        let row: RawRow = [
            ("fullname", "John Doe"),
            ("dlvryaddrs", "123 Main St"),
            ("city", "Anytown"),
            ("state", "CA"),
            ("zip4", "12345"),
            ("lastverified", "someday"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let silent = Parser::new("acme1", SourceFormat::MailManager, EntityTarget::Address, ParseOptions::default())
            .unwrap()
            .parse_record(&row)
            .unwrap();
        let flagged = Parser::new(
            "acme1",
            SourceFormat::MailManager,
            EntityTarget::Address,
            ParseOptions { invalid_dates: InvalidDatePolicy::Flag },
        )
        .unwrap()
        .parse_record(&row)
        .unwrap();

        assert!(!silent.is_flagged());
        assert!(flagged.is_flagged());
        assert_eq!(silent.external_id(), flagged.external_id());
    }
}
