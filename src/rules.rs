// 🏷️ Filter Rules - Rules as Data
// Which prospects/customers qualify for a mailing export.
//
// The registry is an explicit value built once and passed by reference; it is
// never looked up through global state. A FilterRequest names rules from the
// registry; compiling it validates every name up front so an unknown rule
// fails before a single record is streamed.

use crate::entities::Company;
use crate::error::{Result, UnificationError};
use crate::fields::postal_code_short;
use crate::source::ProspectRecord;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// Rule groups; a request picks at most one rule per group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGroup {
    CustomerInclusion,
    ClubMembersInclusion,
    CustomerInstallationsInclusion,
    AddressTypeInclusion,
}

impl RuleGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleGroup::CustomerInclusion => "customer_inclusion",
            RuleGroup::ClubMembersInclusion => "club_members_inclusion",
            RuleGroup::CustomerInstallationsInclusion => "customer_installations_inclusion",
            RuleGroup::AddressTypeInclusion => "address_type_inclusion",
        }
    }
}

/// What a rule selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePolicy {
    ActiveCustomersOnly,
    ProspectsOnly,
    ProspectsAndCustomers,
    ClubMembersOnly,
    ExcludeClubMembers,
    InstallationsOnly,
    ExcludeInstallations,
    ResidentialOnly,
    CommercialOnly,
    ResidentialAndCommercial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Name requests refer to (e.g. "include_prospects_only")
    pub name: String,
    pub group: RuleGroup,
    pub displayed_name: String,
    pub description: String,
    pub policy: RulePolicy,
}

impl FilterRule {
    pub fn new(
        name: &str,
        group: RuleGroup,
        displayed_name: &str,
        description: &str,
        policy: RulePolicy,
    ) -> Self {
        FilterRule {
            name: name.to_string(),
            group,
            displayed_name: displayed_name.to_string(),
            description: description.to_string(),
            policy,
        }
    }
}

// ============================================================================
// RULE REGISTRY
// ============================================================================

pub const INCLUDE_ACTIVE_CUSTOMERS_ONLY: &str = "include_active_customers_only";
pub const INCLUDE_PROSPECTS_ONLY: &str = "include_prospects_only";
pub const INCLUDE_PROSPECTS_AND_CUSTOMERS: &str = "include_prospects_and_customers";

/// Default ceiling offered for the "exclude customers with LTV greater than" rule
pub const CUSTOMER_MAX_LTV_DEFAULT: f64 = 5000.0;

#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<FilterRule>,
}

impl RuleRegistry {
    pub fn from_rules(rules: Vec<FilterRule>) -> Self {
        RuleRegistry { rules }
    }

    /// The standard rule table
    pub fn standard() -> Self {
        use RuleGroup::*;
        use RulePolicy::*;

        RuleRegistry::from_rules(vec![
            FilterRule::new(
                INCLUDE_ACTIVE_CUSTOMERS_ONLY,
                CustomerInclusion,
                "Active customers only",
                "Include active customers only, exclude prospects",
                ActiveCustomersOnly,
            ),
            FilterRule::new(
                INCLUDE_PROSPECTS_ONLY,
                CustomerInclusion,
                "Prospects only",
                "Include prospects only, exclude customers",
                ProspectsOnly,
            ),
            FilterRule::new(
                INCLUDE_PROSPECTS_AND_CUSTOMERS,
                CustomerInclusion,
                "Both customers and prospects",
                "Include both prospects and customers",
                ProspectsAndCustomers,
            ),
            FilterRule::new(
                "include_club_members_only",
                ClubMembersInclusion,
                "Include club members only",
                "Include customers with an active club membership only",
                ClubMembersOnly,
            ),
            FilterRule::new(
                "exclude_club_members",
                ClubMembersInclusion,
                "Exclude club members",
                "Exclude customers with an active club membership",
                ExcludeClubMembers,
            ),
            FilterRule::new(
                "include_customer_installations_only",
                CustomerInstallationsInclusion,
                "Include customer installations only",
                "Include customers with an installation only",
                InstallationsOnly,
            ),
            FilterRule::new(
                "exclude_customer_installations",
                CustomerInstallationsInclusion,
                "Exclude customer installations",
                "Exclude customers with an installation",
                ExcludeInstallations,
            ),
            FilterRule::new(
                "include_residential_only",
                AddressTypeInclusion,
                "Residential",
                "Include residential addresses only",
                ResidentialOnly,
            ),
            FilterRule::new(
                "include_commercial_only",
                AddressTypeInclusion,
                "Commercial",
                "Include commercial addresses only",
                CommercialOnly,
            ),
            FilterRule::new(
                "include_both_residential_and_commercial",
                AddressTypeInclusion,
                "Both residential and commercial",
                "Include residential and commercial addresses",
                ResidentialAndCommercial,
            ),
        ])
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn rules_in_group(&self, group: RuleGroup) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter().filter(move |r| r.group == group)
    }

    /// Fails with NotFound for an unregistered name
    pub fn find_rule_or_fail(&self, name: &str) -> Result<&FilterRule> {
        let wanted = name.trim();
        self.rules
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnificationError::RuleNotFound(name.to_string()))
    }

    /// Like [`find_rule_or_fail`](Self::find_rule_or_fail), but the rule must
    /// also belong to `group`
    pub fn find_in_group_or_fail(&self, group: RuleGroup, name: &str) -> Result<&FilterRule> {
        let rule = self.find_rule_or_fail(name)?;
        if rule.group == group {
            Ok(rule)
        } else {
            Err(UnificationError::RuleNotFound(format!(
                "{} (in {})",
                name,
                group.as_str()
            )))
        }
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }
}

// ============================================================================
// FILTER REQUEST
// ============================================================================

/// Inclusive calendar range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Filter request as it arrives from outside
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Company identifier (accounting id)
    pub intacct_id: String,
    pub inclusion_rule: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,

    #[serde(default)]
    pub club_members_rule: Option<String>,
    #[serde(default)]
    pub installations_rule: Option<String>,
    #[serde(default)]
    pub address_type_rule: Option<String>,

    #[serde(default)]
    pub customer_min_ltv: Option<f64>,
    #[serde(default)]
    pub customer_max_ltv: Option<f64>,
    #[serde(default)]
    pub prospect_min_age: Option<i64>,
    #[serde(default)]
    pub prospect_max_age: Option<i64>,
    #[serde(default)]
    pub home_min_age: Option<i64>,
    #[serde(default)]
    pub home_max_age: Option<i64>,
    #[serde(default)]
    pub min_estimated_income: Option<i64>,
    #[serde(default)]
    pub postal_codes: Vec<String>,
}

impl FilterRequest {
    pub fn new(intacct_id: &str, inclusion_rule: &str) -> Self {
        FilterRequest {
            intacct_id: intacct_id.to_string(),
            inclusion_rule: inclusion_rule.to_string(),
            ..FilterRequest::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange { start, end });
        self
    }

    pub fn with_club_members_rule(mut self, rule: &str) -> Self {
        self.club_members_rule = Some(rule.to_string());
        self
    }

    pub fn with_installations_rule(mut self, rule: &str) -> Self {
        self.installations_rule = Some(rule.to_string());
        self
    }

    pub fn with_address_type_rule(mut self, rule: &str) -> Self {
        self.address_type_rule = Some(rule.to_string());
        self
    }

    pub fn with_ltv_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.customer_min_ltv = min;
        self.customer_max_ltv = max;
        self
    }

    pub fn with_prospect_age(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.prospect_min_age = min;
        self.prospect_max_age = max;
        self
    }

    pub fn with_home_age(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.home_min_age = min;
        self.home_max_age = max;
        self
    }

    pub fn with_min_estimated_income(mut self, income: i64) -> Self {
        self.min_estimated_income = Some(income);
        self
    }

    pub fn with_postal_codes(mut self, postal_codes: Vec<String>) -> Self {
        self.postal_codes = postal_codes;
        self
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

/// Why a record did not qualify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    OtherCompany,
    Suppressed,
    NotMailable,
    TagMismatch,
    PostalCode,
    Inclusion,
    CustomerRule(&'static str),
    DetailsRule(&'static str),
    AddressType,
}

impl Exclusion {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Exclusion::OtherCompany => "other_company",
            Exclusion::Suppressed => "suppressed",
            Exclusion::NotMailable => "not_mailable",
            Exclusion::TagMismatch => "tag_mismatch",
            Exclusion::PostalCode => "postal_code",
            Exclusion::Inclusion => "inclusion",
            Exclusion::CustomerRule(rule) | Exclusion::DetailsRule(rule) => rule,
            Exclusion::AddressType => "address_type",
        }
    }
}

pub struct FilterRuleEngine<'r> {
    registry: &'r RuleRegistry,
}

impl<'r> FilterRuleEngine<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        FilterRuleEngine { registry }
    }

    /// Validate every rule named in `request` and resolve it against `company`
    pub fn compile(&self, company: &Company, request: &FilterRequest) -> Result<CompiledFilter> {
        let inclusion = self
            .registry
            .find_in_group_or_fail(RuleGroup::CustomerInclusion, &request.inclusion_rule)?;

        let optional = |group: RuleGroup, name: &Option<String>| -> Result<Option<RulePolicy>> {
            match name {
                Some(name) => Ok(Some(self.registry.find_in_group_or_fail(group, name)?.policy)),
                None => Ok(None),
            }
        };

        let postal_codes = request
            .postal_codes
            .iter()
            .filter_map(|p| postal_code_short(p))
            .collect();

        Ok(CompiledFilter {
            company: company.identifier.clone(),
            inclusion: inclusion.policy,
            inclusion_rule: inclusion.name.clone(),
            club_members: optional(RuleGroup::ClubMembersInclusion, &request.club_members_rule)?,
            installations: optional(
                RuleGroup::CustomerInstallationsInclusion,
                &request.installations_rule,
            )?,
            address_type: optional(RuleGroup::AddressTypeInclusion, &request.address_type_rule)?,
            tags: request.tags.clone(),
            date_range: request.date_range,
            customer_min_ltv: request.customer_min_ltv,
            customer_max_ltv: request.customer_max_ltv,
            prospect_min_age: request.prospect_min_age,
            prospect_max_age: request.prospect_max_age,
            home_min_age: request.home_min_age,
            home_max_age: request.home_max_age,
            min_estimated_income: request.min_estimated_income,
            postal_codes,
            current_year: i64::from(Utc::now().year()),
        })
    }
}

/// A validated filter, ready to evaluate records one at a time
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    company: String,
    inclusion: RulePolicy,
    inclusion_rule: String,
    club_members: Option<RulePolicy>,
    installations: Option<RulePolicy>,
    address_type: Option<RulePolicy>,
    tags: Vec<String>,
    date_range: Option<DateRange>,
    customer_min_ltv: Option<f64>,
    customer_max_ltv: Option<f64>,
    prospect_min_age: Option<i64>,
    prospect_max_age: Option<i64>,
    home_min_age: Option<i64>,
    home_max_age: Option<i64>,
    min_estimated_income: Option<i64>,
    postal_codes: Vec<String>,
    current_year: i64,
}

impl CompiledFilter {
    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn inclusion_rule(&self) -> &str {
        &self.inclusion_rule
    }

    /// Year home ages are measured against
    pub fn as_of_year(mut self, year: i64) -> Self {
        self.current_year = year;
        self
    }

    pub fn qualifies(&self, record: &ProspectRecord) -> bool {
        self.exclusion(record).is_none()
    }

    /// First reason `record` is excluded, or None when it qualifies
    pub fn exclusion(&self, record: &ProspectRecord) -> Option<Exclusion> {
        let prospect = &record.prospect;

        if !prospect.company.eq_ignore_ascii_case(&self.company) {
            return Some(Exclusion::OtherCompany);
        }

        // Hard excludes, whatever the inclusion rule says
        if prospect.do_not_mail || prospect.do_not_contact {
            return Some(Exclusion::Suppressed);
        }

        if !prospect.is_mailable() {
            return Some(Exclusion::NotMailable);
        }

        if !self.tags.is_empty() && !prospect.has_any_tag(&self.tags) {
            return Some(Exclusion::TagMismatch);
        }

        if !self.postal_codes.is_empty() {
            let allowed = prospect
                .postal_code_short
                .as_ref()
                .map(|p| self.postal_codes.contains(p))
                .unwrap_or(false);
            if !allowed {
                return Some(Exclusion::PostalCode);
            }
        }

        let is_customer = record
            .customer
            .as_ref()
            .map(|c| c.is_active)
            .unwrap_or(false);

        match self.inclusion {
            RulePolicy::ActiveCustomersOnly if !is_customer => return Some(Exclusion::Inclusion),
            RulePolicy::ProspectsOnly if record.customer.is_some() => {
                return Some(Exclusion::Inclusion)
            }
            _ => {}
        }

        if self.inclusion != RulePolicy::ProspectsOnly {
            if let Some(exclusion) = self.customer_exclusion(record) {
                return Some(exclusion);
            }
        }

        if self.inclusion != RulePolicy::ActiveCustomersOnly {
            if let Some(exclusion) = self.details_exclusion(record) {
                return Some(exclusion);
            }
        }

        self.address_exclusion(record)
    }

    /// Customer-scoped rules; a record without a customer passes them
    fn customer_exclusion(&self, record: &ProspectRecord) -> Option<Exclusion> {
        let customer = record.customer.as_ref()?;
        let ltv = customer.lifetime_value_amount();

        if self.customer_min_ltv.map(|min| ltv < min).unwrap_or(false) {
            return Some(Exclusion::CustomerRule("customer_min_ltv"));
        }

        if self.customer_max_ltv.map(|max| ltv > max).unwrap_or(false) {
            return Some(Exclusion::CustomerRule("customer_max_ltv"));
        }

        let is_member = customer.is_club_member || record.prospect.is_club_member;
        match self.club_members {
            Some(RulePolicy::ClubMembersOnly) if !is_member => {
                return Some(Exclusion::CustomerRule("club_members_inclusion"))
            }
            Some(RulePolicy::ExcludeClubMembers) if is_member => {
                return Some(Exclusion::CustomerRule("club_members_inclusion"))
            }
            _ => {}
        }

        match self.installations {
            Some(RulePolicy::InstallationsOnly) if !customer.has_installation => {
                return Some(Exclusion::CustomerRule("customer_installations_inclusion"))
            }
            Some(RulePolicy::ExcludeInstallations) if customer.has_installation => {
                return Some(Exclusion::CustomerRule("customer_installations_inclusion"))
            }
            _ => {}
        }

        if let Some(range) = &self.date_range {
            let in_range = customer
                .last_invoiced_at
                .map(|at| range.contains(at.date()))
                .unwrap_or(false);
            if !in_range {
                return Some(Exclusion::CustomerRule("date_range"));
            }
        }

        None
    }

    /// Demographic rules; a missing detail passes
    fn details_exclusion(&self, record: &ProspectRecord) -> Option<Exclusion> {
        let details = &record.prospect.details;

        if let Some(age) = details.age {
            if self.prospect_min_age.map(|min| age < min).unwrap_or(false) {
                return Some(Exclusion::DetailsRule("prospect_min_age"));
            }
            if self.prospect_max_age.map(|max| age > max).unwrap_or(false) {
                return Some(Exclusion::DetailsRule("prospect_max_age"));
            }
        }

        // An out-of-range year has no meaningful age and passes like a missing one
        if let Some(home_age) = details
            .year_built
            .and_then(|year_built| self.current_year.checked_sub(year_built))
        {
            if self.home_min_age.map(|min| home_age < min).unwrap_or(false) {
                return Some(Exclusion::DetailsRule("home_min_age"));
            }
            if self.home_max_age.map(|max| home_age > max).unwrap_or(false) {
                return Some(Exclusion::DetailsRule("home_max_age"));
            }
        }

        if let Some(income) = details.estimated_income {
            if self.min_estimated_income.map(|min| income < min).unwrap_or(false) {
                return Some(Exclusion::DetailsRule("min_estimated_income"));
            }
        }

        None
    }

    /// Records without an address count as residential
    fn address_exclusion(&self, record: &ProspectRecord) -> Option<Exclusion> {
        let commercial = record
            .address
            .as_ref()
            .map(|a| a.is_commercial())
            .unwrap_or(false);

        match self.address_type {
            Some(RulePolicy::ResidentialOnly) if commercial => Some(Exclusion::AddressType),
            Some(RulePolicy::CommercialOnly) if !commercial => Some(Exclusion::AddressType),
            _ => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
