// 📮 Mail Manager parsers
// Direct-mail address-verification extract (CSV).
//
// One row describes a verified household: name, delivery address, a little
// purchase history, and up to six mailing drops (mailing1..mailing6, with the
// matching package1..package6 names).

use super::{version_tag, EntityTarget, RowContext};
use crate::entities::{
    Address, AddressType, Customer, Location, MailPackage, PersonName, Prospect, ProspectDetails,
    Record,
};
use crate::fields::{extract_email, extract_invoice_number, extract_phone, income_floor, split_tags};

/// Mailing-date columns a row may fan out over
pub const MAX_DROPS: u8 = 6;

const PROSPECT_HEADERS: &[&str] = &["fullname", "dlvryaddrs", "city", "state", "zip4"];
const ADDRESS_HEADERS: &[&str] = &["dlvryaddrs", "city", "state", "zip4"];
const CUSTOMER_HEADERS: &[&str] = &["fullname", "dlvryaddrs", "city", "state", "zip4", "ltv"];
const MAIL_PACKAGE_HEADERS: &[&str] = &["mailing1"];

/// `.csv` files named after the tool ("mailmanager…") or with its "mm_" prefix
pub fn matches_file_name(name: &str) -> bool {
    name.ends_with(".csv") && (name.contains("mailmanager") || name.starts_with("mm_"))
}

pub fn required_headers(target: EntityTarget) -> &'static [&'static str] {
    match target {
        EntityTarget::Prospect => PROSPECT_HEADERS,
        EntityTarget::Address => ADDRESS_HEADERS,
        EntityTarget::Customer => CUSTOMER_HEADERS,
        EntityTarget::MailPackage => MAIL_PACKAGE_HEADERS,
        EntityTarget::Invoice => &[],
    }
}

pub(crate) fn parse(ctx: &mut RowContext<'_>, target: EntityTarget) -> Vec<Record> {
    match target {
        EntityTarget::Prospect => vec![Record::Prospect(prospect(ctx))],
        EntityTarget::Address => vec![Record::Address(address(ctx))],
        EntityTarget::Customer => customer(ctx).map(Record::Customer).into_iter().collect(),
        EntityTarget::MailPackage => mail_packages(ctx)
            .into_iter()
            .map(Record::MailPackage)
            .collect(),
        EntityTarget::Invoice => Vec::new(),
    }
}

// ============================================================================
// ENTITY BUILDERS
// ============================================================================

fn location(ctx: &RowContext<'_>) -> Location {
    Location::new(
        ctx.field("dlvryaddrs"),
        ctx.field("scndaddrs"),
        ctx.field("city"),
        ctx.field("state"),
        ctx.field("zip4"),
    )
}

fn prospect(ctx: &RowContext<'_>) -> Prospect {
    let name = PersonName::from_parts(
        ctx.field("fullname"),
        ctx.field("firstname"),
        ctx.field("lastname"),
    );

    let mut tags = split_tags(ctx.field("tag"));
    tags.extend(version_tag(ctx.field("version")));

    let details = ProspectDetails {
        age: ctx.integer("age"),
        year_built: ctx.integer("yearbuilt"),
        estimated_income: income_floor(ctx.field("estincome")),
        net_worth: None,
    };

    Prospect::new(ctx.company, name, location(ctx))
        .with_contact(
            extract_email(ctx.row, &["email"]),
            extract_phone(ctx.row, &["phone"]),
        )
        .with_suppression(ctx.boolean("dnm"), false)
        .with_status(true, ctx.boolean("deleted"))
        .with_club_member(ctx.boolean("member"))
        .with_tags(tags)
        .with_details(details)
        .with_provenance(ctx.source_id(), ctx.source_name())
        .with_raw(ctx.raw())
}

fn address(ctx: &mut RowContext<'_>) -> Address {
    let verified_at = ctx.date("lastverified");
    let prospect = prospect(ctx);

    Address::new(ctx.company, location(ctx))
        .with_prospect(&prospect.external_id)
        .with_classification(
            AddressType::from_indicator(ctx.field("business")),
            ctx.boolean("vacant"),
        )
        .with_verified_at(verified_at)
        .with_provenance(ctx.source_id(), ctx.source_name())
        .with_raw(ctx.raw())
        .with_review_flags(ctx.take_flags())
}

fn customer(ctx: &mut RowContext<'_>) -> Option<Customer> {
    let first_sale = ctx.date("firstsale");
    let last_sale = ctx.date("lastsale");
    let prospect = prospect(ctx);

    let customer = Customer::materialize(&prospect, ctx.money("ltv"), ctx.integer("numinvoices"))?
        .with_invoice_span(first_sale, last_sale)
        .with_last_invoice_number(extract_invoice_number(ctx.row, &["lastinvoice"]))
        .with_flags(!prospect.is_deleted, prospect.is_club_member, false)
        .with_review_flags(ctx.take_flags());

    Some(customer)
}

/// One package per populated mailing-date column; none is not an error
fn mail_packages(ctx: &mut RowContext<'_>) -> Vec<MailPackage> {
    let series_code = ctx.field("mailcode").unwrap_or(ctx.source_id()).to_string();
    let mut packages = Vec::new();

    for drop in 1..=MAX_DROPS {
        let column = format!("mailing{}", drop);
        if ctx.field(&column).is_none() {
            continue;
        }

        // Unnamed drops carry their mailing date so separate cycles stay apart
        let mailed_at = ctx.date(&column);
        let package_name = match (ctx.string(&format!("package{}", drop)), mailed_at) {
            (Some(name), _) => name,
            (None, Some(at)) => format!("Drop {} {}", drop, at.format("%Y-%m-%d")),
            (None, None) => format!("Drop {}", drop),
        };

        packages.push(
            MailPackage::new(ctx.company, &series_code, &package_name, drop)
                .with_mailed_at(mailed_at)
                .with_provenance(ctx.source_id(), ctx.source_name())
                .with_raw(ctx.raw())
                .with_review_flags(ctx.take_flags()),
        );
    }

    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CanonicalEntity;
    use crate::fields::RawRow;
    use crate::parser::{ParseOptions, Parser, SourceFormat};

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parser(target: EntityTarget) -> Parser {
        Parser::new("acme1", SourceFormat::MailManager, target, ParseOptions::default()).unwrap()
    }

    fn john_doe() -> RawRow {
        row(&[
            ("fullname", "John Doe"),
            ("dlvryaddrs", "123 Main St"),
            ("city", "Anytown"),
            ("state", "CA"),
            ("zip4", "12345"),
            ("yearbuilt", "1990"),
            ("deleted", "0"),
        ])
    }

    #[test]
    fn test_address_from_verification_row() {
        let record = parser(EntityTarget::Address).parse_record(&john_doe()).unwrap();
        let again = parser(EntityTarget::Address).parse_record(&john_doe()).unwrap();

        match &record {
            Record::Address(address) => {
                assert_eq!(address.location.address1.as_deref(), Some("123 Main St"));
                assert_eq!(address.location.postal_code.as_deref(), Some("12345"));
                assert!(!address.external_id.is_empty());
                assert!(address.is_valid());
                assert_eq!(address.address_type, AddressType::Residential);
            }
            other => panic!("expected address, got {:?}", other.kind()),
        }
        assert_eq!(record.external_id(), again.external_id());
    }

    #[test]
    fn test_address_links_to_prospect() {
        let prospect = parser(EntityTarget::Prospect).parse_record(&john_doe()).unwrap();
        let address = parser(EntityTarget::Address).parse_record(&john_doe()).unwrap();

        match address {
            Record::Address(a) => {
                assert_eq!(a.prospect_external_id.as_deref(), Some(prospect.external_id()))
            }
            other => panic!("expected address, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_prospect_fields() {
        let mut r = john_doe();
        r.insert("dnm".to_string(), "Yes".to_string());
        r.insert("tag".to_string(), "spring,hvac".to_string());
        r.insert("version".to_string(), "3".to_string());
        r.insert("estincome".to_string(), "$50,000 - $74,999".to_string());

        match parser(EntityTarget::Prospect).parse_record(&r).unwrap() {
            Record::Prospect(p) => {
                assert_eq!(p.name.first.as_deref(), Some("John"));
                assert_eq!(p.name.last.as_deref(), Some("Doe"));
                assert!(p.do_not_mail);
                assert!(!p.is_deleted);
                assert_eq!(p.tags, vec!["spring", "hvac", "v.3"]);
                assert_eq!(p.details.year_built, Some(1990));
                assert_eq!(p.details.estimated_income, Some(50000));
                assert_eq!(p.provenance.source_id, "MM");
                assert_eq!(p.raw.get("yearbuilt").map(String::as_str), Some("1990"));
            }
            other => panic!("expected prospect, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_customer_requires_purchase_history() {
        let mut r = john_doe();
        assert!(parser(EntityTarget::Customer).parse_record(&r).is_none());

        r.insert("ltv".to_string(), "$1,250.5".to_string());
        r.insert("numinvoices".to_string(), "2".to_string());
        r.insert("lastsale".to_string(), "2024-02-01".to_string());

        match parser(EntityTarget::Customer).parse_record(&r).unwrap() {
            Record::Customer(c) => {
                assert_eq!(c.lifetime_value, "1250.50");
                assert_eq!(c.count_invoices, 2);
                assert!(c.last_invoiced_at.is_some());
                assert!(c.first_invoiced_at.is_none());
            }
            other => panic!("expected customer, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_mail_packages_fan_out() {
        let mut r = john_doe();
        r.insert("mailcode".to_string(), "SPRING24".to_string());
        r.insert("mailing1".to_string(), "2024-03-01".to_string());
        r.insert("mailing3".to_string(), "2024-05-01".to_string());
        r.insert("package3".to_string(), "Postcard B".to_string());
        r.insert("mailing2".to_string(), "".to_string());

        let packages = parser(EntityTarget::MailPackage).parse_records(&r);
        assert_eq!(packages.len(), 2);

        match (&packages[0], &packages[1]) {
            (Record::MailPackage(first), Record::MailPackage(third)) => {
                assert_eq!(first.series_code, "SPRING24");
                assert_eq!(first.package_name, "Drop 1 2024-03-01");
                assert_eq!(first.drop_number, 1);
                assert_eq!(third.package_name, "Postcard B");
                assert_eq!(third.drop_number, 3);
                assert!(third.mailed_at.is_some());
            }
            _ => panic!("expected mail packages"),
        }
    }

    #[test]
    fn test_unnamed_drops_of_different_cycles_stay_apart() {
        let mut spring = john_doe();
        spring.insert("mailing1".to_string(), "2024-03-01".to_string());
        let mut fall = john_doe();
        fall.insert("mailing1".to_string(), "2024-09-01".to_string());

        let p = parser(EntityTarget::MailPackage);
        let a = p.parse_record(&spring).unwrap();
        let b = p.parse_record(&fall).unwrap();
        let again = p.parse_record(&spring).unwrap();

        assert_ne!(a.external_id(), b.external_id());
        assert_eq!(a.external_id(), again.external_id());
    }

    #[test]
    fn test_no_mailing_dates_means_no_packages() {
        assert!(parser(EntityTarget::MailPackage)
            .parse_records(&john_doe())
            .is_empty());
    }

    #[test]
    fn test_business_indicator() {
        let mut r = john_doe();
        r.insert("business".to_string(), "Y".to_string());
        r.insert("vacant".to_string(), "y".to_string());

        match parser(EntityTarget::Address).parse_record(&r).unwrap() {
            Record::Address(a) => {
                assert!(a.is_commercial());
                assert!(a.is_vacant);
            }
            other => panic!("expected address, got {:?}", other.kind()),
        }
    }
}
