// 📥 Generic ingest parsers
// CSV data streams shared by many field-service tools: invoices, memberships
// and plain prospect lists.
//
// The invoice stream is parsed twice over the same headers: once for the
// prospect behind each invoice, once for the invoice itself.

use super::{version_tag, EntityTarget, RowContext, SourceFormat};
use crate::entities::{Address, Invoice, Location, PersonName, Prospect, ProspectDetails, Record};
use crate::fields::{extract_email, extract_invoice_number, extract_phone, income_floor, split_tags};

const INVOICE_PROSPECT_HEADERS: &[&str] = &["customername", "street", "city", "state", "zip"];
const INVOICE_HEADERS: &[&str] = &["invoicenumber", "total"];
const MEMBER_HEADERS: &[&str] = &["customername", "street", "city", "state", "zip"];
const PROSPECT_HEADERS: &[&str] = &["firstname", "lastname", "street", "city", "state", "zip"];
const ADDRESS_HEADERS: &[&str] = &["street", "city", "state", "zip"];

const EMAIL_COLUMNS: &[&str] = &["email", "customeremail"];
const PHONE_COLUMNS: &[&str] = &["customerphonenumberprimary", "phone"];

pub fn required_headers(format: SourceFormat, target: EntityTarget) -> &'static [&'static str] {
    match (format, target) {
        (SourceFormat::GenericIngestInvoices, EntityTarget::Prospect) => INVOICE_PROSPECT_HEADERS,
        (SourceFormat::GenericIngestInvoices, EntityTarget::Invoice) => INVOICE_HEADERS,
        (SourceFormat::GenericIngestMembers, EntityTarget::Prospect) => MEMBER_HEADERS,
        (SourceFormat::GenericIngestProspects, EntityTarget::Prospect) => PROSPECT_HEADERS,
        (SourceFormat::GenericIngestProspects, EntityTarget::Address) => ADDRESS_HEADERS,
        _ => &[],
    }
}

pub(crate) fn parse(ctx: &mut RowContext<'_>, target: EntityTarget) -> Vec<Record> {
    match (ctx.format, target) {
        (SourceFormat::GenericIngestInvoices, EntityTarget::Prospect) => {
            vec![Record::Prospect(customer_prospect(ctx))]
        }
        (SourceFormat::GenericIngestInvoices, EntityTarget::Invoice) => {
            vec![Record::Invoice(invoice(ctx))]
        }
        (SourceFormat::GenericIngestMembers, EntityTarget::Prospect) => {
            vec![Record::Prospect(member_prospect(ctx))]
        }
        (SourceFormat::GenericIngestProspects, EntityTarget::Prospect) => {
            vec![Record::Prospect(listed_prospect(ctx))]
        }
        (SourceFormat::GenericIngestProspects, EntityTarget::Address) => {
            vec![Record::Address(address(ctx))]
        }
        _ => Vec::new(),
    }
}

// ============================================================================
// SHARED PIECES
// ============================================================================

fn location(ctx: &RowContext<'_>) -> Location {
    Location::new(
        ctx.field("street"),
        ctx.field("unit"),
        ctx.field("city"),
        ctx.field("state"),
        ctx.field("zip"),
    )
}

fn name(ctx: &RowContext<'_>, first: &str, last: &str) -> PersonName {
    PersonName::from_parts(ctx.field("customername"), ctx.field(first), ctx.field(last))
}

fn base_prospect(ctx: &RowContext<'_>, name: PersonName) -> Prospect {
    Prospect::new(ctx.company, name, location(ctx))
        .with_contact(
            extract_email(ctx.row, EMAIL_COLUMNS),
            extract_phone(ctx.row, PHONE_COLUMNS),
        )
        .with_provenance(ctx.source_id(), ctx.source_name())
        .with_raw(ctx.raw())
}

// ============================================================================
// INVOICE STREAM
// ============================================================================

fn customer_prospect(ctx: &RowContext<'_>) -> Prospect {
    base_prospect(ctx, name(ctx, "customerfirstname", "customerlastname"))
}

fn invoice(ctx: &mut RowContext<'_>) -> Invoice {
    let invoiced_at = ctx.date("firstappointment");
    let prospect = customer_prospect(ctx);
    let number = extract_invoice_number(ctx.row, &["invoicenumber"]);

    Invoice::new(
        ctx.company,
        number.as_deref(),
        ctx.coalesce(&["trade", "revenuetype"]),
        ctx.money("total").unwrap_or(0.0),
    )
    .with_amounts(ctx.money("subtotal"), ctx.money("tax"), ctx.money("balance"))
    .with_invoiced_at(invoiced_at)
    .with_job(
        ctx.string("jobnumber"),
        ctx.coalesce(&["summary", "jobtype"]).map(str::to_string),
    )
    .with_prospect(&prospect.external_id)
    .with_provenance(ctx.source_id(), ctx.source_name())
    .with_raw(ctx.raw())
    .with_review_flags(ctx.take_flags())
}

// ============================================================================
// MEMBERSHIP STREAM
// ============================================================================

fn member_prospect(ctx: &RowContext<'_>) -> Prospect {
    let active_status = ctx
        .field("currentstatus")
        .map(|s| s.eq_ignore_ascii_case("active"))
        .unwrap_or(false);

    base_prospect(ctx, name(ctx, "customerfirstname", "customerlastname"))
        .with_club_member(ctx.boolean("activemember") || active_status)
}

// ============================================================================
// PROSPECT LIST
// ============================================================================

fn listed_prospect(ctx: &RowContext<'_>) -> Prospect {
    let mut tags = split_tags(ctx.field("tag"));
    tags.extend(version_tag(ctx.field("version")));

    let details = ProspectDetails {
        age: ctx.integer("ageofindividual"),
        year_built: ctx.integer("yearhomebuilt"),
        estimated_income: income_floor(ctx.field("estincome")),
        net_worth: ctx.string("networthprem"),
    };

    base_prospect(ctx, name(ctx, "firstname", "lastname"))
        .with_suppression(ctx.boolean("donotmail"), ctx.boolean("donotcontact"))
        .with_tags(tags)
        .with_details(details)
}

fn address(ctx: &RowContext<'_>) -> Address {
    let prospect = listed_prospect(ctx);

    Address::new(ctx.company, location(ctx))
        .with_prospect(&prospect.external_id)
        .with_provenance(ctx.source_id(), ctx.source_name())
        .with_raw(ctx.raw())
}
