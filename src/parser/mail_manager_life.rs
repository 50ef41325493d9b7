// 📒 Mail Manager Life parsers
// Book-of-business extract. Usually a dBASE table converted to rows upstream,
// sometimes re-exported as CSV.
//
// Single display name column, flat purchase history (one "last invoice" per
// row), and explicit do-not-mail / do-not-contact columns.

use super::{EntityTarget, RowContext};
use crate::entities::{Address, Customer, Invoice, Location, PersonName, Prospect, ProspectDetails, Record};
use crate::fields::{extract_email, extract_invoice_number, extract_phone};

const PROSPECT_HEADERS: &[&str] = &["name", "address", "city", "state", "zip"];
const ADDRESS_HEADERS: &[&str] = &["address", "city", "state", "zip"];
const CUSTOMER_HEADERS: &[&str] = &["name", "address", "city", "state", "zip", "ltv"];
const INVOICE_HEADERS: &[&str] = &["lastinvno", "lastamt"];

/// `.dbf` tables, or CSV re-exports with "life" in the name
pub fn matches_file_name(name: &str) -> bool {
    name.ends_with(".dbf") || (name.ends_with(".csv") && name.contains("life"))
}

pub fn required_headers(target: EntityTarget) -> &'static [&'static str] {
    match target {
        EntityTarget::Prospect => PROSPECT_HEADERS,
        EntityTarget::Address => ADDRESS_HEADERS,
        EntityTarget::Customer => CUSTOMER_HEADERS,
        EntityTarget::Invoice => INVOICE_HEADERS,
        EntityTarget::MailPackage => &[],
    }
}

pub(crate) fn parse(ctx: &mut RowContext<'_>, target: EntityTarget) -> Vec<Record> {
    match target {
        EntityTarget::Prospect => vec![Record::Prospect(prospect(ctx))],
        EntityTarget::Address => vec![Record::Address(address(ctx))],
        EntityTarget::Customer => customer(ctx).map(Record::Customer).into_iter().collect(),
        EntityTarget::Invoice => vec![Record::Invoice(invoice(ctx))],
        EntityTarget::MailPackage => Vec::new(),
    }
}

fn location(ctx: &RowContext<'_>) -> Location {
    Location::new(
        ctx.field("address"),
        ctx.field("address2"),
        ctx.field("city"),
        ctx.field("state"),
        ctx.field("zip"),
    )
}

fn prospect(ctx: &RowContext<'_>) -> Prospect {
    let details = ProspectDetails {
        year_built: ctx.integer("yearbuilt"),
        ..ProspectDetails::default()
    };

    Prospect::new(ctx.company, PersonName::from_full(ctx.field("name")), location(ctx))
        .with_contact(
            extract_email(ctx.row, &["email"]),
            extract_phone(ctx.row, &["phone"]),
        )
        .with_suppression(ctx.boolean("dnm"), ctx.boolean("dnc"))
        .with_status(true, ctx.boolean("deleted"))
        .with_club_member(ctx.boolean("member"))
        .with_details(details)
        .with_provenance(ctx.source_id(), ctx.source_name())
        .with_raw(ctx.raw())
}

fn address(ctx: &RowContext<'_>) -> Address {
    let prospect = prospect(ctx);

    Address::new(ctx.company, location(ctx))
        .with_prospect(&prospect.external_id)
        .with_provenance(ctx.source_id(), ctx.source_name())
        .with_raw(ctx.raw())
}

fn customer(ctx: &mut RowContext<'_>) -> Option<Customer> {
    let first_sale = ctx.date("firstsale");
    let last_sale = ctx.date("lastsale");
    let prospect = prospect(ctx);

    let customer = Customer::materialize(&prospect, ctx.money("ltv"), ctx.integer("numinv"))?
        .with_invoice_span(first_sale, last_sale)
        .with_first_sale_amount(ctx.money("firstamt"))
        .with_last_invoice_number(extract_invoice_number(ctx.row, &["lastinvno"]))
        .with_flags(
            !prospect.is_deleted,
            prospect.is_club_member,
            ctx.boolean("install"),
        )
        .with_review_flags(ctx.take_flags());

    Some(customer)
}

/// The row's last invoice; the sale date doubles as the invoice date
fn invoice(ctx: &mut RowContext<'_>) -> Invoice {
    let invoiced_at = ctx.date("lastsale");
    let prospect = prospect(ctx);
    let number = extract_invoice_number(ctx.row, &["lastinvno"]);

    Invoice::new(
        ctx.company,
        number.as_deref(),
        ctx.field("trade"),
        ctx.money("lastamt").unwrap_or(0.0),
    )
    .with_amounts(ctx.money("lastamt"), None, None)
    .with_invoiced_at(invoiced_at)
    .with_prospect(&prospect.external_id)
    .with_provenance(ctx.source_id(), ctx.source_name())
    .with_raw(ctx.raw())
    .with_review_flags(ctx.take_flags())
}
