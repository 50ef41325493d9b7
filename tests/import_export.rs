// End-to-end: legacy file → SQLite store → campaign export

use prospect_unification::{
    write_csv, EntityKind, EntityTarget, ExportRequest, Exporter, FilterRequest, ImportOptions,
    Importer, ParseOptions, Parser, RuleRegistry, SourceFormat, SqliteStore, EXPORT_HEADER,
    INCLUDE_ACTIVE_CUSTOMERS_ONLY, INCLUDE_PROSPECTS_AND_CUSTOMERS, INCLUDE_PROSPECTS_ONLY,
};
use prospect_unification::{CanonicalEntity, CompanyDirectory, Record};
use std::fs;
use std::path::Path;

const MAIL_MANAGER_CSV: &str = "\
FullName,DlvryAddrs,City,State,Zip4,LTV,NumInvoices,LastSale
John Doe,123 Main St,Anytown,CA,12345,,,
Jane Roe,9 Elm St,Anytown,CA,12345,450.00,3,2024-02-01
Sam Poe,77 Oak Ave,Anytown,CA,12345-6789,1200,5,2023-11-15
";

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap().with_page_size(2);
    store.add_company("ACME1", "Acme Heating").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mm_spring.csv");
    fs::write(&path, MAIL_MANAGER_CSV).unwrap();

    let summary = Importer::new(&store, &store, ImportOptions::default())
        .import_file("ACME1", &path)
        .unwrap();

    assert_eq!(summary.format, SourceFormat::MailManager);
    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.inserted, 8);
    store
}

fn export(store: &SqliteStore, rule: &str) -> Vec<Vec<String>> {
    let registry = RuleRegistry::standard();
    let request = ExportRequest::new("J100", "5555550100", FilterRequest::new("ACME1", rule));

    Exporter::new(store, store, &registry)
        .export_company(&request)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_import_populates_every_table() {
    let store = seeded_store();

    assert_eq!(store.count(EntityKind::Prospect).unwrap(), 3);
    assert_eq!(store.count(EntityKind::Address).unwrap(), 3);
    assert_eq!(store.count(EntityKind::Customer).unwrap(), 2);
    assert_eq!(store.count(EntityKind::Invoice).unwrap(), 0);
}

#[test]
fn test_customers_only_export_yields_header_plus_two() {
    let store = seeded_store();
    let rows = export(&store, INCLUDE_ACTIVE_CUSTOMERS_ONLY);

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], EXPORT_HEADER.to_vec());
    assert!(rows[1..].iter().all(|r| r[13] == "customer"));
}

#[test]
fn test_inclusion_rules_partition_population() {
    let store = seeded_store();

    assert_eq!(export(&store, INCLUDE_PROSPECTS_ONLY).len(), 2);
    assert_eq!(export(&store, INCLUDE_PROSPECTS_AND_CUSTOMERS).len(), 4);
}

#[test]
fn test_reimport_is_idempotent() {
    let store = seeded_store();
    let options = ImportOptions::default().with_format(SourceFormat::MailManager);
    let second = Importer::new(&store, &store, options)
        .import_reader("ACME1", Path::new("upload.csv"), MAIL_MANAGER_CSV.as_bytes())
        .unwrap();

    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 8);
    assert_eq!(store.count(EntityKind::Prospect).unwrap(), 3);
}

#[test]
fn test_batch_export_and_csv_output() {
    let store = seeded_store();
    let acme = store.require("ACME1").unwrap();

    let prospect_ids: Vec<String> = export(&store, INCLUDE_PROSPECTS_AND_CUSTOMERS)
        .into_iter()
        .skip(1)
        .map(|row| row[4].clone())
        .collect();
    let batch = store.create_batch(&acme, 7, 2024, 12).unwrap();
    store.assign_batch(batch.id, &[prospect_ids[0].as_str()]).unwrap();

    let registry = RuleRegistry::standard();
    let request = ExportRequest::new(
        "J100",
        "5555550100",
        FilterRequest::new("ACME1", INCLUDE_PROSPECTS_AND_CUSTOMERS),
    );
    let rows = Exporter::new(&store, &store, &registry)
        .export_batch(&request, batch.id)
        .unwrap();

    let mut out = Vec::new();
    let written = write_csv(rows, &mut out).unwrap();
    assert_eq!(written, 2);

    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(EXPORT_HEADER.join(",").as_str()));
    let data = lines.next().unwrap();
    assert!(data.starts_with("J100,5555550100,7,ACME1,"));
    assert!(lines.next().is_none());
}

#[test]
fn test_address_row_parses_to_stable_identity() {
    let row: prospect_unification::fields::RawRow = [
        ("fullname", "John Doe"),
        ("dlvryaddrs", "123 Main St"),
        ("city", "Anytown"),
        ("state", "CA"),
        ("zip4", "12345"),
        ("yearbuilt", "1990"),
        ("deleted", "0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let parser = Parser::new(
        "ACME1",
        SourceFormat::MailManager,
        EntityTarget::Address,
        ParseOptions::default(),
    )
    .unwrap();

    let first = parser.parse_record(&row).unwrap();
    let second = parser.parse_record(&row).unwrap();

    match &first {
        Record::Address(address) => {
            assert_eq!(address.location.address1.as_deref(), Some("123 Main St"));
            assert_eq!(address.location.postal_code.as_deref(), Some("12345"));
            assert!(!address.external_id().is_empty());
            assert!(address.is_valid());
        }
        other => panic!("expected address, got {:?}", other.kind()),
    }
    assert_eq!(first.external_id(), second.external_id());
}
