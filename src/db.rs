// 🗄️ SQLite store
// Canonical records persisted one table per entity kind, keyed by external id.
//
// Every table carries the same spine (external_id UNIQUE, company, key,
// payload JSON); link columns tie addresses, customers and invoices back to
// their prospect. The record source pages prospects by rowid so an export
// never holds more than one page in memory.

use crate::entities::{CanonicalEntity, Company, EntityKind, Prospect, Record};
use crate::error::{Result, UnificationError};
use crate::source::{
    BatchRef, CompanyDirectory, ProspectRecord, RecordSink, RecordSource, RecordStream, Selection,
    UpsertOutcome,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 500;

pub fn setup_database(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Companies
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT UNIQUE NOT NULL COLLATE NOCASE,
            name TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Canonical entities (same spine, one table per kind)
    // ==========================================================================
    for kind in EntityKind::all() {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id TEXT UNIQUE NOT NULL,
                    company TEXT NOT NULL COLLATE NOCASE,
                    key TEXT NOT NULL,
                    prospect_external_id TEXT,
                    source_id TEXT,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                table_for(kind)
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_company ON {table}(company)",
                table = table_for(kind)
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_prospect ON {table}(prospect_external_id)",
                table = table_for(kind)
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Campaign batches
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(id),
            number INTEGER NOT NULL,
            year INTEGER NOT NULL,
            week INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_prospects (
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            prospect_external_id TEXT NOT NULL,
            PRIMARY KEY (batch_id, prospect_external_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_prospects_prospect ON batch_prospects(prospect_external_id)",
        [],
    )?;

    Ok(())
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Prospect => "prospects",
        EntityKind::Address => "addresses",
        EntityKind::Customer => "customers",
        EntityKind::Invoice => "invoices",
        EntityKind::MailPackage => "mail_packages",
    }
}

/// Prospect a dependent record points back to
fn prospect_link(record: &Record) -> Option<&str> {
    match record {
        Record::Address(a) => a.prospect_external_id.as_deref(),
        Record::Customer(c) => Some(c.prospect_external_id.as_str()),
        Record::Invoice(i) => i.prospect_external_id.as_deref(),
        Record::Prospect(_) | Record::MailPackage(_) => None,
    }
}

fn source_of(record: &Record) -> Option<&str> {
    let source = match record {
        Record::Prospect(p) => &p.provenance.source_id,
        Record::Address(a) => &a.provenance.source_id,
        Record::Customer(c) => &c.provenance.source_id,
        Record::Invoice(i) => &i.provenance.source_id,
        Record::MailPackage(m) => &m.provenance.source_id,
    };
    if source.is_empty() {
        None
    } else {
        Some(source.as_str())
    }
}

// ============================================================================
// STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
    page_size: usize,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL for crash recovery on file-backed stores
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Rows fetched per page by the record source (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------------
    // Companies
    // ------------------------------------------------------------------------

    /// Register a company; an existing identifier is returned unchanged
    pub fn add_company(&self, identifier: &str, name: &str) -> Result<Company> {
        self.conn.execute(
            "INSERT OR IGNORE INTO companies (identifier, name) VALUES (?1, ?2)",
            params![identifier.trim(), name.trim()],
        )?;

        self.require(identifier)
    }

    pub fn companies(&self) -> Result<Vec<Company>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, identifier, name FROM companies ORDER BY id")?;

        let companies = stmt
            .query_map([], |row| {
                Ok(Company {
                    id: row.get(0)?,
                    identifier: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(companies)
    }

    // ------------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------------

    pub fn create_batch(&self, company: &Company, number: i64, year: i32, week: u32) -> Result<BatchRef> {
        self.conn.execute(
            "INSERT INTO batches (company_id, number, year, week) VALUES (?1, ?2, ?3, ?4)",
            params![company.id, number, year, week],
        )?;

        Ok(BatchRef {
            id: self.conn.last_insert_rowid(),
            number,
            year,
            week,
        })
    }

    /// Assign prospects (by external id) to a batch; returns newly assigned count
    pub fn assign_batch(&self, batch_id: i64, prospect_ids: &[&str]) -> Result<usize> {
        let mut assigned = 0;
        for id in prospect_ids {
            assigned += self.conn.execute(
                "INSERT OR IGNORE INTO batch_prospects (batch_id, prospect_external_id) VALUES (?1, ?2)",
                params![batch_id, id],
            )?;
        }
        Ok(assigned)
    }

    fn batches_of(&self, prospect_id: &str) -> Result<Vec<BatchRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.number, b.year, b.week
             FROM batches b
             JOIN batch_prospects bp ON bp.batch_id = b.id
             WHERE bp.prospect_external_id = ?1
             ORDER BY b.id DESC",
        )?;

        let batches = stmt
            .query_map(params![prospect_id], |row| {
                Ok(BatchRef {
                    id: row.get(0)?,
                    number: row.get(1)?,
                    year: row.get(2)?,
                    week: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(batches)
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table_for(kind)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn get(&self, kind: EntityKind, external_id: &str) -> Result<Option<Record>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT payload FROM {} WHERE external_id = ?1", table_for(kind)),
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str::<Record>(&p))
            .transpose()
            .map_err(UnificationError::from)
    }

    /// Most recent record of `kind` linked to a prospect
    fn linked(&self, kind: EntityKind, prospect_id: &str) -> Result<Option<Record>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT payload FROM {} WHERE prospect_external_id = ?1 ORDER BY id DESC LIMIT 1",
                    table_for(kind)
                ),
                params![prospect_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match payload {
            Some(p) => Some(serde_json::from_str::<Record>(&p)?),
            None => None,
        })
    }

    fn prospect_page(&self, company: &str, after: i64) -> Result<Vec<(i64, Prospect)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload FROM prospects
             WHERE company = ?1 AND id > ?2
             ORDER BY id
             LIMIT ?3",
        )?;

        let rows = stmt
            .query_map(params![company, after, self.page_size as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut page = Vec::with_capacity(rows.len());
        for (id, payload) in rows {
            match serde_json::from_str::<Record>(&payload)? {
                Record::Prospect(p) => page.push((id, p)),
                other => debug!(
                    external_id = other.external_id(),
                    kind = other.kind().as_str(),
                    "non-prospect payload in prospects table"
                ),
            }
        }
        Ok(page)
    }

    fn join(&self, prospect: Prospect, selection: &Selection) -> Result<Option<ProspectRecord>> {
        let batches = self.batches_of(&prospect.external_id)?;
        let batch = batches.into_iter().find(|b| selection.includes(Some(b)));

        if batch.is_none() && !selection.includes(None) {
            return Ok(None);
        }

        let mut record = ProspectRecord::new(prospect);
        record.batch = batch;

        if let Some(Record::Customer(c)) = self.linked(EntityKind::Customer, &record.prospect.external_id)? {
            record.customer = Some(c);
        }
        if let Some(Record::Address(a)) = self.linked(EntityKind::Address, &record.prospect.external_id)? {
            record.address = Some(a);
        }

        Ok(Some(record))
    }
}

impl CompanyDirectory for SqliteStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Company>> {
        let company = self
            .conn
            .query_row(
                "SELECT id, identifier, name FROM companies WHERE identifier = ?1",
                params![identifier.trim()],
                |row| {
                    Ok(Company {
                        id: row.get(0)?,
                        identifier: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(company)
    }
}

impl RecordSink for SqliteStore {
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome> {
        let table = table_for(record.kind());
        let entity = record.entity();

        let exists = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE external_id = ?1", table),
                params![entity.external_id()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let payload = serde_json::to_string(record)?;

        self.conn.execute(
            &format!(
                "INSERT INTO {} (external_id, company, key, prospect_external_id, source_id, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(external_id) DO UPDATE SET
                    company = excluded.company,
                    key = excluded.key,
                    prospect_external_id = excluded.prospect_external_id,
                    source_id = excluded.source_id,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                table
            ),
            params![
                entity.external_id(),
                entity.company(),
                entity.key(),
                prospect_link(record),
                source_of(record),
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }
}

impl RecordSource for SqliteStore {
    fn stream<'a>(&'a self, company: &Company, selection: &Selection) -> Result<RecordStream<'a>> {
        Ok(Box::new(PagedProspects {
            store: self,
            company: company.identifier.clone(),
            selection: selection.clone(),
            last_id: 0,
            page: VecDeque::new(),
            exhausted: false,
        }))
    }
}

// ============================================================================
// PAGED STREAM
// ============================================================================

/// Forward-only keyset pager over a company's prospects
struct PagedProspects<'a> {
    store: &'a SqliteStore,
    company: String,
    selection: Selection,
    last_id: i64,
    page: VecDeque<Prospect>,
    exhausted: bool,
}

impl<'a> PagedProspects<'a> {
    fn refill(&mut self) -> Result<()> {
        let page = self.store.prospect_page(&self.company, self.last_id)?;

        if page.len() < self.store.page_size {
            self.exhausted = true;
        }
        if let Some((id, _)) = page.last() {
            self.last_id = *id;
        }

        self.page.extend(page.into_iter().map(|(_, p)| p));
        Ok(())
    }
}

impl<'a> Iterator for PagedProspects<'a> {
    type Item = Result<ProspectRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page.is_empty() {
                if self.exhausted {
                    return None;
                }
                if let Err(e) = self.refill() {
                    self.exhausted = true;
                    return Some(Err(e));
                }
                continue;
            }

            let prospect = self.page.pop_front()?;
            match self.store.join(prospect, &self.selection) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.exhausted = true;
                    self.page.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Address, Customer, Location, PersonName};

    fn prospect(company: &str, name: &str) -> Prospect {
        Prospect::new(
            company,
            PersonName::from_full(Some(name)),
            Location::new(Some("1 Main St"), None, Some("Mesa"), Some("AZ"), Some("85201")),
        )
    }

    fn collect(store: &SqliteStore, company: &Company, selection: Selection) -> Vec<ProspectRecord> {
        store
            .stream(company, &selection)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_idempotency_import_twice() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records = vec![
            Record::Prospect(prospect("ACME1", "John Doe")),
            Record::Prospect(prospect("ACME1", "Jane Roe")),
        ];

        for r in &records {
            assert_eq!(store.upsert(r).unwrap(), UpsertOutcome::Inserted);
        }
        for r in &records {
            assert_eq!(store.upsert(r).unwrap(), UpsertOutcome::Updated);
        }

        assert_eq!(store.count(EntityKind::Prospect).unwrap(), 2);
    }

    #[test]
    fn test_upsert_replaces_payload() {
        let store = SqliteStore::open_in_memory().unwrap();
        let before = prospect("ACME1", "John Doe");
        let after = prospect("ACME1", "John Doe").with_suppression(true, false);

        store.upsert(&Record::Prospect(before.clone())).unwrap();
        store.upsert(&Record::Prospect(after)).unwrap();

        match store.get(EntityKind::Prospect, &before.external_id).unwrap() {
            Some(Record::Prospect(p)) => assert!(p.do_not_mail),
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.get(EntityKind::Prospect, "missing").unwrap().is_none());
    }

    #[test]
    fn test_company_directory() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.add_company("ACME1", "Acme").unwrap();
        let again = store.add_company("acme1", "Other Name").unwrap();

        assert_eq!(first, again);
        assert_eq!(store.companies().unwrap().len(), 1);
        assert!(store.find_by_identifier(" Acme1 ").unwrap().is_some());
        assert!(matches!(
            store.require("GHOST"),
            Err(UnificationError::CompanyNotFound(_))
        ));
    }

    #[test]
    fn test_punctuation_variant_tenants_never_merge() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dashed = store.add_company("A-1", "Dash Heating").unwrap();
        let dotted = store.add_company("A.1", "Dot Cooling").unwrap();
        assert_ne!(dashed.id, dotted.id);

        let first = Record::Prospect(prospect("A-1", "John Doe"));
        let second = Record::Prospect(prospect("A.1", "John Doe"));
        assert_ne!(first.external_id(), second.external_id());

        assert_eq!(store.upsert(&first).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&second).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.count(EntityKind::Prospect).unwrap(), 2);

        assert_eq!(collect(&store, &dashed, Selection::Company).len(), 1);
        assert_eq!(collect(&store, &dotted, Selection::Company).len(), 1);
    }

    #[test]
    fn test_stream_pages_through_everything() {
        let store = SqliteStore::open_in_memory().unwrap().with_page_size(2);
        let acme = store.add_company("ACME1", "Acme").unwrap();

        for name in ["Ann A", "Bob B", "Cy C", "Di D", "Ed E"] {
            store.upsert(&Record::Prospect(prospect("ACME1", name))).unwrap();
        }
        store.upsert(&Record::Prospect(prospect("OTHER", "Zed Z"))).unwrap();

        let records = collect(&store, &acme, Selection::Company);
        let names: Vec<_> = records
            .iter()
            .map(|r| r.prospect.name.full.clone().unwrap_or_default())
            .collect();

        assert_eq!(names, vec!["Ann A", "Bob B", "Cy C", "Di D", "Ed E"]);
    }

    #[test]
    fn test_stream_joins_customer_and_address() {
        let store = SqliteStore::open_in_memory().unwrap();
        let acme = store.add_company("ACME1", "Acme").unwrap();

        let john = prospect("ACME1", "John Doe");
        let customer = Customer::materialize(&john, Some(250.0), Some(2)).unwrap();
        let address = Address::new("ACME1", john.location.clone()).with_prospect(&john.external_id);

        store.upsert(&Record::Prospect(john)).unwrap();
        store.upsert(&Record::Customer(customer)).unwrap();
        store.upsert(&Record::Address(address)).unwrap();

        let records = collect(&store, &acme, Selection::Company);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_customer());
        assert!(records[0].address.is_some());
        assert!(records[0].batch.is_none());
    }

    #[test]
    fn test_stream_by_batch_and_weeks() {
        let store = SqliteStore::open_in_memory().unwrap();
        let acme = store.add_company("ACME1", "Acme").unwrap();

        let a = prospect("ACME1", "Ann A");
        let b = prospect("ACME1", "Bob B");
        store.upsert(&Record::Prospect(a.clone())).unwrap();
        store.upsert(&Record::Prospect(b)).unwrap();

        let batch = store.create_batch(&acme, 1, 2024, 12).unwrap();
        assert_eq!(store.assign_batch(batch.id, &[a.external_id.as_str()]).unwrap(), 1);
        assert_eq!(store.assign_batch(batch.id, &[a.external_id.as_str()]).unwrap(), 0);

        assert_eq!(collect(&store, &acme, Selection::Company).len(), 2);

        let in_batch = collect(&store, &acme, Selection::Batch(batch.id));
        assert_eq!(in_batch.len(), 1);
        assert_eq!(in_batch[0].batch, Some(batch));

        assert_eq!(collect(&store, &acme, Selection::Batch(batch.id + 1)).len(), 0);
        assert_eq!(
            collect(&store, &acme, Selection::Weeks { year: 2024, weeks: vec![12, 13] }).len(),
            1
        );
        assert_eq!(
            collect(&store, &acme, Selection::Weeks { year: 2024, weeks: vec![1] }).len(),
            0
        );
    }
}
