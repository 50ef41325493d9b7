// 🔌 Collaborator seams
// The narrow interfaces the core consumes and produces:
//
// - RecordSource:     upstream population walked by the export generators
// - CompanyDirectory: company identifier → company scope
// - RecordSink:       upsert by external id
//
// Plus an in-memory store implementing all three, used by tests and small runs.

use crate::entities::{Address, CanonicalEntity, Company, CompanyRegistry, Customer, Prospect, Record};
use crate::error::{Result, UnificationError};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

// ============================================================================
// EXPORT POPULATION
// ============================================================================

/// Campaign batch a prospect was assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRef {
    pub id: i64,
    pub number: i64,
    pub year: i32,
    pub week: u32,
}

/// A prospect with whatever was parsed alongside it
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectRecord {
    pub prospect: Prospect,
    pub customer: Option<Customer>,
    pub address: Option<Address>,
    pub batch: Option<BatchRef>,
}

impl ProspectRecord {
    pub fn new(prospect: Prospect) -> Self {
        ProspectRecord {
            prospect,
            customer: None,
            address: None,
            batch: None,
        }
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_batch(mut self, batch: BatchRef) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn is_customer(&self) -> bool {
        self.customer.as_ref().map(|c| c.is_active).unwrap_or(false)
    }
}

/// Which slice of a company's population to walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One campaign batch
    Batch(i64),

    /// Every prospect of the company
    Company,

    /// Every batch falling in the given calendar weeks of `year`
    Weeks { year: i32, weeks: Vec<u32> },
}

impl Selection {
    pub fn describe(&self) -> String {
        match self {
            Selection::Batch(id) => format!("batch {}", id),
            Selection::Company => "company".to_string(),
            Selection::Weeks { year, weeks } => format!(
                "{} weeks {}",
                year,
                weeks
                    .iter()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    pub fn includes(&self, batch: Option<&BatchRef>) -> bool {
        match (self, batch) {
            (Selection::Company, _) => true,
            (Selection::Batch(id), Some(b)) => b.id == *id,
            (Selection::Weeks { year, weeks }, Some(b)) => b.year == *year && weeks.contains(&b.week),
            _ => false,
        }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// Lazy, single forward pass over a population
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<ProspectRecord>> + 'a>;

pub trait RecordSource {
    /// Open a forward-only stream over `company`'s records matching `selection`
    fn stream<'a>(&'a self, company: &Company, selection: &Selection) -> Result<RecordStream<'a>>;
}

pub trait CompanyDirectory {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Company>>;

    /// Resolve or fail with NotFound
    fn require(&self, identifier: &str) -> Result<Company> {
        self.find_by_identifier(identifier)?
            .ok_or_else(|| UnificationError::CompanyNotFound(identifier.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

pub trait RecordSink {
    /// Insert, or replace the record already stored under the same external id
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome>;
}

impl CompanyDirectory for CompanyRegistry {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Company>> {
        Ok(self.find(identifier))
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    companies: CompanyRegistry,
    records: RwLock<Vec<Record>>,
    batches: RwLock<Vec<(BatchRef, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn add_company(&self, identifier: &str, name: &str) -> Company {
        self.companies.register(identifier, name)
    }

    /// Assign prospects (by external id) to a batch
    pub fn assign_batch(&self, batch: BatchRef, prospect_ids: &[&str]) {
        let mut batches = self
            .batches
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for id in prospect_ids {
            batches.push((batch, id.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, external_id: &str) -> Option<Record> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|r| r.external_id() == external_id)
            .cloned()
    }

    fn joined(&self, prospect: &Prospect) -> ProspectRecord {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut joined = ProspectRecord::new(prospect.clone());
        for record in records.iter() {
            match record {
                Record::Customer(c) if c.prospect_external_id == prospect.external_id => {
                    joined.customer = Some(c.clone());
                }
                Record::Address(a)
                    if a.prospect_external_id.as_deref() == Some(prospect.external_id.as_str()) =>
                {
                    joined.address = Some(a.clone());
                }
                _ => {}
            }
        }
        joined
    }

    /// Every batch the prospect was assigned to, in assignment order
    fn batches_of(&self, prospect_id: &str) -> Vec<BatchRef> {
        self.batches
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(_, id)| id == prospect_id)
            .map(|(batch, _)| *batch)
            .collect()
    }
}

impl CompanyDirectory for MemoryStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Company>> {
        Ok(self.companies.find(identifier))
    }
}

impl RecordSink for MemoryStore {
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match records
            .iter_mut()
            .find(|r| r.external_id() == record.external_id())
        {
            Some(existing) => {
                *existing = record.clone();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                records.push(record.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }
}

impl RecordSource for MemoryStore {
    fn stream<'a>(&'a self, company: &Company, selection: &Selection) -> Result<RecordStream<'a>> {
        let prospects: Vec<Prospect> = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter_map(|r| match r {
                Record::Prospect(p) if company.matches(p.company()) => Some(p.clone()),
                _ => None,
            })
            .collect();

        let selection = selection.clone();
        Ok(Box::new(prospects.into_iter().filter_map(move |prospect| {
            let batch = self
                .batches_of(&prospect.external_id)
                .into_iter()
                .find(|b| selection.includes(Some(b)));
            if batch.is_none() && !selection.includes(None) {
                return None;
            }

            let mut record = self.joined(&prospect);
            record.batch = batch;
            Some(Ok(record))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Location, PersonName};

    fn prospect(company: &str, name: &str) -> Prospect {
        Prospect::new(
            company,
            PersonName::from_full(Some(name)),
            Location::new(Some("1 Main St"), None, Some("Mesa"), Some("AZ"), Some("85201")),
        )
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let store = MemoryStore::new();
        let first = Record::Prospect(prospect("ACME1", "John Doe"));
        let changed = Record::Prospect(prospect("ACME1", "John Doe").with_suppression(true, false));

        assert_eq!(store.upsert(&first).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&changed).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);

        match store.get(first.external_id()) {
            Some(Record::Prospect(p)) => assert!(p.do_not_mail),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_require_unknown_company() {
        let store = MemoryStore::new();
        store.add_company("ACME1", "Acme");

        assert!(store.require("acme1").is_ok());
        assert!(matches!(
            store.require("GHOST"),
            Err(UnificationError::CompanyNotFound(_))
        ));
    }

    #[test]
    fn test_stream_joins_customer_and_scopes_company() {
        let store = MemoryStore::new();
        let acme = store.add_company("ACME1", "Acme");

        let john = prospect("ACME1", "John Doe");
        let customer = Customer::materialize(&john, Some(10.0), None).unwrap();
        store.upsert(&Record::Prospect(john)).unwrap();
        store.upsert(&Record::Customer(customer)).unwrap();
        store.upsert(&Record::Prospect(prospect("OTHER", "Jane Roe"))).unwrap();

        let records: Vec<ProspectRecord> = store
            .stream(&acme, &Selection::Company)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].is_customer());
    }

    #[test]
    fn test_selection_by_batch_and_weeks() {
        let store = MemoryStore::new();
        let acme = store.add_company("ACME1", "Acme");

        let a = prospect("ACME1", "Ann A");
        let b = prospect("ACME1", "Bob B");
        let batch = BatchRef { id: 7, number: 1, year: 2024, week: 12 };
        store.assign_batch(batch, &[a.external_id.as_str()]);
        store.upsert(&Record::Prospect(a)).unwrap();
        store.upsert(&Record::Prospect(b)).unwrap();

        let count = |selection: Selection| store.stream(&acme, &selection).unwrap().count();

        assert_eq!(count(Selection::Company), 2);
        assert_eq!(count(Selection::Batch(7)), 1);
        assert_eq!(count(Selection::Batch(8)), 0);
        assert_eq!(count(Selection::Weeks { year: 2024, weeks: vec![11, 12] }), 1);
        assert_eq!(count(Selection::Weeks { year: 2023, weeks: vec![12] }), 0);
    }

    #[test]
    fn test_prospect_in_several_batches_matches_each() {
        let store = MemoryStore::new();
        let acme = store.add_company("ACME1", "Acme");

        let a = prospect("ACME1", "Ann A");
        let spring = BatchRef { id: 1, number: 1, year: 2024, week: 12 };
        let summer = BatchRef { id: 2, number: 2, year: 2024, week: 26 };
        store.assign_batch(spring, &[a.external_id.as_str()]);
        store.assign_batch(summer, &[a.external_id.as_str()]);
        store.upsert(&Record::Prospect(a)).unwrap();

        let batches = |selection: Selection| -> Vec<Option<BatchRef>> {
            store
                .stream(&acme, &selection)
                .unwrap()
                .map(|r| r.unwrap().batch)
                .collect()
        };

        assert_eq!(batches(Selection::Batch(1)), vec![Some(spring)]);
        assert_eq!(batches(Selection::Batch(2)), vec![Some(summer)]);
        assert_eq!(
            batches(Selection::Weeks { year: 2024, weeks: vec![26] }),
            vec![Some(summer)]
        );
        assert_eq!(batches(Selection::Company).len(), 1);
    }
}
