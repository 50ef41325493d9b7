// 📤 Streaming Export Generators
// Campaign-ready CSV rows for a batch, a company, or a set of calendar weeks.
//
// Row 0 is always the fixed header. Data rows are produced one at a time by
// walking the filtered record source: each record is fetched, filtered,
// formatted and yielded before the next one is read. An empty population
// yields the header alone.
//
// Every precondition (company lookup, rule names) is checked when the
// generator is created, never mid-stream. Generators are single-pass; to
// restart, call the export again.

use crate::error::Result;
use crate::rules::{CompiledFilter, FilterRequest, FilterRuleEngine, RuleRegistry};
use crate::source::{CompanyDirectory, ProspectRecord, RecordSource, RecordStream, Selection};
use std::io::Write;
use tracing::{debug, info};

// ============================================================================
// HEADER CONTRACT
// ============================================================================

/// Bumped whenever EXPORT_HEADER changes; mail-vendor tooling keys on it
pub const EXPORT_HEADER_VERSION: u32 = 1;

pub const EXPORT_HEADER: [&str; 15] = [
    "job_number",
    "ring_to",
    "batch_number",
    "company_identifier",
    "external_id",
    "full_name",
    "first_name",
    "last_name",
    "address1",
    "address2",
    "city",
    "state",
    "postal_code",
    "customer_type",
    "lifetime_value",
];

pub fn header_row() -> Vec<String> {
    EXPORT_HEADER.iter().map(|h| h.to_string()).collect()
}

// ============================================================================
// EXPORT REQUEST
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Mail-vendor job number stamped on every row
    pub job_number: String,

    /// Callback phone number stamped on every row
    pub ring_to: String,

    pub filter: FilterRequest,
}

impl ExportRequest {
    pub fn new(job_number: &str, ring_to: &str, filter: FilterRequest) -> Self {
        ExportRequest {
            job_number: job_number.to_string(),
            ring_to: ring_to.to_string(),
            filter,
        }
    }
}

// ============================================================================
// EXPORTER
// ============================================================================

pub struct Exporter<'a> {
    source: &'a dyn RecordSource,
    companies: &'a dyn CompanyDirectory,
    registry: &'a RuleRegistry,
}

impl<'a> Exporter<'a> {
    pub fn new(
        source: &'a dyn RecordSource,
        companies: &'a dyn CompanyDirectory,
        registry: &'a RuleRegistry,
    ) -> Self {
        Exporter {
            source,
            companies,
            registry,
        }
    }

    /// Rows for a single campaign batch
    pub fn export_batch(&self, request: &ExportRequest, batch_id: i64) -> Result<ExportRows<'a>> {
        self.export(request, Selection::Batch(batch_id))
    }

    /// Rows for the whole company
    pub fn export_company(&self, request: &ExportRequest) -> Result<ExportRows<'a>> {
        self.export(request, Selection::Company)
    }

    /// Rows for every batch in the given calendar weeks
    pub fn export_weeks(&self, request: &ExportRequest, year: i32, weeks: Vec<u32>) -> Result<ExportRows<'a>> {
        self.export(request, Selection::Weeks { year, weeks })
    }

    /// Resolve the company, compile the filter, then open the stream
    pub fn export(&self, request: &ExportRequest, selection: Selection) -> Result<ExportRows<'a>> {
        let company = self.companies.require(&request.filter.intacct_id)?;
        let filter = FilterRuleEngine::new(self.registry).compile(&company, &request.filter)?;
        let records = self.source.stream(&company, &selection)?;

        info!(
            company = %company.identifier,
            selection = %selection.describe(),
            rule = %filter.inclusion_rule(),
            "export started"
        );

        Ok(ExportRows {
            records,
            filter,
            job_number: request.job_number.clone(),
            ring_to: request.ring_to.clone(),
            company_identifier: company.identifier,
            header_sent: false,
            finished: false,
            emitted: 0,
            examined: 0,
        })
    }
}

// ============================================================================
// ROW GENERATOR
// ============================================================================

/// Lazy sequence of CSV rows: header first, then one row per qualifying record
pub struct ExportRows<'a> {
    records: RecordStream<'a>,
    filter: CompiledFilter,

    // Batch-level constants, injected once
    job_number: String,
    ring_to: String,
    company_identifier: String,

    header_sent: bool,
    finished: bool,
    emitted: usize,
    examined: usize,
}

impl<'a> ExportRows<'a> {
    /// Data rows yielded so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn format(&self, record: &ProspectRecord) -> Vec<String> {
        let prospect = &record.prospect;
        let location = &prospect.location;
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        let (customer_type, lifetime_value) = match &record.customer {
            Some(c) if c.is_active => ("customer", c.lifetime_value.clone()),
            _ => ("prospect", "0.00".to_string()),
        };

        vec![
            self.job_number.clone(),
            self.ring_to.clone(),
            record
                .batch
                .map(|b| b.number.to_string())
                .unwrap_or_default(),
            self.company_identifier.clone(),
            prospect.external_id.clone(),
            prospect.display_name(),
            text(&prospect.name.first),
            text(&prospect.name.last),
            text(&location.address1),
            text(&location.address2),
            text(&location.city),
            text(&location.state),
            text(&location.postal_code),
            customer_type.to_string(),
            lifetime_value,
        ]
    }
}

impl<'a> Iterator for ExportRows<'a> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.header_sent {
            self.header_sent = true;
            return Some(Ok(header_row()));
        }

        if self.finished {
            return None;
        }

        loop {
            match self.records.next() {
                Some(Ok(record)) => {
                    self.examined += 1;
                    if let Some(reason) = self.filter.exclusion(&record) {
                        debug!(
                            external_id = %record.prospect.external_id,
                            reason = reason.as_str(),
                            "record excluded"
                        );
                        continue;
                    }
                    self.emitted += 1;
                    return Some(Ok(self.format(&record)));
                }
                Some(Err(err)) => return Some(Err(err)),
                None => {
                    self.finished = true;
                    info!(
                        company = %self.company_identifier,
                        examined = self.examined,
                        rows = self.emitted,
                        "export finished"
                    );
                    return None;
                }
            }
        }
    }
}

// ============================================================================
// CSV SINK
// ============================================================================

/// Write every row of a generator as CSV; returns the number of rows written
/// (header included)
pub fn write_csv<I, W>(rows: I, writer: W) -> Result<usize>
where
    I: IntoIterator<Item = Result<Vec<String>>>,
    W: Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut written = 0;

    for row in rows {
        csv_writer.write_record(&row?)?;
        written += 1;
    }

    csv_writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Customer, Location, PersonName, Prospect, Record};
    use crate::error::UnificationError;
    use crate::rules::{INCLUDE_ACTIVE_CUSTOMERS_ONLY, INCLUDE_PROSPECTS_AND_CUSTOMERS, INCLUDE_PROSPECTS_ONLY};
    use crate::source::{BatchRef, MemoryStore, RecordSink};

    fn prospect(name: &str, street: &str) -> Prospect {
        Prospect::new(
            "ACME1",
            PersonName::from_full(Some(name)),
            Location::new(Some(street), None, Some("Mesa"), Some("AZ"), Some("85201")),
        )
    }

    /// 3 prospects, 2 of them customers
    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_company("ACME1", "Acme Heating");

        let people = [
            prospect("Ann Able", "1 Main St"),
            prospect("Bob Baker", "2 Main St"),
            prospect("Cat Cole", "3 Main St"),
        ];
        for (i, p) in people.iter().enumerate() {
            store.upsert(&Record::Prospect(p.clone())).unwrap();
            if i > 0 {
                let customer = Customer::materialize(p, Some(100.0 * i as f64), Some(1)).unwrap();
                store.upsert(&Record::Customer(customer)).unwrap();
            }
        }
        store
    }

    fn request(rule: &str) -> ExportRequest {
        ExportRequest::new("JOB-42", "8005550100", FilterRequest::new("ACME1", rule))
    }

    fn rows(store: &MemoryStore, request: &ExportRequest) -> Vec<Vec<String>> {
        let registry = RuleRegistry::standard();
        Exporter::new(store, store, &registry)
            .export_company(request)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_customers_only_yields_header_plus_two() {
        let rows = rows(&store(), &request(INCLUDE_ACTIVE_CUSTOMERS_ONLY));

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], header_row());
        assert!(rows[1..].iter().all(|r| r[13] == "customer"));
    }

    #[test]
    fn test_row_count_fidelity() {
        assert_eq!(rows(&store(), &request(INCLUDE_PROSPECTS_AND_CUSTOMERS)).len(), 4);
        assert_eq!(rows(&store(), &request(INCLUDE_PROSPECTS_ONLY)).len(), 2);
    }

    #[test]
    fn test_rows_are_stamped_with_request_constants() {
        let rows = rows(&store(), &request(INCLUDE_PROSPECTS_ONLY));
        let row = &rows[1];

        assert_eq!(row.len(), EXPORT_HEADER.len());
        assert_eq!(row[0], "JOB-42");
        assert_eq!(row[1], "8005550100");
        assert_eq!(row[3], "ACME1");
        assert_eq!(row[5], "Ann Able");
        assert_eq!(row[13], "prospect");
        assert_eq!(row[14], "0.00");
    }

    #[test]
    fn test_empty_population_yields_header_only() {
        let store = MemoryStore::new();
        store.add_company("ACME1", "Acme Heating");

        let rows = rows(&store, &request(INCLUDE_PROSPECTS_AND_CUSTOMERS));
        assert_eq!(rows, vec![header_row()]);
    }

    #[test]
    fn test_preconditions_fail_before_streaming() {
        let store = store();
        let registry = RuleRegistry::standard();
        let exporter = Exporter::new(&store, &store, &registry);

        let unknown_company = ExportRequest::new("J", "R", FilterRequest::new("GHOST", INCLUDE_PROSPECTS_ONLY));
        assert!(matches!(
            exporter.export_company(&unknown_company).err(),
            Some(UnificationError::CompanyNotFound(_))
        ));

        assert!(matches!(
            exporter.export_company(&request("include_everyone")).err(),
            Some(UnificationError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_suppressed_prospect_never_exported() {
        let store = store();
        store
            .upsert(&Record::Prospect(
                prospect("Ann Able", "1 Main St").with_suppression(true, false),
            ))
            .unwrap();

        let rows = rows(&store, &request(INCLUDE_PROSPECTS_AND_CUSTOMERS));
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r[5] != "Ann Able"));
    }

    #[test]
    fn test_batch_and_week_exports() {
        let store = store();
        let ann = prospect("Ann Able", "1 Main St");
        store.assign_batch(
            BatchRef { id: 5, number: 3, year: 2024, week: 9 },
            &[ann.external_id.as_str()],
        );

        let registry = RuleRegistry::standard();
        let exporter = Exporter::new(&store, &store, &registry);
        let request = request(INCLUDE_PROSPECTS_ONLY);

        let batch: Vec<_> = exporter
            .export_batch(&request, 5)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1][2], "3");

        let weeks = exporter.export_weeks(&request, 2024, vec![10, 11]).unwrap();
        assert_eq!(weeks.count(), 1);
    }

    #[test]
    fn test_generator_is_lazy_and_single_pass() {
        let store = store();
        let registry = RuleRegistry::standard();
        let mut rows = Exporter::new(&store, &store, &registry)
            .export_company(&request(INCLUDE_PROSPECTS_AND_CUSTOMERS))
            .unwrap();

        assert_eq!(rows.next().unwrap().unwrap(), header_row());
        assert_eq!(rows.emitted(), 0);
        rows.next();
        assert_eq!(rows.emitted(), 1);

        let rest = rows.by_ref().count();
        assert_eq!(rest, 2);
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_write_csv() {
        let mut buffer = Vec::new();
        let written = write_csv(rows(&store(), &request(INCLUDE_ACTIVE_CUSTOMERS_ONLY)).into_iter().map(Ok), &mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(written, 3);
        assert!(text.starts_with("job_number,ring_to,batch_number,company_identifier"));
        assert_eq!(text.lines().count(), 3);
    }
}
