// 📥 File import
// Reads one legacy export, turns each row into canonical records and upserts
// them by external id.
//
// Flow:
// 1. Resolve the company (fails before the file is opened)
// 2. Read and sanitize the header row
// 3. Detect the source format, unless one was given
// 4. Validate headers for every parser that will run (fail fast, no rows read)
// 5. Parse each row with every parser, skip invalid records, upsert the rest
//
// Cells that are not valid UTF-8 are read as Latin-1 so one legacy-encoded
// row never aborts a run half-way through.

use crate::entities::Company;
use crate::error::Result;
use crate::parser::{detect_format, EntityTarget, ParseOptions, Parser, SourceFormat};
use crate::schema::{missing_headers, sanitize_headers, to_raw_row};
use crate::source::{CompanyDirectory, RecordSink, UpsertOutcome};
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Skip format detection and use this format
    pub format: Option<SourceFormat>,

    /// Run only this parser instead of every parser the format offers
    pub target: Option<EntityTarget>,

    pub parse: ParseOptions,

    /// Rows between progress log lines (0 disables them)
    pub progress_interval: usize,

    pub skip_invalid: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            format: None,
            target: None,
            parse: ParseOptions::default(),
            progress_interval: 1000,
            skip_invalid: true,
        }
    }
}

impl ImportOptions {
    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_target(mut self, target: EntityTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_parse_options(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub company: String,
    pub format: SourceFormat,
    pub parsers: Vec<String>,
    pub rows_read: usize,
    /// Rows with at least one cell decoded as Latin-1
    pub reencoded_rows: usize,
    pub produced: usize,
    pub skipped_invalid: usize,
    pub inserted: usize,
    pub updated: usize,
    pub flagged: usize,
    pub elapsed: Duration,
}

impl ImportSummary {
    pub fn stored(&self) -> usize {
        self.inserted + self.updated
    }
}

// ============================================================================
// IMPORTER
// ============================================================================

pub struct Importer<'a> {
    sink: &'a dyn RecordSink,
    directory: &'a dyn CompanyDirectory,
    options: ImportOptions,
}

impl<'a> Importer<'a> {
    pub fn new(sink: &'a dyn RecordSink, directory: &'a dyn CompanyDirectory, options: ImportOptions) -> Self {
        Importer {
            sink,
            directory,
            options,
        }
    }

    pub fn import_file(&self, company: &str, path: &Path) -> Result<ImportSummary> {
        let company = self.directory.require(company)?;
        let file = File::open(path)?;
        self.import(&company, path, file)
    }

    /// Import from any reader; `file_name` feeds format detection only
    pub fn import_reader<R: Read>(&self, company: &str, file_name: &Path, reader: R) -> Result<ImportSummary> {
        let company = self.directory.require(company)?;
        self.import(&company, file_name, reader)
    }

    fn import<R: Read>(&self, company: &Company, file_name: &Path, reader: R) -> Result<ImportSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = sanitize_headers(rdr.byte_headers()?.iter().map(decode_cell));
        let format = match self.options.format {
            Some(format) => format,
            None => detect_format(file_name, &headers)?,
        };
        let parsers = self.parsers_for(company, format, &headers)?;
        let parser_names: Vec<String> = parsers.iter().map(Parser::name).collect();

        info!(
            run_id = %run_id,
            company = company.scope(),
            format = format.as_str(),
            parsers = ?parser_names,
            file = %file_name.display(),
            "import started"
        );

        let mut summary = ImportSummary {
            run_id,
            company: company.identifier.clone(),
            format,
            parsers: parser_names,
            rows_read: 0,
            reencoded_rows: 0,
            produced: 0,
            skipped_invalid: 0,
            inserted: 0,
            updated: 0,
            flagged: 0,
            elapsed: Duration::ZERO,
        };

        for result in rdr.byte_records() {
            let values = result?;
            summary.rows_read += 1;

            let cells: Vec<Cow<str>> = values.iter().map(decode_cell).collect();
            if cells.iter().any(|cell| matches!(cell, Cow::Owned(_))) {
                summary.reencoded_rows += 1;
                warn!(run_id = %run_id, row = summary.rows_read, "row is not valid UTF-8, read as Latin-1");
            }
            let row = to_raw_row(&headers, cells.iter());

            for parser in &parsers {
                for record in parser.parse_records(&row) {
                    summary.produced += 1;

                    if self.options.skip_invalid && !record.is_valid() {
                        summary.skipped_invalid += 1;
                        debug!(
                            row = summary.rows_read,
                            parser = %parser.name(),
                            "skipping record with empty identity fields"
                        );
                        continue;
                    }

                    if record.is_flagged() {
                        summary.flagged += 1;
                    }

                    match self.sink.upsert(&record)? {
                        UpsertOutcome::Inserted => summary.inserted += 1,
                        UpsertOutcome::Updated => summary.updated += 1,
                    }
                }
            }

            if self.options.progress_interval > 0 && summary.rows_read % self.options.progress_interval == 0 {
                info!(run_id = %run_id, rows = summary.rows_read, "import progress");
            }
        }

        summary.elapsed = started.elapsed();

        info!(
            run_id = %run_id,
            rows_read = summary.rows_read,
            reencoded_rows = summary.reencoded_rows,
            produced = summary.produced,
            skipped_invalid = summary.skipped_invalid,
            inserted = summary.inserted,
            updated = summary.updated,
            flagged = summary.flagged,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "import finished"
        );

        Ok(summary)
    }

    /// Parsers to run, with headers validated before any row is read
    ///
    /// An explicit target must validate. Otherwise the format's primary
    /// parser must validate and secondary parsers run only when their
    /// columns are present.
    fn parsers_for(&self, company: &Company, format: SourceFormat, headers: &[String]) -> Result<Vec<Parser>> {
        if let Some(target) = self.options.target {
            let parser = Parser::new(company.scope(), format, target, self.options.parse)?;
            parser.validate_headers(headers)?;
            return Ok(vec![parser]);
        }

        let mut parsers = Vec::new();
        for (idx, parser) in Parser::all_for(company.scope(), format, self.options.parse)
            .into_iter()
            .enumerate()
        {
            if idx == 0 {
                parser.validate_headers(headers)?;
                parsers.push(parser);
                continue;
            }

            let missing = missing_headers(parser.required_headers(), headers);
            if missing.is_empty() {
                parsers.push(parser);
            } else {
                debug!(parser = %parser.name(), missing = ?missing, "parser skipped");
            }
        }
        Ok(parsers)
    }
}

/// UTF-8 when valid, Latin-1 otherwise
fn decode_cell(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
