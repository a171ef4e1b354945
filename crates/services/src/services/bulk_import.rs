//! CSV bulk import of agency listings.
//!
//! Rows are numbered as a spreadsheet shows them: the header is row 1, the
//! first listing row 2.

use std::collections::{HashMap, HashSet};

use csv::{ReaderBuilder, StringRecord, Trim};
use db::models::{
    agency::{Agency, AgencyFields},
    region::Region,
    trade::Trade,
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use utils::validation::{FieldErrors, non_empty, parse_bool_loose};
use uuid::Uuid;

use super::{
    agencies::available_slug,
    agency_validation::{
        DESCRIPTION_MAX, EMPLOYEE_COUNT_MAX, HEADQUARTERS_MAX, parse_founded_year,
        profile_completion, validate_company_size, validate_email, validate_name, validate_phone,
        validate_text, validate_url,
    },
};

pub const MAX_ROWS: usize = 1000;

pub const COLUMNS: [&str; 13] = [
    "name",
    "description",
    "website",
    "phone",
    "email",
    "headquarters",
    "founded_year",
    "employee_count",
    "company_size",
    "offers_per_diem",
    "is_union",
    "trades",
    "regions",
];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("the file has no header row")]
    Empty,
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("too many rows: {0} (maximum {MAX_ROWS})")]
    TooManyRows(usize),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, TS, PartialEq)]
pub struct RowError {
    pub row: usize,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, TS, PartialEq)]
pub struct SkippedRow {
    pub row: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub errors: Vec<RowError>,
    pub skipped_rows: Vec<SkippedRow>,
    pub warnings: Vec<String>,
}

/// Header name → position in each record.
struct ColumnMap(HashMap<&'static str, usize>);

impl ColumnMap {
    fn from_headers(headers: &StringRecord, warnings: &mut Vec<String>) -> Result<Self, ImportError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ImportError::Empty);
        }
        let mut map = HashMap::new();
        for (idx, raw) in headers.iter().enumerate() {
            let header = raw.trim_start_matches('\u{feff}').trim().to_ascii_lowercase();
            match COLUMNS.iter().find(|c| **c == header) {
                Some(column) => {
                    if map.insert(*column, idx).is_some() {
                        warnings.push(format!("duplicate column \"{raw}\"; using the last one"));
                    }
                }
                None if header.is_empty() => {}
                None => warnings.push(format!("unknown column \"{}\" ignored", raw.trim())),
            }
        }
        if !map.contains_key("name") {
            return Err(ImportError::MissingColumn("name"));
        }
        Ok(Self(map))
    }

    fn cell<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.0
            .get(column)
            .and_then(|idx| record.get(*idx))
            .filter(|v| !v.is_empty())
    }
}

pub struct BulkImportService;

impl BulkImportService {
    /// Validates every row and, unless `dry_run`, inserts the good ones in a
    /// single transaction.
    pub async fn import(
        pool: &SqlitePool,
        input: &str,
        dry_run: bool,
    ) -> Result<ImportSummary, ImportError> {
        let mut summary = ImportSummary {
            dry_run,
            ..Default::default()
        };

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(input.as_bytes());
        let headers = reader.headers()?.clone();
        let columns = ColumnMap::from_headers(&headers, &mut summary.warnings)?;

        let records: Vec<StringRecord> = reader
            .records()
            .filter(|r| !matches!(r, Ok(record) if record.iter().all(str::is_empty)))
            .collect::<Result<_, _>>()?;
        if records.len() > MAX_ROWS {
            return Err(ImportError::TooManyRows(records.len()));
        }
        summary.total_rows = records.len();

        let mut tx = pool.begin().await?;
        let existing: HashSet<String> = Agency::all_names_lower(&mut *tx)
            .await?
            .into_iter()
            .collect();
        let mut seen_in_file: HashSet<String> = HashSet::new();

        for (i, record) in records.iter().enumerate() {
            let row = record
                .position()
                .map_or(i + 2, |p| p.line() as usize);
            let mut errors = FieldErrors::new();
            let mut fields = parse_row(&columns, record, &mut errors);

            if !errors.is_empty() {
                summary.failed += 1;
                summary
                    .errors
                    .extend(errors.iter().map(|(field, message)| RowError {
                        row,
                        field: field.to_string(),
                        message: message.to_string(),
                    }));
                continue;
            }

            let key = fields.name.to_ascii_lowercase();
            let skip_reason = if existing.contains(&key) {
                Some("an agency with this name already exists")
            } else if !seen_in_file.insert(key) {
                Some("duplicate of an earlier row in this file")
            } else {
                None
            };
            if let Some(reason) = skip_reason {
                summary.skipped += 1;
                summary.skipped_rows.push(SkippedRow {
                    row,
                    name: fields.name.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let trades = Trade::resolve(&mut *tx, &split_cell(columns.cell(record, "trades"))).await?;
            let regions =
                Region::resolve(&mut *tx, &split_cell(columns.cell(record, "regions"))).await?;
            for unknown in &trades.unknown {
                summary
                    .warnings
                    .push(format!("row {row}: unknown trade \"{unknown}\" ignored"));
            }
            for unknown in &regions.unknown {
                summary
                    .warnings
                    .push(format!("row {row}: unknown region \"{unknown}\" ignored"));
            }

            if !dry_run {
                fields.slug = available_slug(&mut tx, &fields.name, None).await?;
                fields.profile_completion_percentage =
                    profile_completion(&fields, trades.matched.len(), regions.matched.len());
                let agency = Agency::create(&mut *tx, Uuid::new_v4(), &fields).await?;
                let trade_ids: Vec<Uuid> = trades.matched.iter().map(|t| t.id).collect();
                let region_ids: Vec<Uuid> = regions.matched.iter().map(|r| r.id).collect();
                Trade::replace_for_agency(&mut tx, agency.id, &trade_ids).await?;
                Region::replace_for_agency(&mut tx, agency.id, &region_ids).await?;
            }
            summary.imported += 1;
        }

        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }

        if summary.failed > 0 {
            warn!(failed = summary.failed, "bulk import had invalid rows");
        }
        info!(
            total_rows = summary.total_rows,
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed,
            dry_run,
            "bulk import finished"
        );
        Ok(summary)
    }
}

fn parse_row(columns: &ColumnMap, record: &StringRecord, errors: &mut FieldErrors) -> AgencyFields {
    let cell = |column: &str| columns.cell(record, column);
    let flag = |column: &str, errors: &mut FieldErrors| match cell(column) {
        None => false,
        Some(raw) => parse_bool_loose(raw).unwrap_or_else(|| {
            errors.add(column, "must be true/false, yes/no or 1/0");
            false
        }),
    };

    AgencyFields {
        name: validate_name(cell("name").unwrap_or_default(), errors),
        slug: String::new(),
        description: validate_text("description", cell("description"), DESCRIPTION_MAX, errors),
        logo_url: None,
        website: validate_url("website", cell("website"), errors),
        phone: validate_phone("phone", cell("phone"), errors),
        email: validate_email("email", cell("email"), errors),
        headquarters: validate_text(
            "headquarters",
            cell("headquarters"),
            HEADQUARTERS_MAX,
            errors,
        ),
        founded_year: parse_founded_year(cell("founded_year"), errors),
        employee_count: validate_text(
            "employee_count",
            cell("employee_count"),
            EMPLOYEE_COUNT_MAX,
            errors,
        ),
        company_size: validate_company_size(cell("company_size"), errors),
        is_active: true,
        is_union: flag("is_union", &mut *errors),
        offers_per_diem: flag("offers_per_diem", &mut *errors),
        is_verified: false,
        verified_at: None,
        profile_completion_percentage: 0,
    }
}

/// `Electrical; Plumbing` or `Electrical, Plumbing`.
fn split_cell(cell: Option<&str>) -> Vec<String> {
    cell.map(|raw| {
        raw.split([';', ','])
            .filter_map(|v| non_empty(Some(v)))
            .collect()
    })
    .unwrap_or_default()
}
