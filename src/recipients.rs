//! CSV recipient import

use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use serde::Serialize;

use crate::error::{CampaignError, Result};
use crate::models::Recipient;

/// Recipients parsed from a CSV plus the rows that were dropped.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub recipients: Vec<Recipient>,
    /// 1-based data row numbers skipped for a blank email.
    pub skipped_rows: Vec<usize>,
    pub duplicates: Vec<String>,
}

/// Parse a CSV with a header row. An `email` column is required.
pub fn import_csv<R: Read>(reader: R) -> Result<ImportReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let email_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("email"))
        .ok_or_else(|| CampaignError::Import {
            message: "CSV must include an 'email' column".to_string(),
        })?;
    let name_idx = headers.iter().position(|h| h.eq_ignore_ascii_case("name"));

    let mut report = ImportReport::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (row_no, record) in rdr.records().enumerate() {
        let record = record?;
        let email = record.get(email_idx).unwrap_or_default().to_string();
        if email.is_empty() {
            report.skipped_rows.push(row_no + 1);
            continue;
        }
        if !seen.insert(email.to_lowercase()) {
            report.duplicates.push(email);
            continue;
        }
        let name = name_idx
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string();

        let mut fields = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            if i == email_idx || Some(i) == name_idx || header.is_empty() {
                continue;
            }
            if let Some(value) = record.get(i) {
                fields.insert(header.to_string(), value.to_string());
            }
        }

        let mut recipient = Recipient::new(email, name);
        recipient.fields = fields;
        report.recipients.push(recipient);
    }

    tracing::debug!(
        "Imported {} recipients ({} skipped, {} duplicates)",
        report.recipients.len(),
        report.skipped_rows.len(),
        report.duplicates.len()
    );

    Ok(report)
}
