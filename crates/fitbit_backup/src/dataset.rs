//! Daily records, the date-indexed dataset and its CSV form.

use crate::error::{BackupError, BackupResult};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const DATE_HEADER: &str = "Date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Metric columns of the published dataset, in file order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Steps,
    Bmi,
    BodyFat,
    Weight,
    TotalSleepMinutes,
    TotalSleepRecords,
    TotalTimeInBed,
    RestingHeartRate,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Steps,
        Column::Bmi,
        Column::BodyFat,
        Column::Weight,
        Column::TotalSleepMinutes,
        Column::TotalSleepRecords,
        Column::TotalTimeInBed,
        Column::RestingHeartRate,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Steps => "Steps",
            Column::Bmi => "BMI",
            Column::BodyFat => "Body Fat %",
            Column::Weight => "Weight",
            Column::TotalSleepMinutes => "Total Sleep (minutes)",
            Column::TotalSleepRecords => "Total Sleep Records",
            Column::TotalTimeInBed => "Total Time in Bed (minutes)",
            Column::RestingHeartRate => "Resting Heart Rate",
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.header() == header.trim())
    }
}

/// Metric values of one day.
pub type Fields = BTreeMap<Column, f64>;

/// Combine two field sets; `overlay` wins where both define a column.
pub fn merge_fields(base: &Fields, overlay: &Fields) -> Fields {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(c, v)| (*c, *v)));
    merged
}

#[derive(Clone, Debug, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub fields: Fields,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, fields: Fields) -> Self {
        Self { date, fields }
    }

    pub fn get(&self, column: Column) -> Option<f64> {
        self.fields.get(&column).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Date-ordered records, at most one per date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    records: BTreeMap<NaiveDate, DailyRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records in write order; a later record for the same date
    /// replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = DailyRecord>) -> Self {
        let mut dataset = Self::new();
        for record in records {
            dataset.upsert(record);
        }
        dataset
    }

    /// Insert `record`, returning the record it replaced.
    pub fn upsert(&mut self, record: DailyRecord) -> Option<DailyRecord> {
        self.records.insert(record.date, record)
    }

    /// Combine with `newer`; rows of `newer` replace rows with the same date.
    pub fn merge(mut self, newer: Dataset) -> Dataset {
        self.records.extend(newer.records);
        self
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DailyRecord> {
        self.records.get(&date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &DailyRecord> {
        self.records.values()
    }

    /// Parse CSV with a `Date` column. Unknown columns are ignored and empty
    /// cells are absent values.
    pub fn from_csv_reader<R: Read>(reader: R) -> BackupResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let date_idx = headers
            .iter()
            .position(|h| h.trim() == DATE_HEADER)
            .ok_or_else(|| BackupError::Payload(format!("dataset has no {DATE_HEADER} column")))?;
        let columns: Vec<(usize, Column)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| Column::from_header(h).map(|c| (i, c)))
            .collect();

        let mut records = Vec::new();
        for row in rdr.records() {
            let row = row?;
            let raw_date = row.get(date_idx).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
                .map_err(|e| BackupError::Payload(format!("invalid date {raw_date:?}: {e}")))?;
            let mut fields = Fields::new();
            for (idx, column) in &columns {
                let cell = row.get(*idx).unwrap_or_default().trim();
                if cell.is_empty() {
                    continue;
                }
                let value = cell.parse::<f64>().map_err(|e| {
                    BackupError::Payload(format!(
                        "invalid {} value {cell:?} on {date}: {e}",
                        column.header()
                    ))
                })?;
                fields.insert(*column, value);
            }
            records.push(DailyRecord::new(date, fields));
        }
        Ok(Self::from_records(records))
    }

    pub fn from_csv_str(contents: &str) -> BackupResult<Self> {
        Self::from_csv_reader(contents.as_bytes())
    }

    /// Write `Date` then every metric column in fixed order, rows by date.
    pub fn to_csv_writer<W: Write>(&self, writer: W) -> BackupResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec![DATE_HEADER];
        header.extend(Column::ALL.iter().map(|c| c.header()));
        wtr.write_record(&header)?;
        for record in self.records.values() {
            let mut row = vec![record.date.format(DATE_FORMAT).to_string()];
            row.extend(
                Column::ALL
                    .iter()
                    .map(|c| record.get(*c).map(format_value).unwrap_or_default()),
            );
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> BackupResult<String> {
        let mut buf = Vec::new();
        self.to_csv_writer(&mut buf)?;
        String::from_utf8(buf).map_err(|e| BackupError::Payload(e.to_string()))
    }
}

/// Render integral values without a fractional part.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Serialize `dataset` to `path`, creating parent directories.
pub fn write(dataset: &Dataset, path: &Path) -> BackupResult<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    dataset.to_csv_writer(std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), rows = dataset.len(), "wrote dataset");
    Ok(path.to_path_buf())
}

/// Load the last published dataset from an HTTP(S) URL or a local path.
///
/// A 404 or a missing local file yields an empty dataset.
pub async fn load_baseline(http: &reqwest::Client, source: &str) -> BackupResult<Dataset> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let resp = http.get(source).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(%source, "no published dataset yet; starting empty");
            return Ok(Dataset::new());
        }
        if !status.is_success() {
            return Err(BackupError::Baseline(format!("GET {source} returned {status}")));
        }
        let text = resp.text().await?;
        let dataset = Dataset::from_csv_str(&text)?;
        tracing::info!(
            %source,
            rows = dataset.len(),
            last = ?dataset.last_date(),
            "loaded baseline"
        );
        return Ok(dataset);
    }

    match std::fs::read_to_string(source) {
        Ok(text) => Dataset::from_csv_str(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(%source, "baseline file not found; starting empty");
            Ok(Dataset::new())
        }
        Err(e) => Err(e.into()),
    }
}
