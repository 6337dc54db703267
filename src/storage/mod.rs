use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ScrapingError};
use crate::events::{EventBus, ListenerId};
use crate::scraper::listing::EventData;

/// One stored job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub query: String,
    pub title: String,
    pub jobtype: String,
    pub location: String,
    pub company: String,
    pub description: String,
    pub html_description: String,
    pub url: String,
    /// Apply link when known, otherwise the listing URL.
    pub contact: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn from_event(data: &EventData, base_url: &Url, now: DateTime<Utc>) -> Self {
        let url = base_url
            .join(&data.link)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| data.link.clone());
        let contact = data
            .detail
            .apply_link
            .clone()
            .filter(|link| !link.trim().is_empty())
            .unwrap_or_else(|| url.clone());

        Self {
            query: data.query.clone(),
            title: data.summary.title.clone(),
            jobtype: data.detail.employment_type.clone(),
            location: data.location.clone(),
            company: data.summary.company.clone(),
            description: data.detail.description.clone(),
            html_description: data.detail.description_html.clone(),
            url,
            contact,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_records: u64,
    pub files_created: u32,
    pub disk_usage: u64,
    pub last_write: Option<DateTime<Utc>>,
}

pub trait StorageManager {
    fn store_records(&self, records: &[JobRecord]) -> Result<()>;
    fn storage_stats(&self) -> Result<StorageStats>;
}

pub trait OutputFormatter {
    fn format_records(&self, records: &[JobRecord]) -> Result<String>;
    fn file_extension(&self) -> &str;
    fn header(&self) -> Option<String>;
}

pub struct JsonFormatter;
pub struct CsvFormatter {
    columns: Vec<String>,
}

impl OutputFormatter for JsonFormatter {
    fn format_records(&self, records: &[JobRecord]) -> Result<String> {
        let mut output = String::new();
        for record in records {
            let json_line = serde_json::to_string(record)
                .map_err(|e| ScrapingError::StorageError(format!("JSON serialization failed: {}", e)))?;
            output.push_str(&json_line);
            output.push('\n');
        }
        Ok(output)
    }

    fn file_extension(&self) -> &str {
        "jsonl"
    }

    fn header(&self) -> Option<String> {
        None
    }
}

impl CsvFormatter {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn default_columns() -> Vec<String> {
        vec![
            "title".to_string(),
            "jobtype".to_string(),
            "location".to_string(),
            "company".to_string(),
            "url".to_string(),
            "contact".to_string(),
            "description".to_string(),
            "createdAt".to_string(),
            "updatedAt".to_string(),
        ]
    }

    fn escape_csv_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn extract_field_value(&self, record: &JobRecord, column: &str) -> String {
        match column {
            "query" => record.query.clone(),
            "title" => record.title.clone(),
            "jobtype" => record.jobtype.clone(),
            "location" => record.location.clone(),
            "company" => record.company.clone(),
            "description" => record.description.clone(),
            "htmlDescription" => record.html_description.clone(),
            "url" => record.url.clone(),
            "contact" => record.contact.clone(),
            "createdAt" => record.created_at.to_rfc3339(),
            "updatedAt" => record.updated_at.to_rfc3339(),
            _ => String::new(),
        }
    }
}

impl OutputFormatter for CsvFormatter {
    fn format_records(&self, records: &[JobRecord]) -> Result<String> {
        let mut output = String::new();

        for record in records {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|column| Self::escape_csv_field(&self.extract_field_value(record, column)))
                .collect();
            output.push_str(&row.join(","));
            output.push('\n');
        }

        Ok(output)
    }

    fn file_extension(&self) -> &str {
        "csv"
    }

    fn header(&self) -> Option<String> {
        Some(self.columns.join(","))
    }
}

/// Appends job records to `<output>/<query>/<date>/jobs_<location>.<ext>`.
///
/// Writes are synchronous so the store can sit directly behind a DATA listener.
pub struct FileStorageManager {
    output_dir: PathBuf,
    base_url: Url,
    formatter: Box<dyn OutputFormatter + Send + Sync>,
    known_files: Mutex<HashSet<PathBuf>>,
    stats: Mutex<StorageStats>,
}

impl FileStorageManager {
    pub fn new(output_dir: PathBuf, format: &str, base_url: &str) -> Result<Self> {
        let formatter: Box<dyn OutputFormatter + Send + Sync> = match format {
            "json" => Box::new(JsonFormatter),
            "csv" => Box::new(CsvFormatter::new(CsvFormatter::default_columns())),
            _ => return Err(ScrapingError::ConfigError(format!("Unsupported format: {}", format)).into()),
        };
        Self::with_formatter(output_dir, formatter, base_url)
    }

    pub fn with_csv_columns(output_dir: PathBuf, columns: Vec<String>, base_url: &str) -> Result<Self> {
        Self::with_formatter(output_dir, Box::new(CsvFormatter::new(columns)), base_url)
    }

    fn with_formatter(
        output_dir: PathBuf,
        formatter: Box<dyn OutputFormatter + Send + Sync>,
        base_url: &str,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(ScrapingError::from)?;
        Ok(Self {
            output_dir,
            base_url,
            formatter,
            known_files: Mutex::new(HashSet::new()),
            stats: Mutex::new(StorageStats::default()),
        })
    }

    /// Register as a DATA listener. Storage failures are logged by the bus
    /// and never reach the scraping run.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> ListenerId {
        let storage = Arc::clone(self);
        bus.on_data(move |data| storage.store_event(data))
    }

    pub fn store_event(&self, data: &EventData) -> Result<()> {
        let record = JobRecord::from_event(data, &self.base_url, Utc::now());
        self.store_records(std::slice::from_ref(&record))
    }

    pub fn file_path(&self, query: &str, location: &str, timestamp: DateTime<Utc>) -> PathBuf {
        let date_str = timestamp.format("%Y-%m-%d").to_string();
        let filename = format!(
            "jobs_{}.{}",
            sanitize_path_segment(location),
            self.formatter.file_extension()
        );

        self.output_dir
            .join(sanitize_path_segment(query))
            .join(date_str)
            .join(filename)
    }

    fn write_to_file(&self, file_path: &Path, content: &str) -> Result<u64> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ScrapingError::StorageError(format!("Failed to create directory: {}", e)))?;
        }

        let is_new_file = !file_path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)
            .map_err(|e| ScrapingError::StorageError(format!("Failed to open file: {}", e)))?;

        let mut bytes_written = 0;

        if is_new_file {
            if let Some(header) = self.formatter.header() {
                let header_line = format!("{}\n", header);
                file.write_all(header_line.as_bytes())
                    .map_err(|e| ScrapingError::StorageError(format!("Failed to write header: {}", e)))?;
                bytes_written += header_line.len() as u64;
            }
        }

        file.write_all(content.as_bytes())
            .map_err(|e| ScrapingError::StorageError(format!("Failed to write content: {}", e)))?;
        bytes_written += content.len() as u64;

        file.flush()
            .map_err(|e| ScrapingError::StorageError(format!("Failed to flush file: {}", e)))?;

        Ok(bytes_written)
    }

    fn calculate_directory_size(dir_path: &Path) -> u64 {
        let mut total_size = 0;

        if let Ok(entries) = fs::read_dir(dir_path) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        total_size += metadata.len();
                    } else if metadata.is_dir() {
                        total_size += Self::calculate_directory_size(&entry.path());
                    }
                }
            }
        }

        total_size
    }
}

impl StorageManager for FileStorageManager {
    fn store_records(&self, records: &[JobRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut by_file: BTreeMap<PathBuf, Vec<JobRecord>> = BTreeMap::new();
        for record in records {
            let path = self.file_path(&record.query, &record.location, record.created_at);
            by_file.entry(path).or_default().push(record.clone());
        }

        for (file_path, file_records) in by_file {
            let formatted_content = self.formatter.format_records(&file_records)?;
            let bytes_written = self.write_to_file(&file_path, &formatted_content)?;
            debug!("Wrote {} bytes to {}", bytes_written, file_path.display());

            let first_write = self
                .known_files
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(file_path.clone());
            if first_write {
                info!("Writing job records to {}", file_path.display());
            }

            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.total_records += file_records.len() as u64;
            if first_write {
                stats.files_created += 1;
            }
            stats.last_write = Some(Utc::now());
        }

        Ok(())
    }

    fn storage_stats(&self) -> Result<StorageStats> {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone();
        stats.disk_usage = Self::calculate_directory_size(&self.output_dir);
        if stats.disk_usage == 0 && stats.total_records > 0 {
            warn!("Output directory {} is empty after writes", self.output_dir.display());
        }
        Ok(stats)
    }
}

/// Keep a query or location usable as a single path segment.
fn sanitize_path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
