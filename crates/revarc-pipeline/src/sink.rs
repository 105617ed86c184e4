//! Output sinks for encoded revisions and index tables.
//!
//! The consumer emits one [`DiffRecord`] per stored revision plus chunked
//! index records; a sink turns those into its output format. Two formats
//! are provided: multi-row SQL `INSERT` statements bounded by the server's
//! packet limit, and tab-separated text for bulk loaders.

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

use revarc_store::IndexChunk;
use revarc_types::{ArticleId, RevisionCounter, RevisionId, Timestamp};

use crate::error::PipelineError;

/// Destination table of an index chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTable {
    Chrono,
    Article,
    Revision,
}

impl IndexTable {
    fn name(self) -> &'static str {
        match self {
            IndexTable::Chrono => "chrono_index",
            IndexTable::Article => "article_index",
            IndexTable::Revision => "revision_index",
        }
    }
}

/// One stored revision, ready for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    /// Storage primary key, dense and ascending in delivery order.
    pub primary_key: u64,
    pub article: ArticleId,
    pub revision: RevisionId,
    pub counter: RevisionCounter,
    pub timestamp: Timestamp,
    pub contributor: String,
    pub contributor_id: Option<u64>,
    pub contributor_registered: bool,
    pub comment: String,
    pub minor: bool,
    /// Covering full revision; equal to `revision` for snapshots.
    pub full_revision: RevisionId,
    /// Bit-packed diff payload.
    pub payload: Bytes,
}

impl DiffRecord {
    /// Whether the payload is a full snapshot rather than a diff.
    pub fn is_snapshot(&self) -> bool {
        self.full_revision == self.revision
    }
}

/// Receiver of the pipeline's output stream.
pub trait RevisionSink: Send {
    fn write_revision(&mut self, record: &DiffRecord) -> Result<(), PipelineError>;

    fn write_index(&mut self, table: IndexTable, chunk: &IndexChunk)
        -> Result<(), PipelineError>;

    /// Forces all buffered output down to the underlying writer.
    fn flush(&mut self) -> Result<(), PipelineError>;
}

// ============================================================================
// SQL output
// ============================================================================

const INSERT_HEADER: &str =
    "INSERT INTO revision (pk,article_id,revision_id,counter,ts,contributor,\
     contributor_id,registered,comment,minor,full_revision_id,payload) VALUES ";

/// Emits multi-row `INSERT` statements, each kept under the configured
/// packet limit.
pub struct SqlSink<W: Write> {
    writer: W,
    max_packet: usize,
    base64_payloads: bool,
    /// Pending statement body; empty when no statement is open.
    statement: String,
}

impl<W: Write> SqlSink<W> {
    pub fn new(writer: W, max_packet: usize, base64_payloads: bool) -> Self {
        Self {
            writer,
            max_packet,
            base64_payloads,
            statement: String::new(),
        }
    }

    pub fn into_inner(mut self) -> Result<W, PipelineError> {
        self.flush_statement()?;
        Ok(self.writer)
    }

    fn flush_statement(&mut self) -> Result<(), PipelineError> {
        if self.statement.is_empty() {
            return Ok(());
        }
        self.statement.push_str(";\n");
        self.writer.write_all(self.statement.as_bytes())?;
        self.statement.clear();
        Ok(())
    }

    fn row(&self, record: &DiffRecord) -> String {
        let contributor_id = record
            .contributor_id
            .map_or_else(|| "NULL".to_owned(), |id| id.to_string());
        let payload = if self.base64_payloads {
            format!("FROM_BASE64('{}')", BASE64.encode(&record.payload))
        } else {
            format!("X'{}'", hex_encode(&record.payload))
        };
        format!(
            "({},{},{},{},{},'{}',{},{},'{}',{},{},{})",
            record.primary_key,
            record.article,
            record.revision,
            record.counter,
            record.timestamp.as_millis(),
            sql_escape(&record.contributor),
            contributor_id,
            u8::from(record.contributor_registered),
            sql_escape(&record.comment),
            u8::from(record.minor),
            record.full_revision,
            payload,
        )
    }
}

impl<W: Write + Send> RevisionSink for SqlSink<W> {
    fn write_revision(&mut self, record: &DiffRecord) -> Result<(), PipelineError> {
        let row = self.row(record);
        // +2 for the separator and terminator.
        if INSERT_HEADER.len() + row.len() + 2 > self.max_packet {
            return Err(PipelineError::RecordTooLarge {
                size: row.len(),
                max: self.max_packet,
            });
        }
        if !self.statement.is_empty()
            && self.statement.len() + row.len() + 2 > self.max_packet
        {
            self.flush_statement()?;
        }
        if self.statement.is_empty() {
            self.statement.push_str(INSERT_HEADER);
        } else {
            self.statement.push(',');
        }
        self.statement.push_str(&row);
        Ok(())
    }

    fn write_index(
        &mut self,
        table: IndexTable,
        chunk: &IndexChunk,
    ) -> Result<(), PipelineError> {
        let data = String::from_utf8_lossy(&chunk.data);
        let statement = format!(
            "INSERT INTO {} (sequence,records) VALUES ({},'{}');",
            table.name(),
            chunk.sequence,
            sql_escape(&data),
        );
        if statement.len() + 1 > self.max_packet {
            return Err(PipelineError::RecordTooLarge {
                size: statement.len(),
                max: self.max_packet,
            });
        }
        self.flush_statement()?;
        writeln!(self.writer, "{statement}")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        self.flush_statement()?;
        self.writer.flush()?;
        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

fn sql_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\'' => escaped.push_str("''"),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// Tab-separated output
// ============================================================================

/// Emits one tab-separated line per revision, payload base64- or
/// hex-encoded. Index chunks go out as `table<TAB>sequence<TAB>records`
/// lines.
pub struct CsvSink<W: Write> {
    writer: W,
    base64_payloads: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, base64_payloads: bool) -> Self {
        Self {
            writer,
            base64_payloads,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RevisionSink for CsvSink<W> {
    fn write_revision(&mut self, record: &DiffRecord) -> Result<(), PipelineError> {
        let contributor_id = record
            .contributor_id
            .map_or_else(String::new, |id| id.to_string());
        let payload = if self.base64_payloads {
            BASE64.encode(&record.payload)
        } else {
            hex_encode(&record.payload)
        };
        writeln!(
            self.writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            record.primary_key,
            record.article,
            record.revision,
            record.counter,
            record.timestamp.as_millis(),
            tsv_escape(&record.contributor),
            contributor_id,
            u8::from(record.contributor_registered),
            tsv_escape(&record.comment),
            u8::from(record.minor),
            record.full_revision,
            payload,
        )?;
        Ok(())
    }

    fn write_index(
        &mut self,
        table: IndexTable,
        chunk: &IndexChunk,
    ) -> Result<(), PipelineError> {
        let data = String::from_utf8_lossy(&chunk.data);
        writeln!(
            self.writer,
            "{}\t{}\t{}",
            table.name(),
            chunk.sequence,
            tsv_escape(data.trim_end_matches('\n')),
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        self.writer.flush()?;
        Ok(())
    }
}

fn tsv_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
}
