//! Streaming chunk production from uploaded tabular files.
//!
//! The producer drives a CSV reader over raw bytes in bounded row-batches,
//! applying normalization, segmentation, and near-duplicate filtering per
//! batch so the whole document is never materialized as chunks in memory.
//!
//! Two schemas are recognized:
//!
//! - **structured** crawl exports: a header containing a `crawl/loadedUrl`
//!   column plus a `markdown` or `text` column (the header may sit a few
//!   lines into the file);
//! - **generic** CSV: every row becomes one space-joined chunk, unmodified.
//!
//! Non-UTF-8 input fails fast before any chunk is emitted. Archives are
//! unpacked and their qualifying files streamed in archive order, each with
//! a fresh duplicate-filter window.

use std::io::{Cursor, Read};

use crate::chunking::dedupe::NearDuplicateFilter;
use crate::chunking::normalize::Normalizer;
use crate::chunking::segment::{Provenance, Segmenter};
use crate::config::{ChunkingConfig, DedupeConfig};
use crate::types::RagError;

/// Which parsing strategy a file resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    /// Crawl export with URL + markdown/text columns; rows are segmented.
    Structured,
    /// Unknown layout; rows pass through as single chunks.
    Generic,
}

/// An ingestion input: one tabular file or an archive of them.
#[derive(Clone, Debug)]
pub enum IngestSource {
    Csv { name: String, bytes: Vec<u8> },
    Archive { name: String, bytes: Vec<u8> },
}

impl IngestSource {
    /// Classifies an upload by file extension.
    pub fn from_upload(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, RagError> {
        let name = name.into();
        let lower = name.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(IngestSource::Csv { name, bytes })
        } else if lower.ends_with(".zip") {
            Ok(IngestSource::Archive { name, bytes })
        } else {
            Err(RagError::UnsupportedFile { name })
        }
    }

    /// The file names this source will process, in processing order.
    pub fn file_names(&self) -> Result<Vec<String>, RagError> {
        match self {
            IngestSource::Csv { name, .. } => Ok(vec![name.clone()]),
            IngestSource::Archive { bytes, .. } => {
                let files = archive_csv_files(bytes)?;
                if files.is_empty() {
                    return Err(RagError::EmptyArchive);
                }
                Ok(files.into_iter().map(|(name, _)| name).collect())
            }
        }
    }

    /// Flattens the source into `(name, bytes)` pairs in processing order.
    pub fn into_files(self) -> Result<Vec<(String, Vec<u8>)>, RagError> {
        match self {
            IngestSource::Csv { name, bytes } => Ok(vec![(name, bytes)]),
            IngestSource::Archive { bytes, .. } => {
                let files = archive_csv_files(&bytes)?;
                if files.is_empty() {
                    return Err(RagError::EmptyArchive);
                }
                Ok(files)
            }
        }
    }
}

fn archive_csv_files(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, RagError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| RagError::MalformedInput {
            message: format!("invalid zip archive: {err}"),
        })?;
    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| {
            RagError::MalformedInput {
                message: format!("unreadable archive entry: {err}"),
            }
        })?;
        if !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|err| RagError::MalformedInput {
                message: format!("failed to read archive entry: {err}"),
            })?;
        files.push((entry.name().to_string(), contents));
    }
    Ok(files)
}

/// Downloads a remote CSV, classifying the response body as a source.
pub async fn fetch_source(client: &reqwest::Client, url: &str) -> Result<IngestSource, RagError> {
    let response = client.get(url).send().await.map_err(|err| RagError::Fetch {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    if !response.status().is_success() {
        return Err(RagError::Fetch {
            url: url.to_string(),
            message: format!("status {}", response.status()),
        });
    }
    let bytes = response.bytes().await.map_err(|err| RagError::Fetch {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    let name = if url.to_lowercase().ends_with(".zip") {
        url.to_string()
    } else {
        // Default to CSV for extensionless download URLs.
        format!("{url}#download.csv")
    };
    IngestSource::from_upload(name, bytes.to_vec())
}

#[derive(Debug)]
struct Columns {
    title: Option<usize>,
    url: Option<usize>,
    loaded_url: Option<usize>,
    markdown: Option<usize>,
    text: Option<usize>,
}

/// Factory for per-file chunk streams.
#[derive(Clone, Debug)]
pub struct ChunkProducer {
    chunking: ChunkingConfig,
    dedupe: DedupeConfig,
    rows_per_read: usize,
}

impl ChunkProducer {
    pub fn new(chunking: ChunkingConfig, dedupe: DedupeConfig, rows_per_read: usize) -> Self {
        Self {
            chunking,
            dedupe,
            rows_per_read: rows_per_read.max(1),
        }
    }

    /// Opens a stream over one file's bytes. Decoding failure surfaces here,
    /// before any chunk is produced.
    pub fn open(&self, bytes: &[u8]) -> Result<ChunkStream, RagError> {
        let text = std::str::from_utf8(bytes).map_err(|_| RagError::InvalidEncoding)?;

        let (schema, reader_input) = match detect_structured_header(text) {
            Some(header_line) => {
                let offset = byte_offset_of_line(text, header_line);
                (SchemaKind::Structured, text[offset..].as_bytes().to_vec())
            }
            None => (SchemaKind::Generic, bytes.to_vec()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(schema == SchemaKind::Structured)
            .flexible(true)
            .from_reader(Cursor::new(reader_input));

        let columns = if schema == SchemaKind::Structured {
            let headers = reader
                .headers()
                .map_err(|err| RagError::MalformedInput {
                    message: format!("unreadable CSV header: {err}"),
                })?;
            Some(resolve_columns(headers))
        } else {
            None
        };

        Ok(ChunkStream {
            schema,
            reader,
            columns,
            normalizer: Normalizer::new(&self.chunking),
            segmenter: Segmenter::new(self.chunking.clone()),
            filter: NearDuplicateFilter::new(self.dedupe),
            rows_per_read: self.rows_per_read,
            done: false,
        })
    }
}

/// Looks for the structured-export header within the first ten lines.
fn detect_structured_header(text: &str) -> Option<usize> {
    for (index, line) in text.lines().take(10).enumerate() {
        if line.contains("crawl/loadedUrl") && (line.contains("markdown") || line.contains("text"))
        {
            return Some(index);
        }
    }
    None
}

fn byte_offset_of_line(text: &str, line_index: usize) -> usize {
    let mut offset = 0usize;
    for (index, line) in text.split_inclusive('\n').enumerate() {
        if index == line_index {
            return offset;
        }
        offset += line.len();
    }
    offset
}

fn resolve_columns(headers: &csv::StringRecord) -> Columns {
    let find = |name: &str| headers.iter().position(|h| h == name);
    Columns {
        title: find("metadata/title"),
        url: find("url"),
        loaded_url: find("crawl/loadedUrl"),
        markdown: find("markdown"),
        text: find("text"),
    }
}

/// A lazy, per-file chunk stream. Each [`next_chunks`](Self::next_chunks)
/// call reads up to `rows_per_read` rows and returns their chunks, already
/// normalized, segmented, and duplicate-filtered.
#[derive(Debug)]
pub struct ChunkStream {
    schema: SchemaKind,
    reader: csv::Reader<Cursor<Vec<u8>>>,
    columns: Option<Columns>,
    normalizer: Normalizer,
    segmenter: Segmenter,
    filter: NearDuplicateFilter,
    rows_per_read: usize,
    done: bool,
}

impl ChunkStream {
    pub fn schema(&self) -> SchemaKind {
        self.schema
    }

    /// Produces the next batch of chunks, or `None` once the file is
    /// exhausted. Row-level read errors end the stream with an error.
    pub fn next_chunks(&mut self) -> Option<Result<Vec<String>, RagError>> {
        if self.done {
            return None;
        }
        let mut chunks = Vec::new();
        let mut rows_read = 0usize;

        let mut record = csv::StringRecord::new();
        while rows_read < self.rows_per_read {
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    rows_read += 1;
                    match self.schema {
                        SchemaKind::Structured => self.chunk_structured_row(&record, &mut chunks),
                        SchemaKind::Generic => {
                            let joined = record
                                .iter()
                                .filter(|f| !f.trim().is_empty())
                                .collect::<Vec<_>>()
                                .join(" ");
                            if !joined.is_empty() {
                                chunks.push(joined);
                            }
                        }
                    }
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(RagError::MalformedInput {
                        message: format!("malformed CSV row: {err}"),
                    }));
                }
            }
        }

        if rows_read == 0 {
            return None;
        }
        Some(Ok(chunks))
    }

    fn chunk_structured_row(&mut self, record: &csv::StringRecord, out: &mut Vec<String>) {
        let columns = match &self.columns {
            Some(columns) => columns,
            None => return,
        };
        let field = |index: Option<usize>| -> &str {
            index
                .and_then(|i| record.get(i))
                .map(str::trim)
                .unwrap_or("")
        };

        let title = field(columns.title);
        let url = {
            let direct = field(columns.url);
            if direct.is_empty() {
                field(columns.loaded_url)
            } else {
                direct
            }
        };
        let markdown = field(columns.markdown);
        let text = field(columns.text);
        let content = if markdown.is_empty() { text } else { markdown };

        let cleaned = self.normalizer.clean(content);
        if cleaned.is_empty() {
            return;
        }
        let provenance = Provenance {
            title: title.to_string(),
            url: url.to_string(),
        };
        let produced = self.segmenter.chunk_document(&provenance, &cleaned);
        out.extend(self.filter.filter(produced));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn producer() -> ChunkProducer {
        ChunkProducer::new(ChunkingConfig::default(), DedupeConfig::default(), 400)
    }

    fn drain(stream: &mut ChunkStream) -> Vec<String> {
        let mut all = Vec::new();
        while let Some(batch) = stream.next_chunks() {
            all.extend(batch.unwrap());
        }
        all
    }

    const STRUCTURED_CSV: &str = "\
metadata/title,crawl/loadedUrl,markdown,text
Acme Pricing,https://acme.test/pricing,\"# Intro\n- a very short bullet\n- this bullet is definitely long enough to keep\",fallback text
";

    #[test]
    fn detects_structured_schema_and_segments_rows() {
        let producer = producer();
        let mut stream = producer.open(STRUCTURED_CSV.as_bytes()).unwrap();
        assert_eq!(stream.schema(), SchemaKind::Structured);

        let chunks = drain(&mut stream);
        let bullets: Vec<&String> = chunks.iter().filter(|c| c.contains("Bullet:")).collect();
        assert_eq!(bullets.len(), 1, "short bullet dropped, long bullet kept");
        assert!(bullets[0].contains("Title: Acme Pricing"));
        assert!(bullets[0].contains("URL: https://acme.test/pricing"));
    }

    #[test]
    fn header_detection_skips_preamble_lines() {
        let csv = format!("export v2\ngenerated 2026-01-01\n{STRUCTURED_CSV}");
        let producer = producer();
        let stream = producer.open(csv.as_bytes()).unwrap();
        assert_eq!(stream.schema(), SchemaKind::Structured);
    }

    #[test]
    fn falls_back_to_generic_rows() {
        let producer = producer();
        let mut stream = producer
            .open(b"widget,blue,42\ngadget,red,7\n")
            .unwrap();
        assert_eq!(stream.schema(), SchemaKind::Generic);
        let chunks = drain(&mut stream);
        assert_eq!(chunks, vec!["widget blue 42", "gadget red 7"]);
    }

    #[test]
    fn non_utf8_input_fails_before_any_chunk() {
        let err = producer().open(&[0xff, 0xfe, 0x00, 0x41]).unwrap_err();
        assert!(matches!(err, RagError::InvalidEncoding));
    }

    #[test]
    fn rows_are_read_in_bounded_batches() {
        let mut csv = String::from("a,b\n");
        for i in 0..10 {
            csv.push_str(&format!("row{i},value{i}\n"));
        }
        let producer = ChunkProducer::new(ChunkingConfig::default(), DedupeConfig::default(), 4);
        let mut stream = producer.open(csv.as_bytes()).unwrap();
        let first = stream.next_chunks().unwrap().unwrap();
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = IngestSource::from_upload("notes.pdf", vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFile { .. }));
    }

    #[test]
    fn corrupt_archive_is_a_parse_error_not_a_type_error() {
        let source = IngestSource::from_upload("broken.zip", b"not a zip".to_vec()).unwrap();
        let err = source.file_names().unwrap_err();
        assert!(matches!(err, RagError::MalformedInput { .. }));
        assert!(err.to_string().starts_with("malformed input:"));
    }

    #[test]
    fn archive_files_stream_in_order() {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("b.csv", options).unwrap();
            writer.write_all(b"b1,b2\n").unwrap();
            writer.start_file("skip.txt", options).unwrap();
            writer.write_all(b"ignored").unwrap();
            writer.start_file("a.csv", options).unwrap();
            writer.write_all(b"a1,a2\n").unwrap();
            writer.finish().unwrap();
        }
        let source = IngestSource::from_upload("bundle.zip", buf).unwrap();
        let names = source.file_names().unwrap();
        assert_eq!(names, vec!["b.csv", "a.csv"]);

        let files = source.into_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].1, b"b1,b2\n");
    }

    #[test]
    fn empty_archive_is_an_input_error() {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"nothing tabular").unwrap();
            writer.finish().unwrap();
        }
        let source = IngestSource::from_upload("empty.zip", buf).unwrap();
        assert!(matches!(source.file_names(), Err(RagError::EmptyArchive)));
    }
}
