//! Tabular decoder: delimited text to [`RawRow`]s.
//!
//! The first non-empty line is the header. Columns are looked up by name,
//! so their order in the file does not matter and unknown columns are
//! ignored. Malformed rows are reported individually; decoding keeps going
//! so the caller sees every structural problem at once.

use crc32fast::Hasher as Crc32;
use csv_async::{AsyncReaderBuilder, ByteRecord};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, warn};

use crate::record::{Field, RawRow, RowError};

/// Output of a successful decode.
#[derive(Debug, Default)]
pub struct DecodedFile {
    pub rows: Vec<RawRow>,
    /// Header names as written, trimmed.
    pub headers: Vec<String>,
    /// CRC32 over every decoded cell, unit-separator joined.
    pub digest: u32,
}

/// Column position of each known field, if the header has it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    slots: [Option<usize>; 5],
}

impl ColumnMap {
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut map = Self::default();
        for (idx, h) in headers.into_iter().enumerate() {
            if let Some(field) = Field::from_header(h) {
                let slot = &mut map.slots[slot_of(field)];
                if slot.is_none() {
                    *slot = Some(idx);
                }
            }
        }
        map
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        self.slots[slot_of(field)]
    }

    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.position(*f).is_none())
            .collect()
    }
}

fn slot_of(field: Field) -> usize {
    Field::ALL
        .iter()
        .position(|f| *f == field)
        .unwrap_or_default()
}

fn is_blank(record: &ByteRecord) -> bool {
    record.iter().all(|cell| cell.iter().all(u8::is_ascii_whitespace))
}

/// Where the byte scanner sits relative to CSV quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Follows the reader's quoting rules byte by byte. A quote only opens a
/// quoted field at the start of a cell; elsewhere it is literal.
#[derive(Debug)]
struct QuoteScan {
    delimiter: u8,
    state: QuoteState,
}

impl QuoteScan {
    fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            state: QuoteState::FieldStart,
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        use QuoteState::*;
        for &b in bytes {
            self.state = match (self.state, b) {
                (Quoted, b'"') => QuoteInQuoted,
                (Quoted, _) => Quoted,
                (QuoteInQuoted, b'"') => Quoted,
                (FieldStart, b'"') => Quoted,
                (_, b'\n' | b'\r') => FieldStart,
                (_, d) if d == self.delimiter => FieldStart,
                _ => Unquoted,
            };
        }
    }

    /// True when input ended inside a quoted field.
    fn is_open(&self) -> bool {
        self.state == QuoteState::Quoted
    }
}

/// Passes bytes through to the CSV reader while feeding a [`QuoteScan`].
struct QuoteTracking<R> {
    inner: R,
    scan: Arc<Mutex<QuoteScan>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for QuoteTracking<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &polled {
            this.scan
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .feed(&buf.filled()[before..]);
        }
        polled
    }
}

/// What happened to the most recent record, so an unterminated quote can be
/// pinned on the record that swallowed the rest of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastRecord {
    Nothing,
    Blank,
    Row,
    Malformed,
}

/// Decodes a whole upload. `Err` carries one entry per malformed row; a read
/// failure adds one final entry at the row where reading stopped.
pub async fn decode_rows<R>(reader: R, delimiter: u8) -> Result<DecodedFile, Vec<RowError>>
where
    R: AsyncRead + Unpin + Send,
{
    let scan = Arc::new(Mutex::new(QuoteScan::new(delimiter)));
    let tracked = QuoteTracking {
        inner: reader,
        scan: Arc::clone(&scan),
    };
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        // width is checked per row below so one short row does not end the file
        .flexible(true)
        .delimiter(delimiter)
        .buffer_capacity(1 << 16)
        .create_reader(tracked);

    let headers: Vec<String> = match rdr.byte_headers().await {
        Ok(h) => h
            .iter()
            .map(|cell| {
                String::from_utf8_lossy(cell)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .to_string()
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "could not read header row");
            return Err(vec![RowError::new(2, format!("Could not read file: {e}"))]);
        }
    };
    let width = headers.len();
    let columns = ColumnMap::from_headers(headers.iter().map(String::as_str));
    if !columns.missing().is_empty() {
        debug!(missing = ?columns.missing(), "header lacks known columns");
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    let mut crc = Crc32::new();
    let mut record = ByteRecord::new();
    let mut index = 0usize;
    let mut last = LastRecord::Nothing;

    loop {
        match rdr.read_byte_record(&mut record).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!(row = index + 2, error = %e, "reader failed mid-file");
                errors.push(RowError::new(
                    index + 2,
                    format!("Could not read file: {e}"),
                ));
                return Err(errors);
            }
        }
        if is_blank(&record) {
            last = LastRecord::Blank;
            continue;
        }
        index += 1;
        let row_no = index + 1;
        last = LastRecord::Malformed;

        if record.len() != width {
            errors.push(RowError::new(
                row_no,
                format!(
                    "Row has {} fields but the header has {}.",
                    record.len(),
                    width
                ),
            ));
            continue;
        }

        let mut raw = RawRow::new(index);
        let mut bad_utf8 = false;
        for field in Field::ALL {
            let Some(pos) = columns.position(field) else {
                continue;
            };
            let cell = record.get(pos).unwrap_or_default();
            match std::str::from_utf8(cell) {
                Ok(s) => raw.set(field, s.to_string()),
                Err(_) => bad_utf8 = true,
            }
        }
        if bad_utf8 {
            errors.push(RowError::new(row_no, "Row contains invalid UTF-8 text."));
            continue;
        }

        for (i, cell) in record.iter().enumerate() {
            if i > 0 {
                crc.update(&[0x1f]);
            }
            crc.update(cell);
        }
        crc.update(b"\n");
        rows.push(raw);
        last = LastRecord::Row;
    }

    let unterminated = scan.lock().unwrap_or_else(|e| e.into_inner()).is_open();
    if unterminated {
        // the open quote ran to EOF, so the last record holds everything after it
        let row_no = match last {
            LastRecord::Row => {
                rows.pop();
                index + 1
            }
            LastRecord::Malformed => {
                errors.pop();
                index + 1
            }
            LastRecord::Blank | LastRecord::Nothing => index + 2,
        };
        warn!(row = row_no, "quoted field never closed");
        errors.push(RowError::new(row_no, "Unterminated quoted field."));
    }

    if !errors.is_empty() {
        debug!(malformed = errors.len(), rows = index, "decode found malformed rows");
        return Err(errors);
    }

    Ok(DecodedFile {
        rows,
        headers,
        digest: crc.finalize(),
    })
}
