//! Book stream: per-spin records with their client event logs

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// One client-visible event inside a spin's log
///
/// The event log is opaque to the pipeline: payouts are settled from
/// `payoutMultiplier` alone and events never alter it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    /// A ball settled in a bucket (`index` is the draw ordinal in the chain)
    PlinkoResult {
        index: u32,
        bucket_index: u16,
        multiplier: i64,
    },
    /// Running total after a draw, in cents
    SetTotalWin { amount: i64 },
    /// Settled total for the spin, in cents
    FinalWin { amount: i64 },
}

/// One spin record in the book stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// 1-based record id, dense over the stream
    pub id: u64,
    /// Total payout of the spin, in integer cents
    pub payout_multiplier: i64,
    pub events: Vec<Event>,
}

/// Write records as newline-delimited JSON
pub fn write_books<W: Write>(mut w: W, books: &[Book]) -> Result<(), FormatError> {
    for book in books {
        serde_json::to_writer(&mut w, book)
            .map_err(|e| FormatError::Io(std::io::Error::other(e)))?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

/// Read a newline-delimited JSON book stream
pub fn read_books<R: BufRead>(r: R) -> Result<Vec<Book>, FormatError> {
    let mut books = Vec::new();
    for (lineno, line) in r.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let book: Book = serde_json::from_str(&line)
            .map_err(|e| FormatError::parse(lineno + 1, e.to_string()))?;
        books.push(book);
    }
    Ok(books)
}

pub fn load_books(path: &std::path::Path) -> Result<Vec<Book>, FormatError> {
    let file = std::fs::File::open(path)?;
    read_books(std::io::BufReader::new(file))
}
