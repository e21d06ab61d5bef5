//! Lookup table: the RGS-side mirror of the book stream's payout column

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// One lookup row: `<id>,<weight>,<payout_cents>`
///
/// Ids are 1-based and dense in stream order; the weight column is
/// uniformly 1 because every book is equally likely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRow {
    pub id: u64,
    pub weight: u64,
    pub payout_cents: i64,
}

/// Write rows as headerless CSV
pub fn write_lookup<W: Write>(mut w: W, rows: &[LookupRow]) -> Result<(), FormatError> {
    for row in rows {
        writeln!(w, "{},{},{}", row.id, row.weight, row.payout_cents)?;
    }
    Ok(())
}

/// Read a headerless CSV lookup table
pub fn read_lookup<R: BufRead>(r: R) -> Result<Vec<LookupRow>, FormatError> {
    let mut rows = Vec::new();
    for (lineno, line) in r.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split(',');
        let mut next = |name: &str| {
            cols.next()
                .ok_or_else(|| FormatError::parse(lineno + 1, format!("missing {name} column")))
        };
        let id = next("id")?;
        let weight = next("weight")?;
        let payout = next("payout")?;
        let parse_u64 = |s: &str, name: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|e| FormatError::parse(lineno + 1, format!("bad {name}: {e}")))
        };
        let payout_cents = payout
            .trim()
            .parse::<i64>()
            .map_err(|e| FormatError::parse(lineno + 1, format!("bad payout: {e}")))?;
        rows.push(LookupRow {
            id: parse_u64(id, "id")?,
            weight: parse_u64(weight, "weight")?,
            payout_cents,
        });
    }
    Ok(rows)
}

pub fn load_lookup(path: &std::path::Path) -> Result<Vec<LookupRow>, FormatError> {
    let file = std::fs::File::open(path)?;
    read_lookup(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_roundtrip() {
        let rows = vec![
            LookupRow {
                id: 1,
                weight: 1,
                payout_cents: 16_666_00,
            },
            LookupRow {
                id: 2,
                weight: 1,
                payout_cents: 0,
            },
        ];
        let mut buf = Vec::new();
        write_lookup(&mut buf, &rows).unwrap();
        assert_eq!(
            String::from_utf8(buf.clone()).unwrap(),
            "1,1,1666600\n2,1,0\n"
        );
        assert_eq!(read_lookup(&buf[..]).unwrap(), rows);
    }

    #[test]
    fn test_short_row_rejected() {
        let err = read_lookup(&b"1,1\n"[..]).unwrap_err();
        assert!(matches!(err, FormatError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_bad_payout_rejected() {
        let err = read_lookup(&b"1,1,abc\n"[..]).unwrap_err();
        assert!(matches!(err, FormatError::Parse { line: 1, .. }));
    }
}
