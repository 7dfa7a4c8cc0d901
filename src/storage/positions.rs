// src/storage/positions.rs
//! Short-position rows: `ticker,type,strike,expiration,credit,quantity`
//! followed by optional `target_pct,floor,note`. Files carry a header row,
//! pasted blocks don't.

use crate::config::BuybackConfig;
use crate::error::EngineError;
use crate::types::{ContractKey, OptionType, ShortPosition};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{info, warn};

const HEADER: [&str; 9] = [
    "ticker",
    "type",
    "strike",
    "expiration",
    "credit",
    "quantity",
    "target_pct",
    "floor",
    "note",
];

/// Applied to rows that leave `target_pct` / `floor` empty.
#[derive(Debug, Clone, Copy)]
pub struct PositionDefaults {
    pub target_capture_pct: Decimal,
    pub floor_price: Option<Decimal>,
}

impl From<&BuybackConfig> for PositionDefaults {
    fn from(config: &BuybackConfig) -> Self {
        Self {
            target_capture_pct: config.default_target_capture_pct,
            floor_price: config.default_floor_price,
        }
    }
}

impl Default for PositionDefaults {
    fn default() -> Self {
        (&BuybackConfig::default()).into()
    }
}

#[derive(Debug, Default)]
pub struct ParsedPositions {
    pub positions: Vec<ShortPosition>,
    /// One `MalformedRecord` per skipped row.
    pub rejected: Vec<EngineError>,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    ticker: usize,
    option_type: usize,
    strike: usize,
    expiration: usize,
    credit: usize,
    quantity: usize,
    target: Option<usize>,
    floor: Option<usize>,
    note: Option<usize>,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        ticker: 0,
        option_type: 1,
        strike: 2,
        expiration: 3,
        credit: 4,
        quantity: 5,
        target: Some(6),
        floor: Some(7),
        note: Some(8),
    };

    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));
        let require = |aliases: &[&str]| match find(aliases) {
            Some(idx) => Ok(idx),
            None => bail!("position file is missing a '{}' column", aliases[0]),
        };

        Ok(Self {
            ticker: require(&["ticker", "symbol"])?,
            option_type: require(&["type", "option_type", "right"])?,
            strike: require(&["strike"])?,
            expiration: require(&["expiration", "expiry", "exp"])?,
            credit: require(&["credit", "credit_received", "premium"])?,
            quantity: require(&["quantity", "qty", "contracts"])?,
            target: find(&["target_pct", "target", "target_capture_pct"]),
            floor: find(&["floor", "floor_price"]),
            note: find(&["note", "notes"]),
        })
    }
}

fn malformed(line: usize, reason: impl ToString) -> EngineError {
    EngineError::MalformedRecord {
        line,
        reason: reason.to_string(),
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn parse_decimal(raw: &str, name: &str) -> Result<Decimal, String> {
    raw.trim_start_matches('$')
        .parse::<Decimal>()
        .map_err(|_| format!("bad {} '{}'", name, raw))
}

fn parse_optional_decimal(raw: &str, name: &str) -> Result<Option<Decimal>, String> {
    if raw.is_empty() {
        Ok(None)
    } else {
        parse_decimal(raw, name).map(Some)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .map_err(|_| format!("bad expiration '{}'", raw))
}

fn parse_row(
    record: &StringRecord,
    columns: &Columns,
    defaults: &PositionDefaults,
    today: NaiveDate,
    line: usize,
) -> Result<ShortPosition, EngineError> {
    let optional = |idx: Option<usize>| idx.map(|i| field(record, i)).unwrap_or("");

    let option_type: OptionType = field(record, columns.option_type)
        .parse()
        .map_err(|e| malformed(line, e))?;
    let strike = parse_decimal(field(record, columns.strike), "strike").map_err(|e| malformed(line, e))?;
    let expiration = parse_date(field(record, columns.expiration)).map_err(|e| malformed(line, e))?;
    let credit = parse_decimal(field(record, columns.credit), "credit").map_err(|e| malformed(line, e))?;
    let quantity_raw = field(record, columns.quantity);
    let quantity: u32 = quantity_raw
        .parse()
        .map_err(|_| malformed(line, format!("bad quantity '{}'", quantity_raw)))?;
    let target = parse_optional_decimal(optional(columns.target), "target_pct")
        .map_err(|e| malformed(line, e))?
        .unwrap_or(defaults.target_capture_pct);
    let floor = parse_optional_decimal(optional(columns.floor), "floor")
        .map_err(|e| malformed(line, e))?
        .or(defaults.floor_price);

    let key = ContractKey::new(field(record, columns.ticker), option_type, strike, expiration)
        .map_err(|e| malformed(line, e))?;
    if key.is_expired(today) {
        return Err(malformed(line, format!("{} has already expired", key)));
    }

    ShortPosition::new(key, credit, quantity, target, floor)
        .map(|p| p.with_note(optional(columns.note)))
        .map_err(|e| malformed(line, e))
}

fn read_records<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    columns: &Columns,
    defaults: &PositionDefaults,
    today: NaiveDate,
) -> ParsedPositions {
    let mut parsed = ParsedPositions::default();

    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(idx + 1);
                warn!(line, error = %e, "Skipping unreadable position row");
                parsed.rejected.push(malformed(line, e));
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 1);
        match parse_row(&record, columns, defaults, today, line) {
            Ok(position) => parsed.positions.push(position),
            Err(e) => {
                warn!(error = %e, "Skipping position row");
                parsed.rejected.push(e);
            }
        }
    }

    parsed
}

/// Pasted block, one contract per line in file column order, no header.
pub fn parse_positions_text(
    text: &str,
    defaults: &PositionDefaults,
    today: NaiveDate,
) -> ParsedPositions {
    let reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());
    read_records(reader, &Columns::POSITIONAL, defaults, today)
}

/// Loads a position file. Only an unreadable file or a missing required
/// column fails the load; bad rows land in `rejected`.
pub fn load_positions_file(
    path: &Path,
    defaults: &PositionDefaults,
    today: NaiveDate,
) -> Result<ParsedPositions> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("opening position file {}", path.display()))?;
    let columns = Columns::from_headers(reader.headers()?)?;

    let parsed = read_records(reader, &columns, defaults, today);
    info!(
        path = %path.display(),
        loaded = parsed.positions.len(),
        rejected = parsed.rejected.len(),
        "Loaded position file"
    );
    Ok(parsed)
}

pub fn save_positions(path: &Path, positions: &[ShortPosition]) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("creating position file {}", path.display()))?;
    writer.write_record(HEADER)?;

    for p in positions {
        writer.write_record([
            p.key.ticker.clone(),
            p.key.option_type.to_string(),
            p.key.strike.to_string(),
            p.key.expiration.to_string(),
            p.credit_received.to_string(),
            p.quantity.to_string(),
            p.target_capture_pct.to_string(),
            p.floor_price.map(|f| f.to_string()).unwrap_or_default(),
            p.note.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
