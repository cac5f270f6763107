//! Value sanitizer - canonicalizes raw workbook cells
//!
//! Every function in this module is total: input that cannot be coerced
//! becomes `None`, never a panic. Callers branch on presence before a value
//! is used as part of a natural key or written as a property.

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A raw cell exactly as read from a sheet
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Render the cell as text before any cleaning. `Empty` has no text.
    fn raw_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(format_float(*f)),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::DateTime(dt) => Some(format_datetime(dt)),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<f64> for Cell {
    fn from(f: f64) -> Self {
        Cell::Float(f)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Empty)
    }
}

/// Integral floats render without a fractional part ("12", not "12.0"),
/// so numeric identifiers read from a spreadsheet keep their natural form.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// =============================================================================
// CANONICAL VALUES
// =============================================================================

/// A sanitized value, usable as a natural-key component or a graph property
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Text(_) => 2,
        }
    }
}

// Total order so dimension records can be deduplicated and sorted. Floats
// compare with `total_cmp`; values of different kinds order by kind.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

// =============================================================================
// SANITIZER CONTRACT
// =============================================================================

/// False for an empty cell, a NaN float, or text that trims to "" or "nan".
pub fn is_present(cell: &Cell) -> bool {
    match cell {
        Cell::Empty => false,
        Cell::Float(f) => !f.is_nan(),
        Cell::Text(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("nan")
        }
        Cell::Int(_) | Cell::Bool(_) | Cell::DateTime(_) => true,
    }
}

/// Integer through a float intermediate: "12.0", "12" and 12.7 all give 12.
pub fn to_integer(cell: &Cell) -> Option<i64> {
    let f = match cell {
        Cell::Int(i) => return Some(*i),
        Cell::Bool(b) => return Some(i64::from(*b)),
        Cell::Float(f) => *f,
        Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        Cell::Empty | Cell::DateTime(_) => return None,
    };
    float_to_i64(f)
}

/// Decimal accepting a comma separator ("12,5" == "12.5").
pub fn to_decimal(cell: &Cell) -> Option<f64> {
    let f = match cell {
        Cell::Int(i) => *i as f64,
        Cell::Float(f) => *f,
        Cell::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        Cell::Empty | Cell::Bool(_) | Cell::DateTime(_) => return None,
    };
    f.is_finite().then_some(f)
}

/// NBSP to space, whitespace runs collapsed, trimmed. "", "nan" and "none"
/// (any case) are absent.
pub fn normalize_text(cell: &Cell) -> Option<String> {
    let raw = cell.raw_text()?;
    let collapsed = raw
        .replace('\u{00A0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    match collapsed.to_ascii_lowercase().as_str() {
        "" | "nan" | "none" => None,
        _ => Some(collapsed),
    }
}

/// Canonical form for code-like keys: integral numbers (or integral numeric
/// text such as "100" or "100.0") become integers, anything else stays text.
/// Applying this on both the dimension side and the fact side keeps keys
/// comparable no matter how the spreadsheet typed the cell.
pub fn to_code(cell: &Cell) -> Option<Value> {
    match cell {
        Cell::Int(i) => Some(Value::Int(*i)),
        Cell::Float(f) if f.is_finite() && f.fract() == 0.0 => float_to_i64(*f).map(Value::Int),
        _ => {
            let text = normalize_text(cell)?;
            Some(match parse_integral(&text) {
                Some(i) => Value::Int(i),
                None => Value::Text(text),
            })
        }
    }
}

fn float_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

/// "42", "-7", "100.0" parse; "1e3", "12.5" and "C01" do not.
fn parse_integral(text: &str) -> Option<i64> {
    let digits = match text.split_once('.') {
        Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => text,
    };
    digits.parse::<i64>().ok()
}

/// How a column's raw cells become canonical values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    Code,
    Integer,
}

impl Coercion {
    pub fn apply(self, cell: &Cell) -> Option<Value> {
        if !is_present(cell) {
            return None;
        }
        match self {
            Coercion::Text => normalize_text(cell).map(Value::Text),
            Coercion::Code => to_code(cell),
            Coercion::Integer => to_integer(cell).map(Value::Int),
        }
    }
}
