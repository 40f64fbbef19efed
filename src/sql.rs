use std::collections::HashMap;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::Deserialize;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertSpace(NewSpace),
    UpdateSpace {
        id: Ulid,
        changes: SpaceChanges,
    },
    DeleteSpace {
        id: Ulid,
    },
    SelectSpaces(SpaceFilter),
    SelectSpaceTypes,
    InsertBooking(NewBooking),
    UpdateBooking {
        id: Ulid,
        changes: BookingChanges,
    },
    CancelBooking {
        id: Ulid,
    },
    ConfirmBooking {
        id: Ulid,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBooking {
        id: Ulid,
    },
    SelectUserBookings(BookingFilter),
    SelectSpaceBookings {
        space_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    },
    SelectAvailability {
        space_id: Ulid,
        date: NaiveDate,
        /// Check one proposed slot instead of listing free windows.
        slot: Option<Slot>,
        min_duration: Option<i64>,
    },
}

/// Positional column order when an INSERT omits its column list.
const SPACE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "description",
    "type",
    "capacity",
    "photos",
    "available_hours",
    "active",
];
const BOOKING_COLUMNS: &[&str] = &[
    "id",
    "space_id",
    "date",
    "start_time",
    "end_time",
    "attendees",
    "purpose",
    "notes",
];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() || trimmed == ";" {
        return Err(SqlError::Empty);
    }
    if trimmed
        .get(..6)
        .is_some_and(|w| w.eq_ignore_ascii_case("update"))
    {
        return parse_update(trimmed);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// Column name → value for a single-row INSERT.
struct Row {
    table: &'static str,
    cols: Vec<(String, Expr)>,
}

impl Row {
    fn get(&self, col: &str) -> Option<&Expr> {
        self.cols.iter().find(|(c, _)| c == col).map(|(_, e)| e)
    }

    fn require(&self, col: &'static str) -> Result<&Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(self.table, col))
    }

    fn check_known(&self, known: &[&str]) -> Result<(), SqlError> {
        match self.cols.iter().find(|(c, _)| !known.contains(&c.as_str())) {
            Some((c, _)) => Err(SqlError::UnknownColumn(c.clone())),
            None => Ok(()),
        }
    }
}

fn insert_row(
    insert: &ast::Insert,
    table: &'static str,
    default_columns: &[&str],
) -> Result<Row, SqlError> {
    let rows = extract_all_insert_rows(insert)?;
    if rows.len() > 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    let values = rows.into_iter().next().unwrap_or_default();

    let columns: Vec<String> = if insert.columns.is_empty() {
        if values.len() > default_columns.len() {
            return Err(SqlError::WrongArity(table, default_columns.len(), values.len()));
        }
        default_columns.iter().map(|c| c.to_string()).collect()
    } else {
        if insert.columns.len() != values.len() {
            return Err(SqlError::WrongArity(table, insert.columns.len(), values.len()));
        }
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };

    let row = Row {
        table,
        cols: columns.into_iter().zip(values).collect(),
    };
    row.check_known(default_columns)?;
    Ok(row)
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "spaces" => {
            let row = insert_row(insert, "spaces", SPACE_COLUMNS)?;
            Ok(Command::InsertSpace(NewSpace {
                id: parse_ulid(row.require("id")?)?,
                name: parse_string(row.require("name")?)?,
                description: row
                    .get("description")
                    .map(parse_opt_string)
                    .transpose()?
                    .flatten()
                    .unwrap_or_default(),
                kind: parse_string(row.require("type")?)?,
                capacity: parse_u32(row.require("capacity")?)?,
                photos: row
                    .get("photos")
                    .map(parse_photos)
                    .transpose()?
                    .unwrap_or_default(),
                hours: row.get("available_hours").map(parse_hours).transpose()?.flatten(),
                active: row.get("active").map(parse_bool).transpose()?.unwrap_or(true),
            }))
        }
        "bookings" => {
            let row = insert_row(insert, "bookings", BOOKING_COLUMNS)?;
            Ok(Command::InsertBooking(NewBooking {
                id: parse_ulid(row.require("id")?)?,
                space_id: parse_ulid(row.require("space_id")?)?,
                date: parse_date(row.require("date")?)?,
                start: parse_time(row.require("start_time")?)?,
                end: parse_time(row.require("end_time")?)?,
                attendees: row.get("attendees").map(parse_opt_u32).transpose()?.flatten(),
                purpose: row.get("purpose").map(parse_opt_string).transpose()?.flatten(),
                notes: row.get("notes").map(parse_opt_string).transpose()?.flatten(),
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(sql)
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    if !parser.parse_keyword(Keyword::UPDATE) {
        return Err(SqlError::Unsupported(sql.to_string()));
    }
    let name = parser
        .parse_object_name(false)
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    let table = object_name_last(&name).ok_or_else(|| SqlError::Parse("empty table name".into()))?;
    if !parser.parse_keyword(Keyword::SET) {
        return Err(SqlError::Parse("expected SET".into()));
    }
    let assignments = parser
        .parse_comma_separated(|p| p.parse_assignment())
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    let selection = if parser.parse_keyword(Keyword::WHERE) {
        Some(parser.parse_expr().map_err(|e| SqlError::Parse(e.to_string()))?)
    } else {
        None
    };
    while parser.consume_token(&Token::SemiColon) {}
    if parser.peek_token().token != Token::EOF {
        return Err(SqlError::Unsupported("trailing input after UPDATE".into()));
    }

    let id = extract_where_id(&selection)?;
    let mut set = Vec::with_capacity(assignments.len());
    for a in &assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.push((col, &a.value));
    }

    match table.as_str() {
        "spaces" => parse_space_changes(id, &set),
        "bookings" => parse_booking_changes(id, &set),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_space_changes(id: Ulid, set: &[(String, &Expr)]) -> Result<Command, SqlError> {
    let mut changes = SpaceChanges::default();
    for (col, value) in set {
        match col.as_str() {
            "name" => changes.name = Some(parse_string(value)?),
            "description" => changes.description = Some(parse_opt_string(value)?.unwrap_or_default()),
            "type" => changes.kind = Some(parse_string(value)?),
            "capacity" => changes.capacity = Some(parse_u32(value)?),
            "photos" => changes.photos = Some(parse_photos(value)?),
            "available_hours" => changes.hours = Some(parse_hours(value)?),
            "active" => changes.active = Some(parse_bool(value)?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }
    Ok(Command::UpdateSpace { id, changes })
}

fn parse_booking_changes(id: Ulid, set: &[(String, &Expr)]) -> Result<Command, SqlError> {
    if let Some((_, value)) = set.iter().find(|(c, _)| c == "status") {
        if set.len() > 1 {
            return Err(SqlError::Unsupported(
                "status must be changed on its own".into(),
            ));
        }
        let status = parse_string(value)?;
        return match BookingStatus::parse(&status) {
            Some(BookingStatus::Cancelled) => Ok(Command::CancelBooking { id }),
            Some(BookingStatus::Confirmed) => Ok(Command::ConfirmBooking { id }),
            _ => Err(SqlError::Unsupported(format!("status transition to '{status}'"))),
        };
    }

    let mut changes = BookingChanges::default();
    for (col, value) in set {
        match col.as_str() {
            "space_id" => changes.space_id = Some(parse_ulid(value)?),
            "date" => changes.date = Some(parse_date(value)?),
            "start_time" => changes.start = Some(parse_time(value)?),
            "end_time" => changes.end = Some(parse_time(value)?),
            "attendees" => changes.attendees = Some(parse_u32(value)?),
            "purpose" => changes.purpose = Some(parse_opt_string(value)?),
            "notes" => changes.notes = Some(parse_opt_string(value)?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }
    Ok(Command::UpdateBooking { id, changes })
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "spaces" => Ok(Command::DeleteSpace { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

/// One `column <op> value` comparison from a WHERE clause.
struct Predicate<'a> {
    col: String,
    op: BinaryOperator,
    value: &'a Expr,
}

fn collect_predicates<'a>(expr: &'a Expr, out: &mut Vec<Predicate<'a>>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_predicates(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_predicates(left, out)?;
            collect_predicates(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("predicate {expr}")))?;
            out.push(Predicate {
                col,
                op: op.clone(),
                value: right,
            });
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("predicate {other}"))),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut preds = Vec::new();
    if let Some(selection) = &select.selection {
        collect_predicates(selection, &mut preds)?;
    }

    match table.as_str() {
        "spaces" => select_spaces(&preds),
        "space_types" => Ok(Command::SelectSpaceTypes),
        "bookings" => select_bookings(&preds),
        "availability" => select_availability(&preds),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn bad_predicate(p: &Predicate) -> SqlError {
    SqlError::Unsupported(format!("filter {} {}", p.col, p.op))
}

fn select_spaces(preds: &[Predicate]) -> Result<Command, SqlError> {
    let mut filter = SpaceFilter::default();
    for p in preds {
        match (p.col.as_str(), &p.op) {
            ("id", BinaryOperator::Eq) => filter.id = Some(parse_ulid(p.value)?),
            ("type", BinaryOperator::Eq) => filter.kind = Some(parse_string(p.value)?),
            ("capacity", BinaryOperator::GtEq) => filter.min_capacity = Some(parse_u32(p.value)?),
            ("active", BinaryOperator::Eq) => filter.active = Some(parse_bool(p.value)?),
            _ => return Err(bad_predicate(p)),
        }
    }
    Ok(Command::SelectSpaces(filter))
}

fn select_bookings(preds: &[Predicate]) -> Result<Command, SqlError> {
    let mut id = None;
    let mut space_id = None;
    let mut filter = BookingFilter::default();
    for p in preds {
        match (p.col.as_str(), &p.op) {
            ("id", BinaryOperator::Eq) => id = Some(parse_ulid(p.value)?),
            ("space_id", BinaryOperator::Eq) => space_id = Some(parse_ulid(p.value)?),
            ("date", BinaryOperator::Eq) => {
                let d = parse_date(p.value)?;
                filter.from = Some(d);
                filter.to = Some(d);
            }
            ("date", BinaryOperator::GtEq) => filter.from = Some(parse_date(p.value)?),
            ("date", BinaryOperator::LtEq) => filter.to = Some(parse_date(p.value)?),
            ("status", BinaryOperator::Eq) => {
                let s = parse_string(p.value)?;
                filter.status = Some(
                    BookingStatus::parse(&s)
                        .ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))?,
                );
            }
            ("timeframe", BinaryOperator::Eq) => {
                let s = parse_string(p.value)?;
                filter.timeframe = Some(
                    Timeframe::parse(&s)
                        .ok_or_else(|| SqlError::Parse(format!("bad timeframe: {s}")))?,
                );
            }
            _ => return Err(bad_predicate(p)),
        }
    }

    if let Some(id) = id {
        return Ok(Command::SelectBooking { id });
    }
    if let Some(space_id) = space_id {
        return Ok(Command::SelectSpaceBookings {
            space_id,
            from: filter.from.ok_or(SqlError::MissingFilter("date"))?,
            to: filter.to.ok_or(SqlError::MissingFilter("date"))?,
        });
    }
    Ok(Command::SelectUserBookings(filter))
}

fn select_availability(preds: &[Predicate]) -> Result<Command, SqlError> {
    let (mut space_id, mut date, mut start, mut end, mut min_duration) =
        (None, None, None, None, None);
    for p in preds {
        match (p.col.as_str(), &p.op) {
            ("space_id", BinaryOperator::Eq) => space_id = Some(parse_ulid(p.value)?),
            ("date", BinaryOperator::Eq) => date = Some(parse_date(p.value)?),
            ("start_time", BinaryOperator::Eq) => start = Some(parse_time(p.value)?),
            ("end_time", BinaryOperator::Eq) => end = Some(parse_time(p.value)?),
            ("min_duration", BinaryOperator::Eq) => min_duration = Some(parse_i64(p.value)?),
            _ => return Err(bad_predicate(p)),
        }
    }

    let slot = match (start, end) {
        (None, None) => None,
        (Some(s), Some(e)) => Some(
            Slot::try_new(s, e)
                .ok_or_else(|| SqlError::Parse("end_time must be after start_time".into()))?,
        ),
        (None, Some(_)) => return Err(SqlError::MissingFilter("start_time")),
        (Some(_), None) => return Err(SqlError::MissingFilter("end_time")),
    };

    Ok(Command::SelectAvailability {
        space_id: space_id.ok_or(SqlError::MissingFilter("space_id"))?,
        date: date.ok_or(SqlError::MissingFilter("date"))?,
        slot,
        min_duration,
    })
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::Nested(inner) => extract_where_id(&Some(inner.as_ref().clone())),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        Expr::Nested(inner) | Expr::Cast { expr: inner, .. } => extract_value(inner),
        _ => None,
    }
}

/// Literal as text; `None` for NULL.
fn literal_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(
            Value::SingleQuotedString(s)
            | Value::EscapedStringLiteral(s)
            | Value::DollarQuotedString(ast::DollarQuotedString { value: s, .. })
            | Value::Number(s, _),
        ) => Ok(Some(s.clone())),
        Some(Value::Boolean(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(SqlError::Parse(format!("unexpected literal {other:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn required_text(expr: &Expr) -> Result<String, SqlError> {
    literal_text(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    required_text(expr)
}

fn parse_opt_string(expr: &Expr) -> Result<Option<String>, SqlError> {
    literal_text(expr)
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = required_text(expr)?;
    Ulid::from_string(s.trim()).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let s = required_text(expr)?;
    s.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad integer '{s}': {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_opt_u32(expr: &Expr) -> Result<Option<u32>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_u32(expr).map(Some)
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    let s = required_text(expr)?;
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Ok(true),
        "false" | "f" | "0" | "no" => Ok(false),
        _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = required_text(expr)?;
    parse_date_str(&s)
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = required_text(expr)?;
    parse_time_str(&s)
}

pub fn parse_date_str(s: &str) -> Result<NaiveDate, SqlError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date '{s}': {e}")))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time_str(s: &str) -> Result<NaiveTime, SqlError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| SqlError::Parse(format!("bad time '{s}': {e}")))
}

fn parse_photos(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match literal_text(expr)? {
        None => Ok(Vec::new()),
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| SqlError::Parse(format!("photos must be a JSON array of URLs: {e}"))),
    }
}

#[derive(Deserialize)]
struct DayHours {
    start: String,
    end: String,
}

/// `{"monday": {"start": "08:00", "end": "20:00"}, ...}`; NULL clears.
fn parse_hours(expr: &Expr) -> Result<Option<WeeklyHours>, SqlError> {
    let Some(json) = literal_text(expr)? else {
        return Ok(None);
    };
    parse_hours_json(&json).map(Some)
}

pub fn parse_hours_json(json: &str) -> Result<WeeklyHours, SqlError> {
    let days: HashMap<String, DayHours> = serde_json::from_str(json)
        .map_err(|e| SqlError::Parse(format!("bad available_hours: {e}")))?;
    let mut hours = WeeklyHours::default();
    for (day, window) in days {
        let weekday = Weekday::from_str(&day)
            .map_err(|_| SqlError::Parse(format!("bad weekday: {day}")))?;
        let start = parse_time_str(&window.start)?;
        let end = parse_time_str(&window.end)?;
        let slot = Slot::try_new(start, end)
            .ok_or_else(|| SqlError::Parse(format!("{day}: close must be after open")))?;
        hours.set(weekday, slot);
    }
    Ok(hours)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    MissingColumn(&'static str, &'static str),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing column {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
