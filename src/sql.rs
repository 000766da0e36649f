use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

/// Parsed command from SQL input.
///
/// The surface is three virtual tables: `availability` (the cell store),
/// `available_count` and `status_counts` (per-date aggregates).
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Single-row `INSERT INTO availability`: one cell upsert.
    UpsertCell {
        unit_id: Ulid,
        date: Day,
        status: UnitStatus,
        notes: Option<String>,
    },
    /// Multi-row `INSERT INTO availability`: an atomic batch of upserts.
    UpsertCells { cells: Vec<UpsertEntry> },
    /// `UPDATE availability SET status = .. WHERE unit_id IN .. AND date ..`,
    /// the cartesian bulk edit.
    BulkUpdate {
        unit_ids: Vec<Ulid>,
        dates: Vec<Day>,
        status: UnitStatus,
        notes: Option<String>,
    },
    /// `SELECT * FROM availability WHERE ..`: inclusive range read.
    SelectRange {
        unit_ids: Vec<Ulid>,
        from: Day,
        to: Day,
    },
    SelectAvailableCount { date: Day, unit_ids: Vec<Ulid> },
    SelectStatusCounts { date: Day, unit_ids: Vec<Ulid> },
    /// `DELETE FROM availability WHERE unit_id = .. AND date = ..`: revert a
    /// cell to the sparse default.
    ClearCell { unit_id: Ulid, date: Day },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "availability" {
        return Err(SqlError::UnknownTable(table));
    }

    let rows = extract_all_insert_rows(insert)?;
    let mut cells = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() < 3 {
            return Err(SqlError::WrongArity("availability", 3, row.len()));
        }
        let row_err = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
        cells.push(UpsertEntry {
            unit_id: parse_ulid_expr(&row[0]).map_err(row_err)?,
            date: parse_day_expr(&row[1]).map_err(row_err)?,
            status: parse_status_expr(&row[2]).map_err(row_err)?,
            notes: if row.len() >= 4 {
                parse_string_or_null(&row[3]).map_err(row_err)?
            } else {
                None
            },
        });
    }

    if cells.len() == 1 {
        let cell = cells.into_iter().next().unwrap();
        Ok(Command::UpsertCell {
            unit_id: cell.unit_id,
            date: cell.date,
            status: cell.status,
            notes: cell.notes,
        })
    } else {
        Ok(Command::UpsertCells { cells })
    }
}

// ── UPDATE (bulk edit) ────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    if table != "availability" {
        return Err(SqlError::UnknownTable(table));
    }

    let mut status = None;
    let mut notes = None;
    for assignment in assignments {
        match assignment_column(assignment).as_deref() {
            Some("status") => status = Some(parse_status_expr(&assignment.value)?),
            Some("notes") => notes = parse_string_or_null(&assignment.value)?,
            Some(other) => {
                return Err(SqlError::Unsupported(format!("SET {other}")));
            }
            None => return Err(SqlError::Parse("unsupported assignment target".into())),
        }
    }
    let status = status.ok_or(SqlError::MissingFilter("status assignment"))?;

    let selection = selection.as_ref().ok_or(SqlError::MissingFilter("unit_id"))?;
    let mut filters = CellFilters::default();
    collect_cell_filters(selection, &mut filters)?;

    if filters.unit_ids.is_empty() {
        return Err(SqlError::MissingFilter("unit_id"));
    }
    if filters.dates.is_empty() {
        return Err(SqlError::MissingFilter("date"));
    }

    Ok(Command::BulkUpdate {
        unit_ids: filters.unit_ids,
        dates: filters.dates,
        status,
        notes,
    })
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "availability" {
        return Err(SqlError::UnknownTable(table));
    }

    let selection = delete
        .selection
        .as_ref()
        .ok_or(SqlError::MissingFilter("unit_id"))?;
    let mut filters = CellFilters::default();
    collect_cell_filters(selection, &mut filters)?;

    match (filters.unit_ids.as_slice(), filters.dates.as_slice()) {
        ([unit_id], [date]) => Ok(Command::ClearCell {
            unit_id: *unit_id,
            date: *date,
        }),
        ([], _) => Err(SqlError::MissingFilter("unit_id")),
        (_, []) => Err(SqlError::MissingFilter("date")),
        _ => Err(SqlError::Unsupported(
            "DELETE targets exactly one cell".into(),
        )),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "availability" => {
            let mut filters = RangeFilters::default();
            if let Some(selection) = &select.selection {
                collect_range_filters(selection, &mut filters)?;
            }
            if filters.unit_ids.is_empty() {
                return Err(SqlError::MissingFilter("unit_id"));
            }
            let from = filters.from.ok_or(SqlError::MissingFilter("date"))?;
            let to = filters.to.ok_or(SqlError::MissingFilter("date"))?;
            Ok(Command::SelectRange {
                unit_ids: filters.unit_ids,
                from,
                to,
            })
        }
        "available_count" | "status_counts" => {
            let mut filters = RangeFilters::default();
            if let Some(selection) = &select.selection {
                collect_range_filters(selection, &mut filters)?;
            }
            if filters.unit_ids.is_empty() {
                return Err(SqlError::MissingFilter("unit_id"));
            }
            let date = match (filters.from, filters.to) {
                (Some(from), Some(to)) if from == to => from,
                (Some(_), Some(_)) => {
                    return Err(SqlError::Unsupported("counts take a single date".into()));
                }
                _ => return Err(SqlError::MissingFilter("date")),
            };
            if table == "available_count" {
                Ok(Command::SelectAvailableCount {
                    date,
                    unit_ids: filters.unit_ids,
                })
            } else {
                Ok(Command::SelectStatusCounts {
                    date,
                    unit_ids: filters.unit_ids,
                })
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE walkers ─────────────────────────────────────────────

/// Filters for range reads: a unit set plus a `[from, to]` window.
#[derive(Default)]
struct RangeFilters {
    unit_ids: Vec<Ulid>,
    from: Option<Day>,
    to: Option<Day>,
}

fn collect_range_filters(expr: &Expr, filters: &mut RangeFilters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_range_filters(left, filters)?;
                collect_range_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("unit_id") => filters.unit_ids.push(parse_ulid_expr(right)?),
                Some("date") => {
                    let d = parse_day_expr(right)?;
                    filters.from = Some(d);
                    filters.to = Some(d);
                }
                _ => {}
            },
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("date") {
                    filters.from = Some(parse_day_expr(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("date") {
                    filters.to = Some(parse_day_expr(right)?);
                }
            }
            _ => {}
        },
        Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            if expr_column_name(expr).as_deref() == Some("unit_id") {
                for item in list {
                    filters.unit_ids.push(parse_ulid_expr(item)?);
                }
            }
        }
        Expr::Between {
            expr,
            negated: false,
            low,
            high,
        } => {
            if expr_column_name(expr).as_deref() == Some("date") {
                filters.from = Some(parse_day_expr(low)?);
                filters.to = Some(parse_day_expr(high)?);
            }
        }
        Expr::Nested(inner) => collect_range_filters(inner, filters)?,
        _ => {}
    }
    Ok(())
}

/// Filters for cell-set edits: a unit set plus an explicit date set.
/// `BETWEEN` expands to the inclusive day list.
#[derive(Default)]
struct CellFilters {
    unit_ids: Vec<Ulid>,
    dates: Vec<Day>,
}

fn collect_cell_filters(expr: &Expr, filters: &mut CellFilters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_cell_filters(left, filters)?;
                collect_cell_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("unit_id") => filters.unit_ids.push(parse_ulid_expr(right)?),
                Some("date") => filters.dates.push(parse_day_expr(right)?),
                _ => {}
            },
            _ => {}
        },
        Expr::InList {
            expr,
            list,
            negated: false,
        } => match expr_column_name(expr).as_deref() {
            Some("unit_id") => {
                for item in list {
                    filters.unit_ids.push(parse_ulid_expr(item)?);
                }
            }
            Some("date") => {
                for item in list {
                    filters.dates.push(parse_day_expr(item)?);
                }
            }
            _ => {}
        },
        Expr::Between {
            expr,
            negated: false,
            low,
            high,
        } => {
            if expr_column_name(expr).as_deref() == Some("date") {
                let from = parse_day_expr(low)?;
                let to = parse_day_expr(high)?;
                if from > to {
                    return Err(SqlError::Parse(format!("empty date range {from}..{to}")));
                }
                if (to - from).num_days() + 1 > MAX_QUERY_WINDOW_DAYS {
                    return Err(SqlError::Parse("date range too wide".into()));
                }
                filters.dates.extend(days_inclusive(from, to));
            }
        }
        Expr::Nested(inner) => collect_cell_filters(inner, filters)?,
        _ => {}
    }
    Ok(())
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

fn assignment_column(assignment: &ast::Assignment) -> Option<String> {
    match &assignment.target {
        ast::AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
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
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad unit id: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_day_expr(expr: &Expr) -> Result<Day, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            parse_day(s).ok_or_else(|| SqlError::Parse(format!("bad date: {s}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected date, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_status_expr(expr: &Expr) -> Result<UnitStatus, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => UnitStatus::parse_token(s)
            .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}"))),
        Some(value) => Err(SqlError::Parse(format!("expected status, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!(
            "expected string or NULL, got {value:?}"
        ))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
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
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U1: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const U2: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn day(s: &str) -> Day {
        parse_day(s).unwrap()
    }

    #[test]
    fn parse_upsert_cell() {
        let sql =
            format!("INSERT INTO availability (unit_id, date, status) VALUES ('{U1}', '2026-08-05', 'booked')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpsertCell {
                unit_id,
                date,
                status,
                notes,
            } => {
                assert_eq!(unit_id.to_string(), U1);
                assert_eq!(date, day("2026-08-05"));
                assert_eq!(status, UnitStatus::Booked);
                assert_eq!(notes, None);
            }
            _ => panic!("expected UpsertCell, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_upsert_cell_with_notes() {
        let sql = format!(
            "INSERT INTO availability (unit_id, date, status, notes) VALUES ('{U1}', '2026-08-05', 'maintenance', 'boiler swap')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpsertCell { status, notes, .. } => {
                assert_eq!(status, UnitStatus::Maintenance);
                assert_eq!(notes.as_deref(), Some("boiler swap"));
            }
            _ => panic!("expected UpsertCell, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_upsert_cell_null_notes() {
        let sql = format!(
            "INSERT INTO availability (unit_id, date, status, notes) VALUES ('{U1}', '2026-08-05', 'reserved', NULL)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpsertCell { notes, .. } => assert_eq!(notes, None),
            _ => panic!("expected UpsertCell, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_multi_row_insert_is_batch() {
        let sql = format!(
            "INSERT INTO availability (unit_id, date, status) VALUES ('{U1}', '2026-08-05', 'booked'), ('{U2}', '2026-08-06', 'reserved')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpsertCells { cells } => {
                assert_eq!(cells.len(), 2);
                assert_eq!(cells[0].status, UnitStatus::Booked);
                assert_eq!(cells[1].date, day("2026-08-06"));
            }
            _ => panic!("expected UpsertCells, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unknown_status_errors() {
        let sql = format!(
            "INSERT INTO availability (unit_id, date, status) VALUES ('{U1}', '2026-08-05', 'vacant')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_bad_date_errors() {
        let sql = format!(
            "INSERT INTO availability (unit_id, date, status) VALUES ('{U1}', '2026-13-05', 'booked')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_bulk_update_in_lists() {
        let sql = format!(
            "UPDATE availability SET status = 'maintenance' WHERE unit_id IN ('{U1}', '{U2}') AND date IN ('2026-08-05', '2026-08-06')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::BulkUpdate {
                unit_ids,
                dates,
                status,
                notes,
            } => {
                assert_eq!(unit_ids.len(), 2);
                assert_eq!(dates, vec![day("2026-08-05"), day("2026-08-06")]);
                assert_eq!(status, UnitStatus::Maintenance);
                assert_eq!(notes, None);
            }
            _ => panic!("expected BulkUpdate, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_bulk_update_between_expands_days() {
        let sql = format!(
            "UPDATE availability SET status = 'out_of_service', notes = 'reroof' WHERE unit_id = '{U1}' AND date BETWEEN '2026-08-01' AND '2026-08-03'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::BulkUpdate {
                unit_ids,
                dates,
                status,
                notes,
            } => {
                assert_eq!(unit_ids.len(), 1);
                assert_eq!(
                    dates,
                    vec![day("2026-08-01"), day("2026-08-02"), day("2026-08-03")]
                );
                assert_eq!(status, UnitStatus::OutOfService);
                assert_eq!(notes.as_deref(), Some("reroof"));
            }
            _ => panic!("expected BulkUpdate, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_bulk_update_requires_filters() {
        let sql = format!("UPDATE availability SET status = 'booked' WHERE unit_id = '{U1}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("date"))
        ));

        let sql = "UPDATE availability SET status = 'booked' WHERE date = '2026-08-05'";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingFilter("unit_id"))
        ));
    }

    #[test]
    fn parse_bulk_update_requires_status() {
        let sql = format!(
            "UPDATE availability SET notes = 'x' WHERE unit_id = '{U1}' AND date = '2026-08-05'"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter(_))));
    }

    #[test]
    fn parse_bulk_update_reversed_between_errors() {
        let sql = format!(
            "UPDATE availability SET status = 'booked' WHERE unit_id = '{U1}' AND date BETWEEN '2026-08-09' AND '2026-08-01'"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_range() {
        let sql = format!(
            "SELECT * FROM availability WHERE unit_id IN ('{U1}', '{U2}') AND date >= '2026-08-01' AND date <= '2026-08-14'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectRange {
                unit_ids,
                from,
                to,
            } => {
                assert_eq!(unit_ids.len(), 2);
                assert_eq!(from, day("2026-08-01"));
                assert_eq!(to, day("2026-08-14"));
            }
            _ => panic!("expected SelectRange, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_range_between() {
        let sql = format!(
            "SELECT * FROM availability WHERE unit_id = '{U1}' AND date BETWEEN '2026-08-01' AND '2026-08-07'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectRange { from, to, .. } => {
                assert_eq!(from, day("2026-08-01"));
                assert_eq!(to, day("2026-08-07"));
            }
            _ => panic!("expected SelectRange, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_range_single_day() {
        let sql =
            format!("SELECT * FROM availability WHERE unit_id = '{U1}' AND date = '2026-08-05'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectRange { from, to, .. } => {
                assert_eq!(from, to);
                assert_eq!(from, day("2026-08-05"));
            }
            _ => panic!("expected SelectRange, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_available_count() {
        let sql = format!(
            "SELECT * FROM available_count WHERE date = '2026-08-05' AND unit_id IN ('{U1}', '{U2}')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailableCount { date, unit_ids } => {
                assert_eq!(date, day("2026-08-05"));
                assert_eq!(unit_ids.len(), 2);
            }
            _ => panic!("expected SelectAvailableCount, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_status_counts() {
        let sql = format!(
            "SELECT * FROM status_counts WHERE date = '2026-08-05' AND unit_id IN ('{U1}')"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::SelectStatusCounts { .. }));
    }

    #[test]
    fn parse_counts_require_universe() {
        let sql = "SELECT * FROM available_count WHERE date = '2026-08-05'";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingFilter("unit_id"))
        ));
    }

    #[test]
    fn parse_clear_cell() {
        let sql = format!(
            "DELETE FROM availability WHERE unit_id = '{U1}' AND date = '2026-08-05'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::ClearCell { unit_id, date } => {
                assert_eq!(unit_id.to_string(), U1);
                assert_eq!(date, day("2026-08-05"));
            }
            _ => panic!("expected ClearCell, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_requires_both_filters() {
        let sql = format!("DELETE FROM availability WHERE unit_id = '{U1}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("date"))
        ));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO bookings (unit_id) VALUES ('{U1}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
