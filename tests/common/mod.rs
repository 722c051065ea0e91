// ABOUTME: In-memory Database fake for table sync tests
// ABOUTME: Understands the SHOW/SELECT/CREATE/REPLACE statements the sync core emits

#![allow(dead_code)]

use async_trait::async_trait;
use mysql_table_replicator::mysql::{Database, DbError, Disconnect, RawRow, RowCursor};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const READINGS_DDL: &str = "CREATE TABLE `readings` (\n  `id` int(11) NOT NULL,\n  `value` double DEFAULT NULL,\n  `ts` datetime NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

pub const PEOPLE_DDL: &str = "CREATE TABLE `people` (\n  `id` int(11) NOT NULL,\n  `name` varchar(64) DEFAULT NULL,\n  `score` decimal(30,15) DEFAULT NULL,\n  `updated_at` datetime NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

#[derive(Debug, Clone)]
pub struct FakeColumn {
    pub name: String,
    pub declared_type: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub create_statement: String,
    pub columns: Vec<FakeColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl FakeTable {
    /// Build a table from a `SHOW CREATE TABLE`-style statement.
    pub fn from_ddl(ddl: &str) -> (String, Self) {
        let mut lines = ddl.lines();
        let name = idents(lines.next().expect("empty DDL"))
            .into_iter()
            .next()
            .expect("DDL without table name");

        let mut columns: Vec<FakeColumn> = Vec::new();
        for line in lines {
            let line = line.trim().trim_end_matches(',');
            if line.starts_with('`') {
                let col = idents(line).into_iter().next().unwrap();
                let rest = line[col.len() + 2..].trim();
                let declared_type = rest.split_whitespace().next().unwrap_or_default();
                columns.push(FakeColumn {
                    name: col,
                    declared_type: declared_type.to_string(),
                    key: String::new(),
                });
            } else if line.starts_with("PRIMARY KEY") {
                for key_col in idents(line) {
                    if let Some(c) = columns.iter_mut().find(|c| c.name == key_col) {
                        c.key = "PRI".to_string();
                    }
                }
            } else if line.starts_with("UNIQUE KEY") {
                for key_col in idents(line).into_iter().skip(1) {
                    if let Some(c) = columns.iter_mut().find(|c| c.name == key_col) {
                        c.key = "UNI".to_string();
                    }
                }
            }
        }

        (
            name,
            Self {
                create_statement: ddl.to_string(),
                columns,
                rows: Vec::new(),
            },
        )
    }

    fn column_index(&self, name: &str) -> usize {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .unwrap_or_else(|| panic!("unknown column {}", name))
    }

    fn key_indexes(&self) -> Vec<usize> {
        let pri: Vec<usize> = (0..self.columns.len())
            .filter(|i| self.columns[*i].key == "PRI")
            .collect();
        if !pri.is_empty() {
            return pri;
        }
        (0..self.columns.len())
            .filter(|i| self.columns[*i].key == "UNI")
            .collect()
    }
}

struct FailRule {
    prefix: String,
    occurrence: Option<usize>,
    seen: usize,
    error: DbError,
}

struct StreamFailure {
    prefix: String,
    after_rows: usize,
    error: DbError,
}

/// An in-memory stand-in for a MySQL database.
#[derive(Default)]
pub struct FakeDb {
    pub tables: BTreeMap<String, FakeTable>,
    /// Every statement received, in order
    pub log: Vec<String>,
    /// Set once `disconnect` has been called, whether or not it failed
    pub closed: Arc<AtomicBool>,
    fail_rules: Vec<FailRule>,
    stream_failures: Vec<StreamFailure>,
    signals: Vec<(String, broadcast::Sender<()>)>,
    disconnect_error: Option<DbError>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, ddl: &str) -> Self {
        let (name, table) = FakeTable::from_ddl(ddl);
        self.tables.insert(name, table);
        self
    }

    pub fn insert(&mut self, table: &str, row: &[Option<&str>]) {
        let t = self.tables.get_mut(table).expect("unknown table");
        assert_eq!(row.len(), t.columns.len(), "row width mismatch");
        t.rows.push(row.iter().map(|c| c.map(str::to_string)).collect());
    }

    /// Rows of `table` sorted by their first column.
    pub fn rows(&self, table: &str) -> Vec<Vec<Option<String>>> {
        let mut rows = self.tables.get(table).expect("unknown table").rows.clone();
        rows.sort_by(|a, b| {
            let a = a[0].as_deref().unwrap_or_default();
            let b = b[0].as_deref().unwrap_or_default();
            a.parse::<i64>()
                .ok()
                .zip(b.parse::<i64>().ok())
                .map(|(x, y)| x.cmp(&y))
                .unwrap_or_else(|| a.cmp(b))
        });
        rows
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Fail statements starting with `prefix`. With `occurrence = Some(n)` only the
    /// n-th (1-based) matching statement fails; with `None` every one does.
    pub fn fail_when(&mut self, prefix: &str, occurrence: Option<usize>, error: DbError) {
        self.fail_rules.push(FailRule {
            prefix: prefix.to_string(),
            occurrence,
            seen: 0,
            error,
        });
    }

    /// Make cursors of queries starting with `prefix` yield `after_rows` rows, then fail.
    pub fn fail_stream_after(&mut self, prefix: &str, after_rows: usize, error: DbError) {
        self.stream_failures.push(StreamFailure {
            prefix: prefix.to_string(),
            after_rows,
            error,
        });
    }

    /// Send on `sender` every time a statement starting with `prefix` is executed.
    pub fn signal_on(&mut self, prefix: &str, sender: broadcast::Sender<()>) {
        self.signals.push((prefix.to_string(), sender));
    }

    pub fn fail_disconnect(&mut self, error: DbError) {
        self.disconnect_error = Some(error);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn statements_starting_with(&self, prefix: &str) -> Vec<&str> {
        self.log
            .iter()
            .filter(|s| s.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    fn check_failure(&mut self, sql: &str) -> Result<(), DbError> {
        for rule in &mut self.fail_rules {
            if sql.starts_with(&rule.prefix) {
                rule.seen += 1;
                if rule.occurrence.map_or(true, |n| n == rule.seen) {
                    return Err(rule.error.clone());
                }
            }
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&FakeTable, DbError> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::server(1146, format!("Table 'test.{}' doesn't exist", name)))
    }

    fn run_query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, DbError> {
        if let Some(rest) = sql.strip_prefix("SHOW CREATE TABLE ") {
            let name = single_ident(rest);
            let table = self.table(&name)?;
            return Ok(vec![vec![Some(name), Some(table.create_statement.clone())]]);
        }

        if let Some(rest) = sql.strip_prefix("SHOW COLUMNS FROM ") {
            let table = self.table(&single_ident(rest))?;
            return Ok(table
                .columns
                .iter()
                .map(|c| {
                    vec![
                        Some(c.name.clone()),
                        Some(c.declared_type.clone()),
                        Some("YES".to_string()),
                        Some(c.key.clone()),
                        None,
                        Some(String::new()),
                    ]
                })
                .collect());
        }

        if sql.starts_with("SELECT MAX(") {
            let names = idents(sql);
            let table = self.table(&names[1])?;
            let idx = table.column_index(&names[0]);
            let max = table
                .rows
                .iter()
                .filter_map(|r| r[idx].clone())
                .max();
            return Ok(vec![vec![max]]);
        }

        if let Some(rest) = sql.strip_prefix("SELECT ") {
            let (column_list, rest) = rest.split_once(" FROM ").expect("SELECT without FROM");
            let (table_part, where_part) = rest.split_once(" WHERE ").expect("SELECT without WHERE");
            let table = self.table(&single_ident(table_part))?;

            let (where_col, literal) = where_part.split_once(" >= ").expect("expected >=");
            let where_idx = table.column_index(&single_ident(where_col));
            let mut chars = literal.chars().peekable();
            assert_eq!(chars.next(), Some('\''), "watermark must be a quoted literal");
            let bound = read_quoted(&mut chars);

            let projection: Vec<usize> = idents(column_list)
                .iter()
                .map(|c| table.column_index(c))
                .collect();

            return Ok(table
                .rows
                .iter()
                .filter(|r| r[where_idx].as_deref().map_or(false, |v| v >= bound.as_str()))
                .map(|r| projection.iter().map(|i| r[*i].clone()).collect())
                .collect());
        }

        panic!("FakeDb cannot run query: {}", sql);
    }

    fn run_execute(&mut self, sql: &str) -> Result<u64, DbError> {
        if sql.starts_with("CREATE TABLE ") {
            let (name, table) = FakeTable::from_ddl(sql);
            if self.tables.contains_key(&name) {
                return Err(DbError::server(1050, format!("Table '{}' already exists", name)));
            }
            self.tables.insert(name, table);
            return Ok(0);
        }

        if let Some(rest) = sql.strip_prefix("REPLACE INTO ") {
            let (head, values) = rest.split_once(") VALUES ").expect("REPLACE without VALUES");
            let names = idents(head);
            let table_name = names[0].clone();
            let table = self
                .tables
                .get_mut(&table_name)
                .ok_or_else(|| DbError::server(1146, format!("Table 'test.{}' doesn't exist", table_name)))?;

            let positions: Vec<usize> = names[1..].iter().map(|c| table.column_index(c)).collect();
            let keys = table.key_indexes();
            let mut affected = 0;

            for tuple in parse_tuples(values) {
                assert_eq!(tuple.len(), positions.len(), "tuple width mismatch: {}", sql);
                let mut row = vec![None; table.columns.len()];
                for (value, pos) in tuple.into_iter().zip(&positions) {
                    row[*pos] = value;
                }

                if !keys.is_empty() {
                    let before = table.rows.len();
                    table
                        .rows
                        .retain(|existing| keys.iter().any(|k| existing[*k] != row[*k]));
                    affected += (before - table.rows.len()) as u64;
                }
                table.rows.push(row);
                affected += 1;
            }
            return Ok(affected);
        }

        panic!("FakeDb cannot execute: {}", sql);
    }
}

struct FakeCursor {
    rows: std::vec::IntoIter<Vec<Option<String>>>,
    emitted: usize,
    fail_after: Option<(usize, DbError)>,
}

#[async_trait]
impl RowCursor for FakeCursor {
    async fn next_row(&mut self) -> Result<Option<RawRow>, DbError> {
        if let Some((after_rows, error)) = &self.fail_after {
            if self.emitted == *after_rows {
                return Err(error.clone());
            }
        }
        let row = self.rows.next().map(RawRow::new);
        if row.is_some() {
            self.emitted += 1;
        }
        Ok(row)
    }
}

#[async_trait]
impl Database for FakeDb {
    async fn query_stream<'a>(
        &'a mut self,
        sql: &str,
    ) -> Result<Box<dyn RowCursor + 'a>, DbError> {
        self.log.push(sql.to_string());
        self.check_failure(sql)?;
        let rows = self.run_query(sql)?;
        let fail_after = self
            .stream_failures
            .iter()
            .find(|f| sql.starts_with(&f.prefix))
            .map(|f| (f.after_rows, f.error.clone()));
        Ok(Box::new(FakeCursor {
            rows: rows.into_iter(),
            emitted: 0,
            fail_after,
        }))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        self.log.push(sql.to_string());
        for (prefix, sender) in &self.signals {
            if sql.starts_with(prefix.as_str()) {
                let _ = sender.send(());
            }
        }
        self.check_failure(sql)?;
        self.run_execute(sql)
    }
}

#[async_trait]
impl Disconnect for FakeDb {
    async fn disconnect(self) -> Result<(), DbError> {
        self.closed.store(true, Ordering::SeqCst);
        match self.disconnect_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// All backtick-quoted identifiers in `s`, in order.
pub fn idents(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find('`') {
        let after = &rest[start + 1..];
        let end = after.find('`').expect("unterminated identifier");
        out.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    out
}

fn single_ident(s: &str) -> String {
    idents(s).into_iter().next().expect("expected identifier")
}

/// Read a MySQL string literal body after its opening quote, undoing backslash escapes.
fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some('0') => out.push('\0'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(c) => out.push(c),
                None => panic!("dangling escape"),
            },
            Some('\'') => {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                } else {
                    return out;
                }
            }
            Some(c) => out.push(c),
            None => panic!("unterminated string literal"),
        }
    }
}

/// Parse `(v1,v2),(v3,v4)` into rows of optional strings.
pub fn parse_tuples(values: &str) -> Vec<Vec<Option<String>>> {
    let mut chars = values.chars().peekable();
    let mut tuples = Vec::new();

    loop {
        match chars.next() {
            None => break,
            Some('(') => {}
            Some(',') | Some(' ') => continue,
            Some(c) => panic!("unexpected '{}' between tuples", c),
        }

        let mut tuple = Vec::new();
        loop {
            let value = if chars.peek() == Some(&'\'') {
                chars.next();
                Some(read_quoted(&mut chars))
            } else {
                let mut token = String::new();
                while let Some(c) = chars.peek() {
                    if *c == ',' || *c == ')' {
                        break;
                    }
                    token.push(*c);
                    chars.next();
                }
                if token == "NULL" {
                    None
                } else {
                    Some(token)
                }
            };
            tuple.push(value);

            match chars.next() {
                Some(',') => continue,
                Some(')') => break,
                other => panic!("unexpected {:?} inside tuple", other),
            }
        }
        tuples.push(tuple);
    }

    tuples
}
