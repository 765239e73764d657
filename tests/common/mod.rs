#![allow(dead_code)]


use anyhow::anyhow;
use log::LevelFilter;
use skiff::{
    BinaryOpType, Expr, Order, Ordered, QueryDescriptor, RawRow, Result, Transport,
    TransportCursor, Value,
};
use std::{
    cmp::{self, Ordering as CmpOrdering},
    collections::HashMap,
    env,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

#[derive(Debug, Default)]
pub struct Stats {
    pub opens: AtomicUsize,
    pub fetches: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Stats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }
    fn index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|v| v == name)
    }
}

/// In-memory data source for the tests: resolves descriptors against plain
/// vectors of rows, applying filter, ordering, annotations and eager joins,
/// and counts every `open`/`fetch`/`close` so the resource-discipline
/// properties can be asserted.
pub struct MemoryTransport {
    tables: HashMap<String, Table>,
    stats: Arc<Stats>,
    fail_fetch_at: Option<usize>,
    fail_close: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            stats: Arc::new(Stats::default()),
            fail_fetch_at: None,
            fail_close: false,
        }
    }

    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Make the n-th fetch call (1-based, across the transport) fail.
    pub fn fail_fetch_at(mut self, call: usize) -> Self {
        self.fail_fetch_at = Some(call);
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    fn execute(&self, query: &QueryDescriptor) -> Result<Vec<RawRow>> {
        let table = self
            .tables
            .get(query.table_name())
            .ok_or_else(|| anyhow!("Unknown table `{}`", query.table_name()))?;
        let mut rows = table
            .rows
            .iter()
            .filter(|row| match query.filter() {
                Some(expression) => truthy(&eval(expression, &table.columns, row)),
                None => true,
            })
            .collect::<Vec<_>>();
        // Stable sorts applied innermost-key first give multi-key ordering.
        for Ordered { expression, order } in query.ordering().iter().rev() {
            let Expr::Column(name) = expression else {
                continue;
            };
            let Some(index) = table.index(name) else {
                continue;
            };
            rows.sort_by(|a, b| {
                let ordering = cmp_values(&a[index], &b[index]);
                match order {
                    Order::ASC => ordering,
                    Order::DESC => ordering.reverse(),
                }
            });
        }
        rows.iter()
            .map(|row| self.project(query, table, row))
            .collect()
    }

    fn project(&self, query: &QueryDescriptor, table: &Table, row: &[Value]) -> Result<RawRow> {
        let mut out = Vec::with_capacity(query.columns().len());
        for name in query.projected() {
            let index = table
                .index(name)
                .ok_or_else(|| anyhow!("Unknown column `{name}` in `{}`", query.table_name()))?;
            out.push(row[index].clone());
        }
        for annotation in query.annotations() {
            out.push(eval(&annotation.expression, &table.columns, row));
        }
        // Resolved join rows by relation path, for nested slices.
        let mut joined: Vec<(&[String], Option<(&Table, &Vec<Value>)>)> = Vec::new();
        for slice in query.relations() {
            let parent: Option<(&Table, &[Value])> = if slice.path.len() == 1 {
                Some((table, row))
            } else {
                joined
                    .iter()
                    .find(|(path, _)| *path == slice.parent_path())
                    .and_then(|(_, v)| v.map(|(t, r)| (t, r.as_slice())))
            };
            let related = parent.and_then(|(parent_table, parent_row)| {
                let fk = parent_table
                    .index(&format!("{}_id", slice.field()))
                    .map(|i| &parent_row[i])?;
                if fk.is_null() {
                    return None;
                }
                let related_table = self.tables.get(slice.table)?;
                let pk = related_table.index(&slice.labels[slice.pk_index])?;
                related_table
                    .rows
                    .iter()
                    .find(|r| r[pk] == *fk)
                    .map(|r| (related_table, r))
            });
            match related {
                Some((related_table, related_row)) => {
                    for label in slice.labels.iter() {
                        let index = related_table
                            .index(label)
                            .ok_or_else(|| anyhow!("Unknown column `{label}` in `{}`", slice.table))?;
                        out.push(related_row[index].clone());
                    }
                }
                None => out.extend(slice.labels.iter().map(|_| Value::Null)),
            }
            joined.push((&slice.path, related));
        }
        Ok(out.into_boxed_slice())
    }
}

impl Transport for MemoryTransport {
    type Cursor = MemoryCursor;

    async fn open(&self, query: &QueryDescriptor) -> Result<MemoryCursor> {
        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        let rows = self.execute(query)?;
        Ok(MemoryCursor {
            rows,
            position: 0,
            stats: self.stats.clone(),
            fail_fetch_at: self.fail_fetch_at,
            fail_close: self.fail_close,
            closed: false,
        })
    }
}

pub struct MemoryCursor {
    rows: Vec<RawRow>,
    position: usize,
    stats: Arc<Stats>,
    fail_fetch_at: Option<usize>,
    fail_close: bool,
    closed: bool,
}

impl TransportCursor for MemoryCursor {
    async fn fetch(&mut self, size: usize) -> Result<Vec<RawRow>> {
        let call = self.stats.fetches.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_fetch_at == Some(call) {
            return Err(anyhow!("Simulated transport failure").into());
        }
        let end = cmp::min(self.position + size, self.rows.len());
        let page = self.rows[self.position..end].to_vec();
        self.position = end;
        Ok(page)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::Relaxed);
        }
        if self.fail_close {
            return Err(anyhow!("Simulated close failure").into());
        }
        Ok(())
    }
}

pub fn truthy(value: &Value) -> bool {
    matches!(value, Value::Boolean(Some(true)))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int16(v) => v.map(Into::into),
        Value::Int32(v) => v.map(Into::into),
        Value::Int64(v) => *v,
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float64(v) => *v,
        _ => as_i64(value).map(|v| v as f64),
    }
}

pub fn cmp_values(lhs: &Value, rhs: &Value) -> CmpOrdering {
    if let (Some(l), Some(r)) = (as_i64(lhs), as_i64(rhs)) {
        return l.cmp(&r);
    }
    if let (Some(l), Some(r)) = (as_f64(lhs), as_f64(rhs)) {
        return l.partial_cmp(&r).unwrap_or(CmpOrdering::Equal);
    }
    match (lhs, rhs) {
        (Value::Varchar(Some(l)), Value::Varchar(Some(r))) => l.cmp(r),
        (Value::Boolean(Some(l)), Value::Boolean(Some(r))) => l.cmp(r),
        (Value::Timestamp(Some(l)), Value::Timestamp(Some(r))) => l.cmp(r),
        (Value::Date(Some(l)), Value::Date(Some(r))) => l.cmp(r),
        _ => CmpOrdering::Equal,
    }
}

/// Minimal evaluator for descriptor expressions, playing the role of the
/// real backend's query compiler.
pub fn eval(expression: &Expr, columns: &[String], row: &[Value]) -> Value {
    match expression {
        Expr::Column(name) => columns
            .iter()
            .position(|v| v == name)
            .map(|i| row[i].clone())
            .unwrap_or(Value::Null),
        Expr::Literal(value) => value.clone(),
        Expr::BinaryOp { op, lhs, rhs } => {
            let lhs = eval(lhs, columns, row);
            let rhs = eval(rhs, columns, row);
            use BinaryOpType::*;
            match op {
                Multiplication | Division | Addition | Subtraction => arith(*op, &lhs, &rhs),
                Equal => Value::Boolean(Some(lhs == rhs)),
                NotEqual => Value::Boolean(Some(lhs != rhs)),
                Less => Value::Boolean(Some(cmp_values(&lhs, &rhs) == CmpOrdering::Less)),
                Greater => Value::Boolean(Some(cmp_values(&lhs, &rhs) == CmpOrdering::Greater)),
                LessEqual => Value::Boolean(Some(cmp_values(&lhs, &rhs) != CmpOrdering::Greater)),
                GreaterEqual => Value::Boolean(Some(cmp_values(&lhs, &rhs) != CmpOrdering::Less)),
                And => Value::Boolean(Some(truthy(&lhs) && truthy(&rhs))),
                Or => Value::Boolean(Some(truthy(&lhs) || truthy(&rhs))),
            }
        }
    }
}

fn arith(op: BinaryOpType, lhs: &Value, rhs: &Value) -> Value {
    use BinaryOpType::*;
    if let (Some(l), Some(r)) = (as_i64(lhs), as_i64(rhs)) {
        return Value::Int64(match op {
            Multiplication => Some(l * r),
            Division => (r != 0).then(|| l / r),
            Addition => Some(l + r),
            Subtraction => Some(l - r),
            _ => None,
        });
    }
    if let (Some(l), Some(r)) = (as_f64(lhs), as_f64(rhs)) {
        return Value::Float64(match op {
            Multiplication => Some(l * r),
            Division => Some(l / r),
            Addition => Some(l + r),
            Subtraction => Some(l - r),
            _ => None,
        });
    }
    Value::Null
}
