use crate::{ColumnNames, Entity, Error, Expr, Order, Ordered, RelationShaper, Result};
use std::{ops::Range, sync::Arc};

/// A computed result column: the annotation's name becomes a result column
/// holding the expression's value for each row.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub expression: Expr,
}

/// One eagerly joined relation of a query: a contiguous column range of the
/// raw row holding the related entity's columns, plus what is needed to
/// shape and attach it. Slices are ordered outermost first; a nested path
/// always appears after its parent.
#[derive(Clone)]
pub struct RelationSlice {
    /// Relation path segments from the primary entity, e.g. `["simple"]` or
    /// `["simple", "account"]`.
    pub path: Box<[String]>,
    /// Table of the related entity, for the transport's join compiler.
    pub table: &'static str,
    /// Positions of this relation's columns within the raw row.
    pub range: Range<usize>,
    /// Column names within the slice, unprefixed.
    pub labels: ColumnNames,
    /// Position of the related entity's primary key within the slice.
    pub pk_index: usize,
    pub shape: RelationShaper,
}

impl RelationSlice {
    pub fn parent_path(&self) -> &[String] {
        &self.path[..self.path.len() - 1]
    }
    pub fn field(&self) -> &str {
        &self.path[self.path.len() - 1]
    }
}

impl std::fmt::Debug for RelationSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationSlice")
            .field("path", &self.path)
            .field("table", &self.table)
            .field("range", &self.range)
            .field("labels", &self.labels)
            .field("pk_index", &self.pk_index)
            .finish()
    }
}

/// Immutable description of what to fetch: target table, projection,
/// filter, ordering, annotations and the eager-relation plan. Produced by
/// the caller (normally a query compiler), consumed read-only by the
/// iteration engine. The result column order is fixed at [`build`]: the
/// projected columns, then the annotation names, then each relation slice
/// in plan order.
///
/// [`build`]: QueryBuilder::build
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    table: String,
    columns: ColumnNames,
    projected_len: usize,
    primary_width: usize,
    filter: Option<Expr>,
    ordering: Box<[Ordered]>,
    annotations: Box<[Annotation]>,
    relations: Box<[RelationSlice]>,
}

impl QueryDescriptor {
    /// Start describing a query over `table`.
    pub fn table(table: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            ordering: Vec::new(),
            annotations: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Start describing a query over the entity's table with all of its
    /// declared columns projected.
    pub fn for_entity<E: Entity>() -> QueryBuilder {
        Self::table(E::table()).columns(E::columns().iter().copied())
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }
    /// Every result column in row order, relation columns prefixed by path.
    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }
    /// Projected columns, without annotations or relation slices.
    pub fn projected(&self) -> &[String] {
        &self.columns[..self.projected_len]
    }
    /// The columns belonging to the primary entity: projection plus
    /// annotation names.
    pub fn primary_columns(&self) -> &[String] {
        &self.columns[..self.primary_width]
    }
    pub fn primary_width(&self) -> usize {
        self.primary_width
    }
    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }
    pub fn ordering(&self) -> &[Ordered] {
        &self.ordering
    }
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
    pub fn relations(&self) -> &[RelationSlice] {
        &self.relations
    }
}

struct PendingRelation {
    path: Vec<String>,
    table: &'static str,
    labels: Vec<String>,
    pk_column: &'static str,
    shape: RelationShaper,
}

/// Builder for [`QueryDescriptor`]. Validation that the spec places at
/// query-build time (duplicate result columns, malformed relation plans)
/// happens in [`build`](Self::build).
pub struct QueryBuilder {
    table: String,
    columns: Vec<String>,
    filter: Option<Expr>,
    ordering: Vec<Ordered>,
    annotations: Vec<Annotation>,
    relations: Vec<PendingRelation>,
}

impl QueryBuilder {
    /// Project the given columns, in order.
    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Restrict the result rows. Multiple filters are combined with AND.
    pub fn filter(mut self, expression: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(previous) => previous.and(expression),
            None => expression,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.ordering.push(Ordered {
            expression: Expr::Column(column.into()),
            order,
        });
        self
    }

    /// Add a computed result column named `name`.
    pub fn annotate(mut self, name: impl Into<String>, expression: Expr) -> Self {
        self.annotations.push(Annotation {
            name: name.into(),
            expression,
        });
        self
    }

    /// Eagerly load the relation at `path` (dot separated for nested
    /// relations) as a join in the same query. A nested path must be
    /// declared after its parent.
    pub fn select_related<E: Entity>(mut self, path: &str) -> Self {
        self.relations.push(PendingRelation {
            path: path.split('.').map(str::to_owned).collect(),
            table: E::table(),
            labels: E::columns().iter().map(|v| (*v).to_owned()).collect(),
            pk_column: E::primary_key_column(),
            shape: E::relation_shaper(),
        });
        self
    }

    pub fn build(self) -> Result<QueryDescriptor> {
        let projected_len = self.columns.len();
        let mut columns = self.columns;
        columns.extend(self.annotations.iter().map(|v| v.name.clone()));
        let primary_width = columns.len();
        let mut relations = Vec::with_capacity(self.relations.len());
        for pending in self.relations {
            if pending.path.iter().any(String::is_empty) {
                return Err(Error::config(format!(
                    "Malformed relation path `{}`",
                    pending.path.join("."),
                )));
            }
            if pending.path.len() > 1 {
                let parent = &pending.path[..pending.path.len() - 1];
                if !relations
                    .iter()
                    .any(|v: &RelationSlice| *v.path == *parent)
                {
                    return Err(Error::config(format!(
                        "Relation `{}` is declared before its parent `{}`",
                        pending.path.join("."),
                        parent.join("."),
                    )));
                }
            }
            let Some(pk_index) = pending.labels.iter().position(|v| v == pending.pk_column)
            else {
                return Err(Error::config(format!(
                    "Primary key column `{}` is not among the columns of `{}`",
                    pending.pk_column, pending.table,
                )));
            };
            let start = columns.len();
            let prefix = pending.path.join(".");
            columns.extend(pending.labels.iter().map(|v| format!("{prefix}.{v}")));
            relations.push(RelationSlice {
                path: pending.path.into_boxed_slice(),
                table: pending.table,
                range: start..columns.len(),
                labels: pending.labels.into(),
                pk_index,
                shape: pending.shape,
            });
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(Error::config(format!(
                    "Duplicate result column `{name}`",
                )));
            }
        }
        Ok(QueryDescriptor {
            table: self.table,
            columns: Arc::from(columns),
            projected_len,
            primary_width,
            filter: self.filter,
            ordering: self.ordering.into_boxed_slice(),
            annotations: self.annotations.into_boxed_slice(),
            relations: relations.into_boxed_slice(),
        })
    }
}
