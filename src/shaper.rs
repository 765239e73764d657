use crate::{
    ColumnNames, Entity, Error, IdentityCache, NamedRow, QueryDescriptor, RawRow, RelationSlice,
    Result, Value, stitch::stitch_row,
};
use std::{any, collections::BTreeMap, marker::PhantomData, sync::Arc};

/// Strategy converting one raw row into the caller-visible element type.
///
/// A shaper is selected and validated once per query, before the first row
/// is fetched; `shape` then runs once per row in fetch order. The identity
/// cache is only used by the relation-stitching variant, the others ignore
/// it.
pub trait RowShaper: Send {
    type Output: Send;
    fn shape(&mut self, row: RawRow, cache: &mut IdentityCache) -> Result<Self::Output>;
}

fn check_width(row: &RawRow, expected: usize) -> Result<()> {
    if row.len() < expected {
        return Err(Error::config(format!(
            "Result row has {} columns, the query descriptor expects at least {expected}",
            row.len(),
        )));
    }
    Ok(())
}

/// Verify every declared column of `E` is among the query's primary result
/// columns. Extra result columns are fine and ignored by decoding.
fn check_entity_columns<E: Entity>(query: &QueryDescriptor) -> Result<()> {
    let primary = query.primary_columns();
    for column in E::columns() {
        if !primary.iter().any(|v| v == column) {
            return Err(Error::config(format!(
                "Column `{column}` of entity `{}` is not projected by the query",
                any::type_name::<E>(),
            )));
        }
    }
    Ok(())
}

/// Materializes one entity instance per row from the primary column slice.
pub struct EntityShaper<E: Entity> {
    labels: ColumnNames,
    width: usize,
    marker: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityShaper<E> {
    pub fn new(query: &QueryDescriptor) -> Result<Self> {
        check_entity_columns::<E>(query)?;
        Ok(Self {
            labels: query.columns().clone(),
            width: query.primary_width(),
            marker: PhantomData,
        })
    }
}

impl<E: Entity> RowShaper for EntityShaper<E> {
    type Output = E;
    fn shape(&mut self, row: RawRow, _cache: &mut IdentityCache) -> Result<E> {
        check_width(&row, self.width)?;
        E::from_row(&self.labels[..self.width], &row[..self.width])
    }
}

/// Materializes the primary entity and stitches its eagerly joined
/// relations onto it, deduplicating primary instances within a page through
/// the identity cache. Elements are shared (`Arc`) because a duplicate
/// primary row yields the same instance again.
pub struct RelatedEntityShaper<E: Entity> {
    labels: ColumnNames,
    width: usize,
    total_width: usize,
    relations: Box<[RelationSlice]>,
    marker: PhantomData<fn() -> E>,
}

impl<E: Entity> RelatedEntityShaper<E> {
    pub fn new(query: &QueryDescriptor) -> Result<Self> {
        check_entity_columns::<E>(query)?;
        Ok(Self {
            labels: query.columns().clone(),
            width: query.primary_width(),
            total_width: query.columns().len(),
            relations: query.relations().into(),
            marker: PhantomData,
        })
    }
}

impl<E: Entity> RowShaper for RelatedEntityShaper<E> {
    type Output = Arc<E>;
    fn shape(&mut self, row: RawRow, cache: &mut IdentityCache) -> Result<Arc<E>> {
        check_width(&row, self.total_width)?;
        let entity = E::from_row(&self.labels[..self.width], &row[..self.width])?;
        let primary = cache.intern(entity)?;
        stitch_row(
            &(primary.clone() as Arc<dyn crate::EntityObject>),
            &self.relations,
            &row,
        )?;
        Ok(primary)
    }
}

/// Yields one mapping from result column name to value per row.
pub struct MappingShaper {
    labels: ColumnNames,
    width: usize,
}

impl MappingShaper {
    /// Duplicate result column names were already rejected when the
    /// descriptor was built, nothing to validate here.
    pub fn new(query: &QueryDescriptor) -> Result<Self> {
        Ok(Self {
            labels: query.columns().clone(),
            width: query.primary_width(),
        })
    }
}

impl RowShaper for MappingShaper {
    type Output = BTreeMap<String, Value>;
    fn shape(&mut self, row: RawRow, _cache: &mut IdentityCache) -> Result<Self::Output> {
        check_width(&row, self.width)?;
        Ok(self
            .labels
            .iter()
            .cloned()
            .zip(row.into_vec())
            .take(self.width)
            .collect())
    }
}

/// Yields the row's values as a fixed-arity tuple in projected order.
pub struct TupleShaper {
    width: usize,
}

impl TupleShaper {
    pub fn new(query: &QueryDescriptor) -> Result<Self> {
        Ok(Self {
            width: query.primary_width(),
        })
    }
}

impl RowShaper for TupleShaper {
    type Output = RawRow;
    fn shape(&mut self, row: RawRow, _cache: &mut IdentityCache) -> Result<RawRow> {
        check_width(&row, self.width)?;
        if row.len() == self.width {
            return Ok(row);
        }
        let mut values = row.into_vec();
        values.truncate(self.width);
        Ok(values.into_boxed_slice())
    }
}

/// Yields the single projected value per row. Only valid when the query has
/// exactly one result column.
pub struct FlatShaper {
    _private: (),
}

impl FlatShaper {
    pub fn new(query: &QueryDescriptor) -> Result<Self> {
        let width = query.primary_width();
        if width != 1 {
            return Err(Error::config(format!(
                "Flat iteration requires exactly one projected column, the query has {width}",
            )));
        }
        Ok(Self { _private: () })
    }
}

impl RowShaper for FlatShaper {
    type Output = Value;
    fn shape(&mut self, row: RawRow, _cache: &mut IdentityCache) -> Result<Value> {
        check_width(&row, 1)?;
        let Some(value) = row.into_vec().into_iter().next() else {
            unreachable!("The row has at least one value by this point");
        };
        Ok(value)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Yields one [`NamedRow`] per row: positional like a tuple, addressable by
/// column name like a mapping. Every result column name must therefore be a
/// valid identifier; rename offending columns through an annotation.
pub struct NamedShaper {
    labels: ColumnNames,
    width: usize,
}

impl NamedShaper {
    pub fn new(query: &QueryDescriptor) -> Result<Self> {
        let primary = query.primary_columns();
        for name in primary {
            if !is_identifier(name) {
                return Err(Error::config(format!(
                    "Column `{name}` is not a valid identifier, rename it with an annotation \
                     to use named iteration",
                )));
            }
        }
        Ok(Self {
            labels: primary.to_vec().into(),
            width: primary.len(),
        })
    }
}

impl RowShaper for NamedShaper {
    type Output = NamedRow;
    fn shape(&mut self, row: RawRow, _cache: &mut IdentityCache) -> Result<NamedRow> {
        check_width(&row, self.width)?;
        let values = if row.len() == self.width {
            row
        } else {
            let mut values = row.into_vec();
            values.truncate(self.width);
            values.into_boxed_slice()
        };
        Ok(NamedRow::new(self.labels.clone(), values))
    }
}
