use crate::{Entity, EntityObject, Error, RelationSlice, Result, Value};
use std::{
    any,
    collections::HashMap,
    hash::{Hash, Hasher},
    mem,
    sync::Arc,
};

/// Primary-key value usable as a hash map key. [`Value`] itself is only
/// `PartialEq` because of floats; here a float key compares and hashes by
/// its bit pattern, which is consistent and good enough for key columns.
#[derive(Debug, Clone)]
struct PkKey(Value);

impl PartialEq for PkKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Float64(l), Value::Float64(r)) => {
                l.map(f64::to_bits) == r.map(f64::to_bits)
            }
            (l, r) => l == r,
        }
    }
}
impl Eq for PkKey {}

impl Hash for PkKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Int16(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float64(v) => v.map(f64::to_bits).hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::Varchar(v) => v.hash(state),
            Value::Blob(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
            Value::Uuid(v) => v.hash(state),
        }
    }
}

/// Entity instances of the current page, indexed by primary key, so that
/// duplicate primary rows produced by to-many joins reuse one instance
/// instead of allocating copies.
///
/// The cache is created empty per iteration and cleared at every page
/// boundary, keeping memory bounded by the chunk size. The trade-off,
/// accepted and documented in DESIGN.md, is that duplicate primary rows
/// straddling a page boundary materialize as two distinct instances with
/// equal primary keys.
#[derive(Default)]
pub struct IdentityCache {
    entries: HashMap<PkKey, Arc<dyn EntityObject>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached instance for `entity`'s primary key, or insert
    /// `entity` as the instance to share. An entity with a null primary key
    /// is never cached.
    pub fn intern<E: Entity>(&mut self, entity: E) -> Result<Arc<E>> {
        let key = entity.primary_key();
        if key.is_null() {
            return Ok(Arc::new(entity));
        }
        if let Some(existing) = self.entries.get(&PkKey(key.clone())) {
            return existing.clone().as_any().downcast::<E>().map_err(|_| {
                Error::config(format!(
                    "Identity cache holds a different type for this key than `{}`",
                    any::type_name::<E>(),
                ))
            });
        }
        let instance = Arc::new(entity);
        self.entries
            .insert(PkKey(key), instance.clone() as Arc<dyn EntityObject>);
        Ok(instance)
    }
}

/// Attach the eagerly joined relations of one raw row onto `primary`.
///
/// Slices arrive ordered outermost first, so by the time a nested path is
/// processed its parent instance is already stitched; attaching through the
/// set-once [`Related`](crate::Related) cells makes re-stitching a cached
/// primary a merge of whatever was still unpopulated. A slice whose columns
/// are all null is an outer join with no match and attaches as `None`; its
/// own nested slices are skipped. No queries are issued here.
pub(crate) fn stitch_row(
    primary: &Arc<dyn EntityObject>,
    slices: &[RelationSlice],
    row: &[Value],
) -> Result<()> {
    // Instances stitched for this row, by path. Small per query, linear
    // scan beats a map.
    let mut attached: Vec<(&[String], Arc<dyn EntityObject>)> = Vec::with_capacity(slices.len());
    for slice in slices {
        let parent = if slice.path.len() == 1 {
            primary
        } else {
            match attached
                .iter()
                .find(|(path, _)| *path == slice.parent_path())
            {
                Some((_, instance)) => instance,
                // Parent had no match, nothing to attach onto.
                None => continue,
            }
        };
        let Some(values) = row.get(slice.range.clone()) else {
            return Err(Error::config(format!(
                "Row is too narrow for relation `{}`",
                slice.path.join("."),
            )));
        };
        let related = if values.iter().all(Value::is_null) {
            None
        } else {
            Some((slice.shape)(&slice.labels, values)?)
        };
        let kept = parent.attach(slice.field(), related)?;
        if let Some(kept) = kept {
            attached.push((&slice.path, kept));
        }
    }
    Ok(())
}
