use crate::{Error, Result, Value};
use std::{
    any::{self, Any},
    fmt,
    sync::{Arc, OnceLock},
};

/// Shapes one relation column slice into a related entity instance.
pub type RelationShaper = fn(&[String], &[Value]) -> Result<Arc<dyn EntityObject>>;

/// A persistent record type materialized from result rows.
///
/// Implementations describe their table, declared columns and primary key,
/// and decode themselves from a labeled row. Scalar fields are owned by the
/// instance; eagerly loaded relations are attached afterwards by the
/// relation stitcher through [`Related`] cells and never trigger queries.
pub trait Entity: Send + Sync + 'static {
    fn table() -> &'static str
    where
        Self: Sized;
    fn columns() -> &'static [&'static str]
    where
        Self: Sized;
    fn primary_key_column() -> &'static str
    where
        Self: Sized;

    /// Decode one instance from a labeled row slice. Columns beyond the
    /// declared ones are ignored; a missing declared column is an error.
    fn from_row(labels: &[String], values: &[Value]) -> Result<Self>
    where
        Self: Sized;

    /// The current primary key value of this instance.
    fn primary_key(&self) -> Value;

    /// Attach an eagerly loaded relation, or keep the already attached one.
    /// Returns the instance now referenced under `field`, so that nested
    /// relations stitch into the instance actually kept.
    ///
    /// The default is for entities without relation fields.
    fn attach_related(
        &self,
        field: &str,
        related: Option<Arc<dyn EntityObject>>,
    ) -> Result<Option<Arc<dyn EntityObject>>> {
        let _ = related;
        Err(Error::config(format!(
            "Entity `{}` has no relation field `{field}`",
            any::type_name::<Self>(),
        )))
    }

    fn relation_shaper() -> RelationShaper
    where
        Self: Sized,
    {
        shape_relation::<Self>
    }
}

fn shape_relation<E: Entity>(labels: &[String], values: &[Value]) -> Result<Arc<dyn EntityObject>> {
    Ok(Arc::new(E::from_row(labels, values)?))
}

/// Object-safe view of an [`Entity`], used by the relation stitcher and the
/// identity cache where the concrete type is only known per relation slice.
pub trait EntityObject: Any + Send + Sync {
    fn primary_key_value(&self) -> Value;
    fn attach(
        &self,
        field: &str,
        related: Option<Arc<dyn EntityObject>>,
    ) -> Result<Option<Arc<dyn EntityObject>>>;
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Entity> EntityObject for E {
    fn primary_key_value(&self) -> Value {
        self.primary_key()
    }
    fn attach(
        &self,
        field: &str,
        related: Option<Arc<dyn EntityObject>>,
    ) -> Result<Option<Arc<dyn EntityObject>>> {
        self.attach_related(field, related)
    }
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Downcast a stitched relation instance to its concrete entity type.
pub fn downcast_related<T: Entity>(
    value: Option<Arc<dyn EntityObject>>,
) -> Result<Option<Arc<T>>> {
    value
        .map(|v| {
            v.as_any().downcast::<T>().map_err(|_| {
                Error::config(format!(
                    "Related instance is not a `{}`",
                    any::type_name::<T>(),
                ))
            })
        })
        .transpose()
}

/// A set-once cell holding a non-owning reference to a related entity.
///
/// The cell distinguishes "not loaded" from "loaded with no match" (an outer
/// join that found nothing). Attaching is first-write-wins, which is what
/// lets the identity cache merge duplicate primary rows: relations already
/// populated on the cached instance are kept, missing ones are filled in.
pub struct Related<T>(OnceLock<Option<Arc<T>>>);

impl<T> Related<T> {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }
    /// The related instance, if loaded and matched.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.0.get().and_then(|v| v.as_ref())
    }
    /// Whether the relation has been populated, even with no match.
    pub fn is_loaded(&self) -> bool {
        self.0.get().is_some()
    }
    /// Store `value` unless already populated; returns the kept reference.
    pub fn attach(&self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        self.0.get_or_init(|| value).clone()
    }
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Related<T> {
    fn clone(&self) -> Self {
        let cell = OnceLock::new();
        if let Some(v) = self.0.get() {
            let _ = cell.set(v.clone());
        }
        Self(cell)
    }
}

impl<T> fmt::Debug for Related<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(Some(..)) => f.write_str("Related(loaded)"),
            Some(None) => f.write_str("Related(none)"),
            None => f.write_str("Related(unset)"),
        }
    }
}

impl<T: PartialEq> PartialEq for Related<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0.get(), other.0.get()) {
            (Some(l), Some(r)) => match (l, r) {
                (Some(l), Some(r)) => l == r,
                (None, None) => true,
                _ => false,
            },
            (None, None) => true,
            _ => false,
        }
    }
}
