use crate::{
    EntityShaper, Error, FlatShaper, IdentityCache, MappingShaper, NamedRow, NamedShaper,
    QueryDescriptor, RawRow, RelatedEntityShaper, Result, RowShaper, TupleShaper, Value,
    entity::Entity,
    fetch::{ChunkedFetch, DEFAULT_CHUNK_SIZE},
    stream::Stream,
    transport::Transport,
};
use async_stream::try_stream;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// The iteration facade over one transport connection.
///
/// Each method binds a fresh chunked fetch driver to a fresh row shaper and
/// returns a single-consumer, forward-only stream of shaped elements.
/// Configuration problems and concurrent use are reported synchronously by
/// the method itself, before anything touches the data source; transport
/// failures come through the stream, after the cursor has been released.
///
/// A connection carries at most one in-flight query: starting a second
/// iteration while one stream is alive fails with [`Error::ConcurrentUse`]
/// until that stream is dropped or exhausted.
pub struct Session<C: Transport> {
    transport: C,
    active: Arc<AtomicBool>,
}

/// Releases the session's active flag when the iteration ends, no matter
/// how it ends.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C: Transport> Session<C> {
    pub fn new(transport: C) -> Self {
        Self {
            transport,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn transport(&self) -> &C {
        &self.transport
    }

    fn acquire(&self) -> Result<ActiveGuard> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ConcurrentUse);
        }
        Ok(ActiveGuard(self.active.clone()))
    }

    /// Iterate the query with an explicit shaper. The driver and the shaper
    /// live exactly as long as the returned stream; dropping it early still
    /// closes the cursor before control returns to the caller's scope.
    pub fn iterate<'a, S>(
        &'a self,
        query: &'a QueryDescriptor,
        mut shaper: S,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<S::Output>> + Send + 'a>
    where
        S: RowShaper + 'a,
    {
        let chunk_size = match chunk_size {
            None => DEFAULT_CHUNK_SIZE,
            Some(0) => {
                return Err(Error::config("Chunk size must be a positive integer"));
            }
            Some(v) => v,
        };
        let guard = self.acquire()?;
        Ok(try_stream! {
            let _guard = guard;
            let mut driver = ChunkedFetch::new(&self.transport, query, chunk_size);
            let mut cache = IdentityCache::new();
            let mut page = 0;
            loop {
                let row = match driver.next_row().await {
                    Ok(Some(row)) => row,
                    Ok(None) => break,
                    Err(e) => {
                        driver.close();
                        Err(e)?
                    }
                };
                // The cache deduplicates within one page only.
                if driver.pages_fetched() != page {
                    page = driver.pages_fetched();
                    cache.clear();
                }
                let shaped = match shaper.shape(row, &mut cache) {
                    Ok(v) => v,
                    Err(e) => {
                        driver.close();
                        Err(e)?
                    }
                };
                yield shaped;
            }
            driver.close();
        })
    }

    /// Iterate entity instances materialized from the projected columns.
    pub fn entities<'a, E: Entity>(
        &'a self,
        query: &'a QueryDescriptor,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<E>> + Send + 'a> {
        self.iterate(query, EntityShaper::<E>::new(query)?, chunk_size)
    }

    /// Iterate entity instances with their eagerly joined relations
    /// stitched in, without issuing further queries.
    pub fn entities_with_related<'a, E: Entity>(
        &'a self,
        query: &'a QueryDescriptor,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<Arc<E>>> + Send + 'a> {
        self.iterate(query, RelatedEntityShaper::<E>::new(query)?, chunk_size)
    }

    /// Iterate mappings from result column name to value.
    pub fn mappings<'a>(
        &'a self,
        query: &'a QueryDescriptor,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<BTreeMap<String, Value>>> + Send + 'a> {
        self.iterate(query, MappingShaper::new(query)?, chunk_size)
    }

    /// Iterate value tuples in projected column order.
    pub fn tuples<'a>(
        &'a self,
        query: &'a QueryDescriptor,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<RawRow>> + Send + 'a> {
        self.iterate(query, TupleShaper::new(query)?, chunk_size)
    }

    /// Iterate the single projected value of each row.
    pub fn flat_values<'a>(
        &'a self,
        query: &'a QueryDescriptor,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<Value>> + Send + 'a> {
        self.iterate(query, FlatShaper::new(query)?, chunk_size)
    }

    /// Iterate named rows, addressable by position and by column name.
    pub fn named_rows<'a>(
        &'a self,
        query: &'a QueryDescriptor,
        chunk_size: Option<usize>,
    ) -> Result<impl Stream<Item = Result<NamedRow>> + Send + 'a> {
        self.iterate(query, NamedShaper::new(query)?, chunk_size)
    }
}
