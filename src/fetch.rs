use crate::{QueryDescriptor, RawRow, Result, Transport, cursor::CursorAdapter};
use std::vec;

/// Rows pulled from the data source per round trip unless the caller
/// overrides it for the iteration.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Produces a lazy, finite, forward-only sequence of raw rows by pulling
/// fixed-size pages through a [`CursorAdapter`]. At any moment at most one
/// page is buffered, so memory stays bounded by the chunk size no matter
/// how large the result is. A fetched page that is empty or shorter than
/// requested marks exhaustion; no further fetch is issued after that.
pub(crate) struct ChunkedFetch<'a, C: Transport> {
    adapter: CursorAdapter<'a, C>,
    chunk_size: usize,
    page: vec::IntoIter<RawRow>,
    pages_fetched: usize,
    exhausted: bool,
}

impl<'a, C: Transport> ChunkedFetch<'a, C> {
    /// `chunk_size` has been validated positive by the facade.
    pub fn new(transport: &'a C, query: &'a QueryDescriptor, chunk_size: usize) -> Self {
        Self {
            adapter: CursorAdapter::new(transport, query),
            chunk_size,
            page: Vec::new().into_iter(),
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Next row in fetch order, or `None` once the result is exhausted.
    /// Exhaustion is terminal: later calls keep returning `None` without
    /// touching the transport.
    pub async fn next_row(&mut self) -> Result<Option<RawRow>> {
        loop {
            if let Some(row) = self.page.next() {
                return Ok(Some(row));
            }
            if self.exhausted {
                self.adapter.close();
                return Ok(None);
            }
            let rows = self.adapter.fetch_page(self.chunk_size).await?;
            self.pages_fetched += 1;
            if rows.len() < self.chunk_size {
                self.exhausted = true;
            }
            self.page = rows.into_iter();
        }
    }

    /// How many pages have been pulled so far. The facade uses the page
    /// turn-over to scope the identity cache.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn close(&mut self) {
        self.adapter.close();
    }
}
