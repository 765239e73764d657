use crate::{Error, QueryDescriptor, RawRow, Result, Transport, TransportCursor};

/// Owns the transport cursor of one iteration: opens it lazily on the first
/// pull, forwards page fetches (one round trip each), and guarantees the
/// cursor is released exactly once on every exit path. The `Drop` impl
/// covers the path where the consumer abandons the stream mid-iteration.
pub(crate) struct CursorAdapter<'a, C: Transport> {
    transport: &'a C,
    query: &'a QueryDescriptor,
    cursor: Option<C::Cursor>,
    closed: bool,
}

impl<'a, C: Transport> CursorAdapter<'a, C> {
    pub fn new(transport: &'a C, query: &'a QueryDescriptor) -> Self {
        Self {
            transport,
            query,
            cursor: None,
            closed: false,
        }
    }

    /// Fetch the next page of up to `size` rows, opening the cursor on the
    /// first call. Any transport failure closes the cursor before the error
    /// is returned.
    pub async fn fetch_page(&mut self, size: usize) -> Result<Vec<RawRow>> {
        debug_assert!(size > 0, "page size must be positive");
        if self.closed {
            return Err(Error::config("Cursor used after it was closed"));
        }
        if self.cursor.is_none() {
            match self.transport.open(self.query).await {
                Ok(cursor) => self.cursor = Some(cursor),
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        let Some(cursor) = self.cursor.as_mut() else {
            unreachable!("The cursor is open by this point");
        };
        match cursor.fetch(size).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Idempotent. A failure to close while unwinding is logged and
    /// swallowed so the original error, if any, is the one that surfaces.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                log::warn!("Failed to close the cursor: {e:#}");
            }
        }
    }
}

impl<C: Transport> Drop for CursorAdapter<'_, C> {
    fn drop(&mut self) {
        self.close();
    }
}
