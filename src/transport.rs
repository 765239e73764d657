use crate::{QueryDescriptor, RawRow, Result};
use std::future::Future;

/// One physical connection to a data source, the outbound collaborator of
/// this crate. Implementations compile the descriptor to whatever their
/// backend executes; this core only ever passes the descriptor through,
/// read-only, and pulls pages off the returned cursor.
pub trait Transport: Send + Sync {
    type Cursor: TransportCursor;

    /// Execute the described query and return a streaming cursor over its
    /// result rows. Rows must come back in the descriptor's column order.
    fn open(&self, query: &QueryDescriptor) -> impl Future<Output = Result<Self::Cursor>> + Send;
}

/// A server-side streaming cursor over one query's result rows.
pub trait TransportCursor: Send {
    /// Pull up to `size` rows. Each call is exactly one round trip to the
    /// data source. Fewer rows than requested means the result is finished.
    fn fetch(&mut self, size: usize) -> impl Future<Output = Result<Vec<RawRow>>> + Send;

    /// Release the cursor. Must be safe to call more than once. Kept
    /// synchronous so release can happen from a destructor when the
    /// consumer abandons the iteration.
    fn close(&mut self) -> Result<()>;
}
