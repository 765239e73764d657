mod cursor;
mod descriptor;
mod entity;
mod error;
mod expr;
mod fetch;
mod row;
mod session;
mod shaper;
mod stitch;
mod transport;
mod value;

pub use ::anyhow::Context;
pub use descriptor::*;
pub use entity::*;
pub use error::*;
pub use expr::*;
pub use fetch::DEFAULT_CHUNK_SIZE;
pub use row::*;
pub use session::*;
pub use shaper::*;
pub use stitch::IdentityCache;
pub use transport::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;
