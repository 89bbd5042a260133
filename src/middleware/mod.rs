//! Ready-made chain handlers.
//!
//! Both are plain handlers returning an [`AfterHandler`](crate::AfterHandler),
//! so they are added with [`Glue::add`](crate::Glue::add) and their position in
//! the chain decides what they observe:
//!
//! ```rust
//! use glue::{Glue, middleware};
//!
//! let glue = Glue::new()
//!     .add(middleware::access_log) // unwinds last: logs the final status
//!     .add(middleware::recover);   // unwinds first: turns failures into 500s
//! ```

mod access_log;
mod recover;

pub use access_log::access_log;
pub use recover::recover;
