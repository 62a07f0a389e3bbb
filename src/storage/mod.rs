pub mod checkpoint;
pub mod duckdb;
pub mod traits;

pub use checkpoint::{Cursor, CursorError, CursorPosition, CursorStore, FragmentNumber};
pub use traits::{Item, ItemKey, KvStore, StorageError};
