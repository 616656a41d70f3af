pub mod bookmark;
pub mod bucket;
pub mod error;
pub mod fileset;
pub mod reader;
pub mod writer;

pub use bookmark::{Bookmark, FileSetPosition};
pub use bucket::TimeBucket;
pub use error::BufferError;
pub use fileset::{BufferFile, FileSet};
pub use reader::{BatchRead, Payload, PayloadItem, PayloadReader, ReaderConfig};
pub use writer::BufferWriter;
