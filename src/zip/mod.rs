//! ZIP container codec: binary layout, extra fields, compression and
//! entry encryption.

pub mod codec;
pub mod crypto;
pub mod extra;
pub mod format;
pub mod reader;
pub mod writer;

pub use format::DirectoryRecord;
pub use reader::{read_central_directory, CentralDirectory};
pub use writer::ContainerWriter;
