//! Reading entry data and extracting it.

mod extract;
pub(crate) mod reader;

pub use reader::EntryReader;
