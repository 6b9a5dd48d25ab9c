pub mod entities;
pub mod errors;

pub use entities::{DecodedTransaction, UnsignedTransaction};
pub use errors::{CodecError, Result};
