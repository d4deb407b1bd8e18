//! Oplog entries and on-demand payload decoding.
//!
//! A [`ChangeRecord`] carries its payloads as raw store-native bytes; they
//! are only decoded when a caller asks for them, into any destination that
//! implements [`DecodeTarget`].

mod change;
mod decode;

pub use change::ChangeRecord;
pub use decode::{DecodeTarget, Settable};
