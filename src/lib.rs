//! A decoder (and, via [`pack`], encoder) for WMO FM-94 BUFR meteorological
//! messages.
//!
//! [`factory`] drives a single bit-level reader section by section;
//! [`message`] sequences it end to end for one message. [`tables`] resolves
//! descriptors against Table B/D, [`parser`] (validated by [`lint`]) expands
//! a data description section into an AST, and [`deserializer`] walks that
//! AST against the bitstream to produce a [`model::Message`]. [`pack`] is the
//! write-side mirror of [`unpack`]; [`serialize`] drives it end to end over a
//! decoded [`model::Message`] to encode it back to bytes.

pub mod ast;
pub mod bitio;
pub mod deserializer;
mod error;
pub mod factory;
pub mod lint;
pub mod message;
pub mod model;
pub mod pack;
pub mod parser;
pub mod serialize;
pub mod tables;
pub mod unpack;

pub use error::Error;
pub use message::decode_message;
