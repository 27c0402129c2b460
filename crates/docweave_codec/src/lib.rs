//! # docweave Codec
//!
//! Document value model and canonical CBOR encoding for docweave.
//!
//! A stored document is a [`Document`]: a mapping from field name to
//! [`Value`]. Embedded content appears as nested maps and arrays of maps;
//! references to other documents appear as [`Value::Id`].
//!
//! Documents are persisted as canonical CBOR so that:
//! - Identical documents produce identical bytes
//! - Field insertion order never leaks into the stored form
//! - Stored bytes can be compared directly
//!
//! ## Canonical CBOR Rules
//!
//! - Map keys are text, sorted length-first then bytewise
//! - Integers use shortest encoding
//! - No floats, no indefinite-length items
//! - Document identifiers are tag 37 over a 16-byte string
//!
//! ## Usage
//!
//! ```
//! use docweave_codec::{from_cbor, to_canonical_cbor, Document};
//!
//! let doc = Document::new().with("title", "Order");
//! let bytes = to_canonical_cbor(&doc);
//! assert_eq!(from_cbor(&bytes).unwrap(), doc);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod id;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use id::DocumentId;
pub use value::{Document, Value, ID_FIELD};
