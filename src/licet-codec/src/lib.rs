//! # licet-codec
//!
//! Canonical serialization for license and keypair records.
//!
//! The canonical byte form is the input to both signing and verification, so
//! it must be deterministic: UTF-8 JSON with keys sorted at every level, no
//! insignificant whitespace, integers without a trailing `.0`, floats in
//! shortest round-trip form, binary fields as unpadded base64, and absent
//! optional fields omitted entirely (never `null`).
//!
//! Decoding is strict: duplicate keys, trailing bytes, non-UTF-8 input, and
//! unknown fields are all rejected. Decoding is lenient only about base64
//! padding and JSON whitespace, which means `encode(decode(b)) == b` exactly
//! when `b` was already canonical, and
//! `encode(decode(encode(x))) == encode(x)` unconditionally.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod canonical;
mod error;

pub mod b64;

pub use canonical::{decode, digest, digest_bytes, encode};
pub use error::CodecError;
