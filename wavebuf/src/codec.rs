// SPDX-License-Identifier: Apache-2.0

//! The TL-style binary encoding. Scalars are little-endian; booleans are 4-byte
//! [constructors](Constructor); byte arrays, strings, and nested buffers are
//! length-prefixed and zero-padded so every field ends on a 4-byte boundary:
//!
//! | length      | prefix                        | prefix width |
//! |-------------|-------------------------------|--------------|
//! | `0..=253`   | `len`                         | 1            |
//! | `254..2^24` | `254`, `len` as 3 LE bytes    | 4            |
//!
//! Payload bytes follow the prefix, then zeros until `(len + width) % 4 == 0`.
//!
//! Writing goes through the [`Sink`] trait, which has two implementations: the
//! [`SizeCalculator`], which only counts bytes, and
//! [`NativeBuffer`](crate::NativeBuffer), which writes them to arena memory. A
//! calculation pass over the same writes yields the exact capacity the real pass
//! needs. Reading goes through [`Source`].

mod sink;
mod source;

pub use sink::*;
pub use source::*;

use std::fmt;
use std::fmt::{Display, Formatter};
use arrayvec::ArrayVec;
use log::error;
use crate::error::{Error, OperationKind, Result, ResultContext};

/// The largest length a prefix can hold.
pub const MAX_PREFIXED_LEN: usize = (1 << 24) - 1;
/// The largest length held by a single-byte prefix.
pub const SHORT_PREFIX_MAX: usize = 253;
/// The first prefix byte marking a 3-byte length.
pub const LONG_PREFIX_MARKER: u8 = 254;

/// A 4-byte TL constructor value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Constructor(pub u32);

impl Constructor {
	/// The constructor encoding `true`.
	pub const BOOL_TRUE: Self = Self(0x997275b5);
	/// The constructor encoding `false`.
	pub const BOOL_FALSE: Self = Self(0xbc799737);

	/// Returns the boolean this constructor encodes, or `None` if it is neither
	/// boolean constructor.
	pub fn to_bool(self) -> Option<bool> {
		match self {
			Self::BOOL_TRUE => Some(true),
			Self::BOOL_FALSE => Some(false),
			_ => None
		}
	}
}

impl From<bool> for Constructor {
	fn from(value: bool) -> Self {
		if value { Self::BOOL_TRUE } else { Self::BOOL_FALSE }
	}
}

impl Display for Constructor {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{:#010x}", self.0)
	}
}

/// How read failures are reported.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ReadMode {
	/// Return the error.
	#[default]
	Strict,
	/// Log the error and return a zero or empty value.
	Lenient,
}

impl ReadMode {
	/// Returns `true` if the mode is [`Strict`](Self::Strict).
	pub fn is_strict(&self) -> bool {
		matches!(self, Self::Strict)
	}

	/// Returns `true` if the mode is [`Lenient`](Self::Lenient).
	pub fn is_lenient(&self) -> bool {
		matches!(self, Self::Lenient)
	}

	/// Passes `result` through in strict mode. In lenient mode, errors are logged
	/// and replaced with `default`.
	pub(crate) fn resolve<T>(self, result: Result<T>, default: impl FnOnce() -> T) -> Result<T> {
		match result {
			Err(error) if self.is_lenient() => {
				error!("{error}");
				Ok(default())
			}
			result => result
		}
	}
}

/// The length prefix and padding framing a byte array.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct LengthPrefix {
	header: ArrayVec<u8, 4>,
	len: usize,
}

impl LengthPrefix {
	const PADDING: [u8; 3] = [0; 3];

	/// Creates a prefix for a payload of `len` bytes, failing if `len` exceeds
	/// [`MAX_PREFIXED_LEN`].
	pub fn new(op: OperationKind, len: usize) -> Result<Self> {
		let mut header = ArrayVec::new();
		if len <= SHORT_PREFIX_MAX {
			header.push(len as u8);
		} else if len <= MAX_PREFIXED_LEN {
			header.push(LONG_PREFIX_MARKER);
			header.extend(len.to_le_bytes().into_iter().take(3));
		} else {
			return Err(Error::length_overflow(op))
		}
		Ok(Self { header, len })
	}

	/// The prefix bytes.
	pub fn header(&self) -> &[u8] { &self.header }

	/// The zero bytes following the payload.
	pub fn padding(&self) -> &'static [u8] {
		&Self::PADDING[..padding_len(self.len, self.header.len())]
	}

	/// The total encoded size: prefix, payload, and padding.
	pub fn field_len(&self) -> usize {
		self.header.len() + self.len + self.padding().len()
	}
}

/// Returns the number of zero bytes needed after a payload of `len` bytes with a
/// prefix `width` bytes wide.
pub(crate) const fn padding_len(len: usize, width: usize) -> usize {
	(4 - (len + width) % 4) % 4
}

/// Returns the exact number of bytes encoding `value` would write.
pub fn encoded_len<T: Encode + ?Sized>(value: &T) -> usize {
	let mut calc = SizeCalculator::new();
	value.encode(&mut calc);
	calc.len()
}

/// Writes a field of `len` bytes with `write`. If the sink lacks room or `write`
/// fails, the failure is logged and the sink is left as it was before the field.
pub(crate) fn write_field<S: Sink + ?Sized>(
	sink: &mut S,
	op: OperationKind,
	len: usize,
	write: impl FnOnce(&mut S) -> Result
) {
	let writable = sink.writable();
	if len > writable {
		error!("{}; {len} bytes needed, {writable} remaining", Error::eos(op));
		return
	}

	let mark = sink.written();
	if let Err(error) = write(sink).context(op) {
		sink.restore_write(mark);
		error!("{error}");
	}
}

/// Writes a length-prefixed field with a payload of `len` bytes.
pub(crate) fn write_prefixed<S: Sink + ?Sized>(
	sink: &mut S,
	op: OperationKind,
	len: usize,
	write_payload: impl FnOnce(&mut S) -> Result
) {
	let prefix = match LengthPrefix::new(op, len) {
		Ok(prefix) => prefix,
		Err(error) => {
			error!("{error}");
			return
		}
	};

	write_field(sink, op, prefix.field_len(), |sink| {
		sink.put_slice(prefix.header())?;
		write_payload(sink)?;
		sink.put_slice(prefix.padding())
	})
}

/// Defines encoding behavior.
pub trait Encode {
	/// Encodes into `sink`.
	fn encode(&self, sink: &mut (impl Sink + ?Sized));
}

/// Defines decoding behavior.
pub trait Decode: Sized {
	/// Decodes a value from `source`.
	fn decode(source: &mut (impl Source + ?Sized), mode: ReadMode) -> Result<Self>;
}

macro_rules! gen_codec {
	($($ty:ty: $write:ident $read:ident),+) => {
		$(
		impl Encode for $ty {
			#[inline]
			fn encode(&self, sink: &mut (impl Sink + ?Sized)) {
				sink.$write(*self)
			}
		}

		impl Decode for $ty {
			#[inline]
			fn decode(source: &mut (impl Source + ?Sized), mode: ReadMode) -> Result<Self> {
				source.$read(mode)
			}
		}
		)+
	};
}

gen_codec! {
	i32:  write_i32  read_i32,
	i64:  write_i64  read_i64,
	f32:  write_f32  read_f32,
	f64:  write_f64  read_f64,
	bool: write_bool read_bool
}

// Bytes

impl Encode for [u8] {
	fn encode(&self, sink: &mut (impl Sink + ?Sized)) {
		sink.write_byte_array(self)
	}
}

impl Encode for Vec<u8> {
	fn encode(&self, sink: &mut (impl Sink + ?Sized)) {
		sink.write_byte_array(self)
	}
}

impl Decode for Vec<u8> {
	fn decode(source: &mut (impl Source + ?Sized), mode: ReadMode) -> Result<Self> {
		source.read_byte_array(mode)
	}
}

// Utf8

impl Encode for str {
	fn encode(&self, sink: &mut (impl Sink + ?Sized)) {
		sink.write_string(self)
	}
}

impl Encode for String {
	fn encode(&self, sink: &mut (impl Sink + ?Sized)) {
		sink.write_string(self)
	}
}

impl Decode for String {
	fn decode(source: &mut (impl Source + ?Sized), mode: ReadMode) -> Result<Self> {
		source.read_string(mode)
	}
}

impl<T: Encode + ?Sized> Encode for &T {
	fn encode(&self, sink: &mut (impl Sink + ?Sized)) {
		T::encode(self, sink)
	}
}
