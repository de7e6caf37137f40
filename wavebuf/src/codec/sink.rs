// SPDX-License-Identifier: Apache-2.0

use std::mem;
use bytemuck::Pod;
use num_traits::PrimInt;
use crate::{Arena, NativeBuffer};
use crate::error::OperationKind::*;
use crate::error::{OperationKind, Result};
use super::{Constructor, write_field, write_prefixed};

/// A writer of encoded values.
///
/// Writes never fail from the caller's perspective: a field that doesn't fit, or
/// whose bytes can't be stored, is logged and dropped as a whole, leaving the
/// sink exactly as it was before the write.
pub trait Sink {
	/// Returns the number of bytes that can still be written.
	fn writable(&self) -> usize;

	/// Returns the number of bytes written so far. In a buffer, this is the cursor
	/// position.
	fn written(&self) -> usize;

	/// Writes `bytes` at the cursor. Callers check [`writable`](Self::writable)
	/// beforehand.
	fn put_slice(&mut self, bytes: &[u8]) -> Result;

	/// Writes the first `len` bytes of `buffer`'s region at the cursor.
	fn put_buffer<B: Arena>(&mut self, buffer: &NativeBuffer<B>, len: usize) -> Result;

	/// Moves the cursor back to `mark`, a value previously returned by
	/// [`written`](Self::written).
	fn restore_write(&mut self, mark: usize);

	/// Writes a single byte.
	fn write_byte(&mut self, value: u8) {
		write_field(self, WriteByte, 1, |sink| sink.put_slice(&[value]))
	}

	/// Writes a 32-bit integer.
	fn write_i32(&mut self, value: i32) {
		write_int(self, WriteInt32, value)
	}

	/// Writes a 64-bit integer.
	fn write_i64(&mut self, value: i64) {
		write_int(self, WriteInt64, value)
	}

	/// Writes a 32-bit float as its IEEE-754 bit pattern.
	fn write_f32(&mut self, value: f32) {
		write_int(self, WriteFloat, value.to_bits())
	}

	/// Writes a 64-bit float as its IEEE-754 bit pattern.
	fn write_f64(&mut self, value: f64) {
		write_int(self, WriteDouble, value.to_bits())
	}

	/// Writes a boolean as its 4-byte [constructor](Constructor).
	fn write_bool(&mut self, value: bool) {
		write_int(self, WriteBool, Constructor::from(value).0)
	}

	/// Writes raw bytes, without a length prefix or padding.
	fn write_bytes(&mut self, bytes: &[u8]) {
		write_field(self, WriteBytes, bytes.len(), |sink| sink.put_slice(bytes))
	}

	/// Writes a length-prefixed, padded byte array.
	fn write_byte_array(&mut self, bytes: &[u8]) {
		write_prefixed(self, WriteByteArray, bytes.len(), |sink| sink.put_slice(bytes))
	}

	/// Writes a length-prefixed, padded UTF-8 string.
	fn write_string(&mut self, value: &str) {
		let bytes = value.as_bytes();
		write_prefixed(self, WriteString, bytes.len(), |sink| sink.put_slice(bytes))
	}

	/// Writes the contents of `buffer` from zero to its limit as a length-prefixed,
	/// padded byte array. The bytes are copied; `buffer` is left untouched.
	fn write_buffer<B: Arena>(&mut self, buffer: &NativeBuffer<B>) {
		let len = buffer.limit();
		write_prefixed(self, WriteBuffer, len, |sink| sink.put_buffer(buffer, len))
	}

	/// Writes the contents of `buffer` from zero to its limit, without a length
	/// prefix or padding.
	fn write_raw_buffer<B: Arena>(&mut self, buffer: &NativeBuffer<B>) {
		let len = buffer.limit();
		write_field(self, WriteBytes, len, |sink| sink.put_buffer(buffer, len))
	}
}

fn write_int<S: Sink + ?Sized, T: PrimInt + Pod>(sink: &mut S, op: OperationKind, value: T) {
	let value = value.to_le();
	write_field(sink, op, mem::size_of::<T>(), |sink| sink.put_slice(bytemuck::bytes_of(&value)))
}

/// A [`Sink`] which stores nothing, only counting the bytes written to it. Run a
/// sequence of writes through a calculator to find the exact capacity needed for
/// the same writes to a buffer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SizeCalculator {
	len: usize,
}

impl SizeCalculator {
	/// Creates a new calculator with a count of zero.
	pub const fn new() -> Self { Self { len: 0 } }

	/// Returns the number of bytes counted.
	pub const fn len(&self) -> usize { self.len }

	/// Returns `true` if no bytes have been counted.
	pub const fn is_empty(&self) -> bool { self.len == 0 }

	/// Resets the count to zero.
	pub fn rewind(&mut self) {
		self.len = 0;
	}

	/// Counts `count` skipped bytes.
	pub fn skip(&mut self, count: usize) {
		self.len = self.len.saturating_add(count);
	}
}

impl Sink for SizeCalculator {
	fn writable(&self) -> usize { usize::MAX - self.len }

	fn written(&self) -> usize { self.len }

	fn put_slice(&mut self, bytes: &[u8]) -> Result {
		self.len += bytes.len();
		Ok(())
	}

	fn put_buffer<B: Arena>(&mut self, _: &NativeBuffer<B>, len: usize) -> Result {
		self.len += len;
		Ok(())
	}

	fn restore_write(&mut self, mark: usize) {
		self.len = mark;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn counts_fields() {
		let mut calc = SizeCalculator::new();
		calc.write_byte(1);
		calc.write_i32(1);
		calc.write_i64(1);
		calc.write_f32(1.0);
		calc.write_f64(1.0);
		calc.write_bool(true);
		assert_eq!(calc.len(), 29);

		calc.rewind();
		calc.write_string("hello");
		assert_eq!(calc.len(), 8);
		calc.write_byte_array(&[0; 300]);
		assert_eq!(calc.len(), 8 + 304);
		calc.write_bytes(&[0; 3]);
		calc.skip(2);
		assert_eq!(calc.len(), 8 + 304 + 5);
	}

	#[test]
	fn oversized_array_is_not_counted() {
		let mut calc = SizeCalculator::new();
		calc.write_byte_array(&vec![0; 1 << 24]);
		assert!(calc.is_empty());
	}
}
