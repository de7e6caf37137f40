// SPDX-License-Identifier: Apache-2.0

use std::mem;
use bytemuck::Pod;
use num_traits::PrimInt;
use simdutf8::compat::from_utf8;
use crate::error::OperationKind::*;
use crate::error::{Error, OperationKind, Result, ResultContext};
use super::{Constructor, LONG_PREFIX_MARKER, padding_len, ReadMode};

/// A reader of encoded values.
///
/// Every read takes a [`ReadMode`]. In strict mode failures are returned; in
/// lenient mode they're logged and a zero or empty value is returned instead.
/// Either way, a failed length-prefixed read leaves the cursor at the start of
/// the field.
pub trait Source {
	/// Returns the number of bytes that can still be read.
	fn readable(&self) -> usize;

	/// Returns the read cursor, for later use with
	/// [`restore_read`](Self::restore_read).
	fn read_mark(&self) -> usize;

	/// Moves the read cursor back to `mark`.
	fn restore_read(&mut self, mark: usize);

	/// Reads exactly `dst.len()` bytes into `dst`, advancing the cursor.
	fn get_slice(&mut self, dst: &mut [u8]) -> Result;

	/// Advances the cursor by `count` bytes.
	fn skip_bytes(&mut self, count: usize) -> Result;

	/// Reads a single byte.
	fn read_byte(&mut self, mode: ReadMode) -> Result<u8> {
		let mut byte = [0];
		let result = self.get_slice(&mut byte).map(|_| byte[0]);
		mode.resolve(result.map_err(|e| e.with_operation(ReadByte)), || 0)
	}

	/// Reads a 32-bit integer.
	fn read_i32(&mut self, mode: ReadMode) -> Result<i32> {
		mode.resolve(read_int(self, ReadInt32), || 0)
	}

	/// Reads a 64-bit integer.
	fn read_i64(&mut self, mode: ReadMode) -> Result<i64> {
		mode.resolve(read_int(self, ReadInt64), || 0)
	}

	/// Reads a 32-bit float from its IEEE-754 bit pattern.
	fn read_f32(&mut self, mode: ReadMode) -> Result<f32> {
		mode.resolve(read_int(self, ReadFloat).map(f32::from_bits), || 0.0)
	}

	/// Reads a 64-bit float from its IEEE-754 bit pattern.
	fn read_f64(&mut self, mode: ReadMode) -> Result<f64> {
		mode.resolve(read_int(self, ReadDouble).map(f64::from_bits), || 0.0)
	}

	/// Reads a boolean [constructor](Constructor). Any value other than the two
	/// boolean constructors is an error in both modes; lenient mode logs it and
	/// returns `false`.
	fn read_bool(&mut self, mode: ReadMode) -> Result<bool> {
		let result = read_int(self, ReadBool).and_then(|value| {
			let constructor = Constructor(value);
			constructor.to_bool()
					   .ok_or_else(|| Error::invalid_bool(ReadBool, constructor))
		});
		mode.resolve(result, || false)
	}

	/// Reads raw bytes into `dst`, without a length prefix or padding. On lenient
	/// failure `dst` is left unchanged.
	fn read_bytes(&mut self, dst: &mut [u8], mode: ReadMode) -> Result {
		let result = if dst.len() > self.readable() {
			Err(Error::eos(ReadBytes))
		} else {
			self.get_slice(dst)
		};
		mode.resolve(result.map_err(|e| e.with_operation(ReadBytes)), || ())
	}

	/// Reads `count` raw bytes into a new vector.
	fn read_data(&mut self, count: usize, mode: ReadMode) -> Result<Vec<u8>> {
		let result = if count > self.readable() {
			Err(Error::eos(ReadBytes))
		} else {
			let mut data = vec![0; count];
			self.get_slice(&mut data).map(|_| data)
		};
		mode.resolve(result.map_err(|e| e.with_operation(ReadBytes)), Vec::new)
	}

	/// Reads a length-prefixed, padded byte array.
	fn read_byte_array(&mut self, mode: ReadMode) -> Result<Vec<u8>> {
		read_prefixed(self, ReadByteArray, mode, read_payload, Vec::new)
	}

	/// Reads a length-prefixed, padded UTF-8 string.
	fn read_string(&mut self, mode: ReadMode) -> Result<String> {
		read_prefixed(
			self,
			ReadString,
			mode,
			|source, len| {
				let bytes = read_payload(source, len)?;
				from_utf8(&bytes).map_err(|err| Error::utf8(ReadString, err))?;
				// Safety: validated above.
				Ok(unsafe { String::from_utf8_unchecked(bytes) })
			},
			String::new
		)
	}
}

fn read_int<S: Source + ?Sized, T: PrimInt + Pod>(source: &mut S, op: OperationKind) -> Result<T> {
	let size = mem::size_of::<T>();
	if size > source.readable() {
		return Err(Error::eos(op))
	}

	let mut value = <T as bytemuck::Zeroable>::zeroed();
	source.get_slice(bytemuck::bytes_of_mut(&mut value))
		  .map_err(|e| e.with_operation(op))?;
	Ok(T::from_le(value))
}

fn read_payload<S: Source + ?Sized>(source: &mut S, len: usize) -> Result<Vec<u8>> {
	let mut bytes = vec![0; len];
	source.get_slice(&mut bytes)?;
	Ok(bytes)
}

/// Reads a length prefix, returning the payload length and the prefix width.
pub(crate) fn read_length<S: Source + ?Sized>(source: &mut S, op: OperationKind) -> Result<(usize, usize)> {
	let mut first = [0];
	if source.readable() < 1 {
		return Err(Error::eos(op))
	}
	source.get_slice(&mut first).context(op)?;

	if first[0] >= LONG_PREFIX_MARKER {
		let mut len = [0; 4];
		if source.readable() < 3 {
			return Err(Error::eos(op))
		}
		source.get_slice(&mut len[..3]).context(op)?;
		Ok((u32::from_le_bytes(len) as usize, 4))
	} else {
		Ok((first[0] as usize, 1))
	}
}

/// Reads a length-prefixed field, passing the payload length to `read`. The
/// prefix is validated against the remaining bytes before any payload is read. On
/// failure the cursor is moved back to the start of the field.
pub(crate) fn read_prefixed<S: Source + ?Sized, T>(
	source: &mut S,
	op: OperationKind,
	mode: ReadMode,
	read: impl FnOnce(&mut S, usize) -> Result<T>,
	default: impl FnOnce() -> T
) -> Result<T> {
	let mark = source.read_mark();
	let result = read_prefixed_strict(source, op, read);
	if result.is_err() {
		source.restore_read(mark);
	}
	mode.resolve(result, default)
}

fn read_prefixed_strict<S: Source + ?Sized, T>(
	source: &mut S,
	op: OperationKind,
	read: impl FnOnce(&mut S, usize) -> Result<T>
) -> Result<T> {
	let (len, width) = read_length(source, op)?;
	let padding = padding_len(len, width);
	if len + padding > source.readable() {
		return Err(Error::truncated(op))
	}

	let value = read(source, len).map_err(|e| e.with_operation(op))?;
	source.skip_bytes(padding).map_err(|e| e.with_operation(op))?;
	Ok(value)
}
