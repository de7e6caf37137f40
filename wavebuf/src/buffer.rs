// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::mem::ManuallyDrop;
use std::ptr;
use all_asserts::assert_le;
use log::{error, warn};
use crate::{Address, Arena, BufferPool};
use crate::arena;
use crate::codec::{read_prefixed, ReadMode, Sink, Source};
use crate::error::{Error, Result, ResultContext};
use crate::error::OperationKind::{Compact, ReadBuffer, ReadBytes, Sync, Unknown};

/// The recyclable part of a buffer handle.
#[derive(Debug)]
pub(crate) struct BufferState {
	pub id: u64,
	pub address: Address,
	pub position: usize,
	pub limit: usize,
	pub capacity: usize,
	/// `true` while the wrapper sits in a pool.
	pub reused: bool,
}

impl BufferState {
	pub fn new(id: u64) -> Self {
		Self {
			id,
			address: Address::NULL,
			position: 0,
			limit: 0,
			capacity: 0,
			reused: true,
		}
	}

	pub fn bind(&mut self, address: Address, position: usize, limit: usize, capacity: usize) {
		self.address = address;
		self.position = position;
		self.limit = limit;
		self.capacity = capacity;
		self.reused = false;
	}

	pub fn unbind(&mut self) {
		self.address = Address::NULL;
		self.position = 0;
		self.limit = 0;
		self.capacity = 0;
		self.reused = true;
	}
}

/// A handle to an arena region, with a little-endian read/write cursor.
///
/// The handle tracks its own position and limit, kept in the invariant
/// `position <= limit <= capacity`. The arena's copy of these bounds is updated
/// with [`sync`](Self::sync), which happens automatically when the region is
/// handed to a stream or another owner.
///
/// Writing goes through [`Sink`], reading through [`Source`]. Both are bounded by
/// the limit rather than the capacity.
///
/// # Release
///
/// [`release`](Self::release) reclaims the region and returns the wrapper to its
/// pool. Release consumes the handle, so it can't be used afterward. Dropping an
/// unreleased handle releases it, logging a warning.
pub struct NativeBuffer<A: Arena> {
	state: ManuallyDrop<Box<BufferState>>,
	pool: BufferPool<A>,
}

impl<A: Arena> NativeBuffer<A> {
	pub(crate) fn new(state: Box<BufferState>, pool: BufferPool<A>) -> Self {
		Self {
			state: ManuallyDrop::new(state),
			pool,
		}
	}

	/// Returns the wrapper's identity, which is kept across recycling.
	pub fn id(&self) -> u64 { self.state.id }

	/// Returns the region address.
	pub fn address(&self) -> Address { self.state.address }

	/// Returns the arena owning the region.
	pub fn arena(&self) -> &A { self.pool.arena() }

	/// Returns the pool the wrapper returns to on release.
	pub fn pool(&self) -> &BufferPool<A> { &self.pool }

	/// Returns the cursor position.
	pub fn position(&self) -> usize { self.state.position }

	/// Sets the cursor position.
	///
	/// # Panics
	///
	/// Panics if `position` is greater than the limit.
	pub fn set_position(&mut self, position: usize) {
		assert_le!(position, self.state.limit);
		self.state.position = position;
	}

	/// Returns the limit.
	pub fn limit(&self) -> usize { self.state.limit }

	/// Sets the limit. If the position is past the new limit, it's moved to the
	/// limit.
	///
	/// # Panics
	///
	/// Panics if `limit` is greater than the capacity.
	pub fn set_limit(&mut self, limit: usize) {
		assert_le!(limit, self.state.capacity);
		self.state.limit = limit;
		self.state.position = min(self.state.position, limit);
	}

	/// Returns the region capacity.
	pub fn capacity(&self) -> usize { self.state.capacity }

	/// Returns the number of bytes between the position and limit.
	pub fn remaining(&self) -> usize { self.state.limit - self.state.position }

	/// Returns `true` if the position is before the limit.
	pub fn has_remaining(&self) -> bool { self.remaining() > 0 }

	/// Moves the cursor to zero.
	pub fn rewind(&mut self) {
		self.state.position = 0;
	}

	/// Advances the cursor by `count` bytes.
	pub fn skip(&mut self, count: usize) -> Result {
		self.skip_bytes(count)
	}

	/// Moves the bytes between the position and limit to the start of the region,
	/// then sets the position after them and the limit to the capacity.
	pub fn compact(&mut self) -> Result {
		let remaining = self.remaining();
		self.arena()
			.copy_within(self.address(), self.position(), 0, remaining)
			.context(Compact)?;
		self.state.position = remaining;
		self.state.limit = self.state.capacity;
		Ok(())
	}

	/// Copies the bytes from zero to the limit into a new vector, without moving
	/// the cursor.
	pub fn to_vec(&self) -> Result<Vec<u8>> {
		let mut bytes = vec![0; self.limit()];
		self.arena()
			.read(self.address(), 0, &mut bytes)
			.context(ReadBytes)?;
		Ok(bytes)
	}

	/// Stores the position and limit in the arena.
	pub fn sync(&self) -> Result {
		self.arena()
			.set_bounds(self.address(), self.position(), self.limit())
			.context(Sync)
	}

	/// Reloads the position, limit, and capacity from the arena. A limit past the
	/// capacity is rejected, leaving the buffer unchanged.
	pub fn refresh(&mut self) -> Result {
		let address = self.address();
		let arena::Bounds { position, limit, capacity } =
			self.arena()
				.bounds(address)
				.and_then(|bounds| bounds.checked(address))
				.context(Sync)?;
		self.state.position = position;
		self.state.limit = limit;
		self.state.capacity = capacity;
		Ok(())
	}

	/// Reads a length-prefixed nested buffer, copying its payload into a new region
	/// allocated from `pool`. The new buffer has a position of zero and a limit of
	/// the payload length. Lenient failures yield `None`.
	pub fn read_buffer<B: Arena>(
		&mut self,
		pool: &BufferPool<B>,
		mode: ReadMode
	) -> Result<Option<NativeBuffer<B>>> {
		read_prefixed(
			self,
			ReadBuffer,
			mode,
			|source, len| {
				let buffer = pool.allocate(len)?;
				let copied = transfer(
					source.arena(),
					source.address(),
					source.position(),
					buffer.arena(),
					buffer.address(),
					0,
					len
				);

				if let Err(error) = copied {
					if let Err(error) = buffer.release() {
						error!("{error}");
					}
					return Err(Error::arena(ReadBuffer, error))
				}

				source.state.position += len;
				Ok(Some(buffer))
			},
			|| None
		)
	}

	/// Reclaims the region and returns the wrapper to its pool.
	pub fn release(self) -> Result {
		let (state, pool) = self.into_parts();
		pool.release(state)
	}

	/// Syncs the bounds, then hands the region to another owner, returning its
	/// address. The region is not reclaimed; the wrapper returns to its pool.
	pub fn into_address(self) -> Result<Address> {
		self.sync()?;
		let (state, pool) = self.into_parts();
		let address = state.address;
		pool.recycle(state);
		Ok(address)
	}

	fn into_parts(self) -> (Box<BufferState>, BufferPool<A>) {
		let mut this = ManuallyDrop::new(self);
		// Safety: `this` is never dropped, so each field is moved out exactly once.
		unsafe {
			(ManuallyDrop::take(&mut this.state), ptr::read(&this.pool))
		}
	}
}

impl<A: Arena> Drop for NativeBuffer<A> {
	fn drop(&mut self) {
		// Safety: the state isn't accessed again after this.
		let state = unsafe { ManuallyDrop::take(&mut self.state) };
		warn!("buffer {} at {} dropped without release", state.id, state.address);
		if let Err(error) = self.pool.release(state) {
			error!("{error}");
		}
	}
}

impl<A: Arena> Debug for NativeBuffer<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("NativeBuffer")
			.field("id", &self.id())
			.field("address", &self.address())
			.field("position", &self.position())
			.field("limit", &self.limit())
			.field("capacity", &self.capacity())
			.finish()
	}
}

impl<A: Arena> Sink for NativeBuffer<A> {
	fn writable(&self) -> usize { self.remaining() }

	fn written(&self) -> usize { self.position() }

	fn put_slice(&mut self, bytes: &[u8]) -> Result {
		self.arena()
			.write(self.address(), self.position(), bytes)
			.context(Unknown)?;
		self.state.position += bytes.len();
		Ok(())
	}

	fn put_buffer<B: Arena>(&mut self, buffer: &NativeBuffer<B>, len: usize) -> Result {
		transfer(
			buffer.arena(),
			buffer.address(),
			0,
			self.arena(),
			self.address(),
			self.position(),
			len
		).context(Unknown)?;
		self.state.position += len;
		Ok(())
	}

	fn restore_write(&mut self, mark: usize) {
		self.state.position = mark;
	}
}

impl<A: Arena> Source for NativeBuffer<A> {
	fn readable(&self) -> usize { self.remaining() }

	fn read_mark(&self) -> usize { self.position() }

	fn restore_read(&mut self, mark: usize) {
		self.state.position = mark;
	}

	fn get_slice(&mut self, dst: &mut [u8]) -> Result {
		if dst.len() > self.remaining() {
			return Err(Error::eos(Unknown))
		}

		self.arena()
			.read(self.address(), self.position(), dst)
			.context(Unknown)?;
		self.state.position += dst.len();
		Ok(())
	}

	fn skip_bytes(&mut self, count: usize) -> Result {
		if count > self.remaining() {
			return Err(Error::eos(Unknown))
		}

		self.state.position += count;
		Ok(())
	}
}

/// Copies `len` bytes between regions, possibly of different arenas, through a
/// stack buffer.
fn transfer(
	src_arena: &impl Arena,
	src: Address,
	src_offset: usize,
	dst_arena: &impl Arena,
	dst: Address,
	dst_offset: usize,
	len: usize
) -> arena::Result {
	const CHUNK: usize = 4096;
	let mut chunk = [0; CHUNK];
	let mut done = 0;
	while done < len {
		let count = min(CHUNK, len - done);
		let chunk = &mut chunk[..count];
		src_arena.read(src, src_offset + done, chunk)?;
		dst_arena.write(dst, dst_offset + done, chunk)?;
		done += count;
	}
	Ok(())
}
