// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::mem::ManuallyDrop;
use std::ptr;
use log::{error, trace, warn};
use crate::{ArenaError, BufferPool, Error, NativeBuffer, PoolOptions, StreamArena, StreamToken};
use crate::error::{Result, ResultContext};
use crate::error::OperationKind::*;
use crate::pool::FreeList;

#[derive(Debug)]
pub(crate) struct StreamState {
	id: u64,
	token: StreamToken,
	reused: bool,
}

impl StreamState {
	fn new(id: u64) -> Self {
		Self {
			id,
			token: StreamToken::NULL,
			reused: true,
		}
	}
}

/// A pool of [`ByteStream`] wrappers, along with the [`BufferPool`] for the
/// buffers moving in and out of the streams. Clones share the same free lists and
/// arena.
#[derive(Clone, Debug)]
pub struct StreamPool<A: StreamArena> {
	buffers: BufferPool<A>,
	streams: FreeList<StreamState>,
}

impl<A: StreamArena> StreamPool<A> {
	/// Creates a pool over `arena` with default options.
	pub fn new(arena: A) -> Self {
		Self::with_options(arena, PoolOptions::default())
	}

	/// Creates a pool over `arena`. The options apply to both the stream and buffer
	/// free lists.
	pub fn with_options(arena: A, options: PoolOptions) -> Self {
		Self {
			buffers: BufferPool::with_options(arena, options),
			streams: FreeList::new(options),
		}
	}

	/// Returns the arena.
	pub fn arena(&self) -> &A { self.buffers.arena() }

	/// Returns the pool handing out buffers taken from streams.
	pub fn buffers(&self) -> &BufferPool<A> { &self.buffers }

	/// Returns the number of stream wrappers waiting in the free list.
	pub fn len(&self) -> usize { self.streams.len() }

	/// Returns `true` if the stream free list is empty.
	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// Clears the stream and buffer free lists.
	pub fn shed(&self) -> Result {
		self.streams.shed().context(Shed)?;
		self.buffers.shed()
	}

	/// Asks the arena for a new, empty stream.
	pub fn create(&self) -> Result<ByteStream<A>> {
		let token = self.arena().create_stream().context(StreamCreate)?;
		Ok(self.bind(token))
	}

	/// Binds a wrapper to an existing stream. The null token yields `None`.
	pub fn acquire(&self, token: StreamToken) -> Result<Option<ByteStream<A>>> {
		let Some(token) = token.non_null() else {
			return Ok(None)
		};

		self.arena().has_data(token).context(StreamQuery)?;
		Ok(Some(self.bind(token)))
	}

	fn bind(&self, token: StreamToken) -> ByteStream<A> {
		let mut state = self.streams.claim_or(StreamState::new);
		state.token = token;
		state.reused = false;
		trace!("bound stream {} to {token}", state.id);
		ByteStream {
			state: ManuallyDrop::new(state),
			pool: self.clone(),
		}
	}

	fn release(&self, mut state: Box<StreamState>) -> Result {
		if state.reused {
			return Ok(())
		}

		let result = self.arena()
						 .release_stream(state.token)
						 .context(StreamDispose);
		trace!("disposed stream {} from {}", state.id, state.token);
		state.token = StreamToken::NULL;
		state.reused = true;
		self.streams.recycle(state);
		result
	}
}

/// A FIFO queue of buffers owned by the arena, named by a [`StreamToken`].
///
/// Appended buffers move into the stream; their unread bytes become the stream's
/// contents. Bytes can be peeked with [`copy_head`](Self::copy_head), consumed
/// with [`discard`](Self::discard), or taken a whole buffer at a time with
/// [`take_head`](Self::take_head).
///
/// [`dispose`](Self::dispose) reclaims every queued buffer and releases the
/// token. Dropping an undisposed stream disposes it, logging a warning.
pub struct ByteStream<A: StreamArena> {
	state: ManuallyDrop<Box<StreamState>>,
	pool: StreamPool<A>,
}

impl<A: StreamArena> ByteStream<A> {
	/// Returns the wrapper's identity, which is kept across recycling.
	pub fn id(&self) -> u64 { self.state.id }

	/// Returns the stream token.
	pub fn token(&self) -> StreamToken { self.state.token }

	/// Returns the arena owning the stream.
	pub fn arena(&self) -> &A { self.pool.arena() }

	/// Moves `buffer` onto the tail of the stream. Its bytes from position to limit
	/// are queued.
	///
	/// A buffer from another arena is released through its own pool and rejected
	/// with [`ArenaError::ForeignRegion`].
	pub fn append(&mut self, buffer: NativeBuffer<A>) -> Result {
		if !self.arena().same_arena(buffer.arena()) {
			let address = buffer.address();
			if let Err(error) = buffer.release() {
				warn!("failed to release foreign buffer: {error}");
			}
			return Err(Error::arena(StreamAppend, ArenaError::ForeignRegion(address)))
		}

		let address = buffer.into_address().context(StreamAppend)?;
		let result = self.arena()
						 .append(self.token(), address)
						 .context(StreamAppend);
		if result.is_err() {
			if let Err(error) = self.arena().reclaim(address) {
				warn!("failed to reclaim region {address}: {error}");
			}
		}
		result
	}

	/// Copies queued bytes, starting at the head, into the remaining space of
	/// `dst`, crossing buffer boundaries until `dst` is full or the stream is
	/// exhausted. The bytes stay queued; `dst`'s position is advanced past them.
	/// A `dst` from another arena is rejected with [`ArenaError::ForeignRegion`].
	pub fn copy_head(&self, dst: &mut NativeBuffer<A>) -> Result {
		if !self.arena().same_arena(dst.arena()) {
			return Err(Error::arena(StreamCopy, ArenaError::ForeignRegion(dst.address())))
		}

		dst.sync().context(StreamCopy)?;
		self.arena()
			.copy_head(self.token(), dst.address())
			.context(StreamCopy)?;
		dst.refresh().context(StreamCopy)
	}

	/// Removes the head buffer and hands it to the caller without copying. Returns
	/// `None` if the stream is empty. If the head can't be bound to a buffer, its
	/// region is reclaimed.
	pub fn take_head(&mut self) -> Result<Option<NativeBuffer<A>>> {
		let address = self.arena()
						  .take_head(self.token())
						  .context(StreamTake)?;
		let result = self.pool
						 .buffers
						 .acquire(address)
						 .context(StreamTake);
		if result.is_err() {
			if let Err(error) = self.arena().reclaim(address) {
				warn!("failed to reclaim region {address}: {error}");
			}
		}
		result
	}

	/// Drops `count` bytes from the head, reclaiming buffers as they're emptied.
	pub fn discard(&mut self, count: usize) -> Result {
		self.arena()
			.discard(self.token(), count)
			.context(StreamDiscard)
	}

	/// Returns `true` if any queued buffer has unread bytes.
	pub fn has_data(&self) -> Result<bool> {
		self.arena()
			.has_data(self.token())
			.context(StreamQuery)
	}

	/// Returns the number of unread bytes in the head buffer.
	pub fn head_len(&self) -> Result<usize> {
		self.arena()
			.head_len(self.token())
			.context(StreamQuery)
	}

	/// Reclaims all queued buffers, releases the token, and returns the wrapper to
	/// its pool.
	pub fn dispose(self) -> Result {
		let (state, pool) = self.into_parts();
		pool.release(state)
	}

	/// Hands the stream to another owner, returning its token. The queued buffers
	/// are left in place; the wrapper returns to its pool.
	pub fn into_token(self) -> StreamToken {
		let (mut state, pool) = self.into_parts();
		let token = state.token;
		state.token = StreamToken::NULL;
		state.reused = true;
		pool.streams.recycle(state);
		token
	}

	fn into_parts(self) -> (Box<StreamState>, StreamPool<A>) {
		let mut this = ManuallyDrop::new(self);
		// Safety: `this` is never dropped, so each field is moved out exactly once.
		unsafe {
			(ManuallyDrop::take(&mut this.state), ptr::read(&this.pool))
		}
	}
}

impl<A: StreamArena> Drop for ByteStream<A> {
	fn drop(&mut self) {
		// Safety: the state isn't accessed again after this.
		let state = unsafe { ManuallyDrop::take(&mut self.state) };
		warn!("stream {} at {} dropped without disposal", state.id, state.token);
		if let Err(error) = self.pool.release(state) {
			error!("{error}");
		}
	}
}

impl<A: StreamArena> Debug for ByteStream<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ByteStream")
			.field("id", &self.id())
			.field("token", &self.token())
			.finish()
	}
}
