// SPDX-License-Identifier: Apache-2.0

//! Wrapper recycling. Buffer handles are cheap to rebind but not free to create,
//! so released wrappers are kept in a per-pool free list and bound to the next
//! acquired address. Only the wrappers are recycled here; region storage belongs
//! to the [arena](crate::Arena), which is asked to reclaim a region before its
//! wrapper is pooled.

mod options;

pub use options::*;

use std::cell::{BorrowMutError, Cell, RefCell};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::result;
use log::{trace, warn};
use crate::{Address, Arena, NativeBuffer};
use crate::arena::Bounds;
use crate::buffer::BufferState;
use crate::codec::{Encode, encoded_len};
use crate::error::{self, Error, ResultContext};
use crate::error::OperationKind::{Acquire, Allocate, Release, Shed};

#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("failed to borrow the wrapper pool")]
pub struct PoolError;

pub type Result<T = ()> = result::Result<T, PoolError>;

impl From<BorrowMutError> for PoolError {
	fn from(_: BorrowMutError) -> Self { Self }
}

/// A shared free list of boxed wrappers. Clones refer to the same list.
pub(crate) struct FreeList<W> {
	list: Rc<RefCell<Vec<Box<W>>>>,
	next_id: Rc<Cell<u64>>,
	options: PoolOptions,
}

impl<W> Clone for FreeList<W> {
	fn clone(&self) -> Self {
		Self {
			list: self.list.clone(),
			next_id: self.next_id.clone(),
			options: self.options,
		}
	}
}

impl<W> Debug for FreeList<W> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("FreeList")
			.field("len", &self.len())
			.field("options", &self.options)
			.finish()
	}
}

impl<W> FreeList<W> {
	pub fn new(options: PoolOptions) -> Self {
		Self {
			list: Rc::default(),
			next_id: Rc::new(Cell::new(1)),
			options,
		}
	}

	pub fn options(&self) -> PoolOptions { self.options }

	/// Returns the number of pooled wrappers, or zero if the list is borrowed.
	pub fn len(&self) -> usize {
		self.list.try_borrow().map_or(0, |list| list.len())
	}

	/// Claims a pooled wrapper, or creates one with `new` if the list is empty.
	/// Borrow failures fall back to creating a wrapper.
	pub fn claim_or(&self, new: impl FnOnce(u64) -> W) -> Box<W> {
		match self.claim() {
			Ok(Some(wrapper)) => wrapper,
			Ok(None) => Box::new(new(self.next_id())),
			Err(error) => {
				warn!("{error}; creating a new wrapper");
				Box::new(new(self.next_id()))
			}
		}
	}

	/// Returns a wrapper to the list. Wrappers past the retain limit, or returned
	/// while the list is borrowed, are dropped.
	pub fn recycle(&self, wrapper: Box<W>) {
		match self.collect(wrapper) {
			Ok(true) => { }
			Ok(false) => trace!("free list is full; dropping wrapper"),
			Err(error) => warn!("{error}; dropping wrapper")
		}
	}

	/// Drops all pooled wrappers.
	pub fn shed(&self) -> Result {
		self.list.try_borrow_mut()?.clear();
		Ok(())
	}

	fn claim(&self) -> Result<Option<Box<W>>> {
		Ok(self.list.try_borrow_mut()?.pop())
	}

	fn collect(&self, wrapper: Box<W>) -> Result<bool> {
		let mut list = self.list.try_borrow_mut()?;
		if list.len() < self.options.retain_limit {
			list.push(wrapper);
			Ok(true)
		} else {
			Ok(false)
		}
	}

	fn next_id(&self) -> u64 {
		let id = self.next_id.get();
		self.next_id.set(id + 1);
		id
	}
}

/// A pool of [`NativeBuffer`] wrappers over an arena. Clones share the same free
/// list and arena.
///
/// The pool is single-context: it can't be sent to or shared with another thread,
/// so every wrapper it holds is only ever bound on the thread that released it.
#[derive(Clone, Debug)]
pub struct BufferPool<A: Arena> {
	arena: A,
	wrappers: FreeList<BufferState>,
}

impl<A: Arena> BufferPool<A> {
	/// Creates a pool over `arena` with default options.
	pub fn new(arena: A) -> Self {
		Self::with_options(arena, PoolOptions::default())
	}

	/// Creates a pool over `arena`.
	pub fn with_options(arena: A, options: PoolOptions) -> Self {
		Self {
			arena,
			wrappers: FreeList::new(options),
		}
	}

	/// Returns the arena.
	pub fn arena(&self) -> &A { &self.arena }

	/// Returns the options used to create the pool.
	pub fn options(&self) -> PoolOptions { self.wrappers.options() }

	/// Returns the number of wrappers waiting in the free list.
	pub fn len(&self) -> usize { self.wrappers.len() }

	/// Returns `true` if the free list is empty.
	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// Clears the free list.
	pub fn shed(&self) -> error::Result { self.wrappers.shed().context(Shed) }

	/// Binds a wrapper to the region at `address`, reading its position and limit
	/// from the arena. The null address yields `None`.
	///
	/// A position past the limit is ignored, leaving the cursor at zero. A limit
	/// past the capacity is rejected.
	pub fn acquire(&self, address: Address) -> error::Result<Option<NativeBuffer<A>>> {
		let Some(address) = address.non_null() else {
			return Ok(None)
		};

		let bounds = self.arena
						 .bounds(address)
						 .and_then(|bounds| bounds.checked(address))
						 .context(Acquire)?;
		Ok(Some(self.bind(address, bounds)))
	}

	/// Allocates a region of `len` bytes and binds a wrapper to it. The buffer has
	/// a position of zero and a limit of `len`.
	pub fn allocate(&self, len: usize) -> error::Result<NativeBuffer<A>> {
		let address = self.arena.allocate(len).context(Allocate)?;
		match self.arena.bounds(address).and_then(|bounds| bounds.checked(address)) {
			Ok(bounds) => Ok(self.bind(address, bounds)),
			Err(error) => {
				if let Err(error) = self.arena.reclaim(address) {
					warn!("failed to reclaim region {address}: {error}");
				}
				Err(Error::arena(Allocate, error))
			}
		}
	}

	/// Encodes `value` into a new buffer of exactly its encoded size, found with a
	/// calculation pass. The buffer is returned rewound, ready to read or append.
	pub fn encode<T: Encode + ?Sized>(&self, value: &T) -> error::Result<NativeBuffer<A>> {
		let mut buffer = self.allocate(encoded_len(value))?;
		value.encode(&mut buffer);
		buffer.rewind();
		Ok(buffer)
	}

	fn bind(&self, address: Address, bounds: Bounds) -> NativeBuffer<A> {
		let Bounds { position, limit, capacity } = bounds;
		let mut state = self.wrappers.claim_or(BufferState::new);
		state.bind(address, position, limit, capacity);
		trace!("bound buffer {} to {address}", state.id);
		NativeBuffer::new(state, self.clone())
	}

	/// Reclaims the wrapper's region, then pools the wrapper.
	pub(crate) fn release(&self, state: Box<BufferState>) -> error::Result {
		if state.reused {
			return Ok(())
		}

		let result = self.arena.reclaim(state.address).context(Release);
		trace!("released buffer {} from {}", state.id, state.address);
		self.recycle(state);
		result
	}

	/// Pools the wrapper without touching its region.
	pub(crate) fn recycle(&self, mut state: Box<BufferState>) {
		state.unbind();
		self.wrappers.recycle(state);
	}
}
