// SPDX-License-Identifier: Apache-2.0

//! The boundary with the memory arena owning buffer regions. The crate never
//! allocates region storage itself; it holds [addresses](Address) and asks the
//! arena to read, write, and reclaim through the [`Arena`] capability.

mod heap;
mod options;

pub use heap::*;
pub use options::*;

use std::result;
use crate::{Address, StreamToken};

#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ArenaError {
	#[error("invalid address {0}")]
	InvalidAddress(Address),
	#[error("invalid stream token {0}")]
	InvalidStream(StreamToken),
	#[error("access of {len} bytes at offset {offset} is out of bounds of region {address}")]
	OutOfBounds {
		address: Address,
		offset: usize,
		len: usize,
	},
	#[error("invalid bounds for region {0}")]
	InvalidBounds(Address),
	#[error("region {0} belongs to another arena")]
	ForeignRegion(Address),
	#[error("failed to borrow the arena")]
	Borrow,
}

pub type Result<T = ()> = result::Result<T, ArenaError>;

/// The cursor bookkeeping the arena keeps for a region.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Bounds {
	pub position: usize,
	pub limit: usize,
	pub capacity: usize,
}

impl Bounds {
	/// Returns the number of bytes between the position and limit.
	pub fn remaining(&self) -> usize {
		self.limit.saturating_sub(self.position)
	}

	/// Returns `true` if `position <= limit <= capacity`.
	pub fn is_valid(&self) -> bool {
		self.position <= self.limit && self.limit <= self.capacity
	}

	/// Rejects a limit past the capacity. A position past the limit is reset to
	/// zero.
	pub(crate) fn checked(self, address: Address) -> Result<Self> {
		let Self { position, limit, capacity } = self;
		if limit > capacity {
			return Err(ArenaError::InvalidBounds(address))
		}

		let position = if position <= limit { position } else { 0 };
		Ok(Self { position, limit, capacity })
	}
}

/// A shared handle to a memory arena. Handles are cheap to clone; every clone
/// refers to the same arena.
pub trait Arena: Clone {
	/// Returns `true` if `other` is a handle to the same arena.
	fn same_arena(&self, other: &Self) -> bool;

	/// Reserves a region of at least `len` bytes, returning its address. The new
	/// region has a position of zero and a limit of `len`.
	fn allocate(&self, len: usize) -> Result<Address>;

	/// Returns the current position, limit, and capacity of the region.
	fn bounds(&self, address: Address) -> Result<Bounds>;

	/// Stores new position and limit values for the region.
	fn set_bounds(&self, address: Address, position: usize, limit: usize) -> Result;

	/// Copies `dst.len()` bytes starting at `offset` in the region into `dst`.
	fn read(&self, address: Address, offset: usize, dst: &mut [u8]) -> Result;

	/// Copies `src` into the region starting at `offset`.
	fn write(&self, address: Address, offset: usize, src: &[u8]) -> Result;

	/// Moves `len` bytes starting at `src` to `dst` within the same region.
	fn copy_within(&self, address: Address, src: usize, dst: usize, len: usize) -> Result;

	/// Drops the caller's reference to the region, letting the arena recycle or
	/// free it. The address is invalid afterward.
	fn reclaim(&self, address: Address) -> Result;
}

/// An arena which also owns ordered queues of regions, named by
/// [stream tokens](StreamToken).
pub trait StreamArena: Arena {
	/// Creates an empty stream.
	fn create_stream(&self) -> Result<StreamToken>;

	/// Moves the region at `address` onto the tail of the stream. Its unread bytes,
	/// from position to limit, become part of the stream.
	fn append(&self, stream: StreamToken, address: Address) -> Result;

	/// Returns `true` if any queued region has unread bytes.
	fn has_data(&self, stream: StreamToken) -> Result<bool>;

	/// Returns the number of unread bytes in the head region.
	fn head_len(&self, stream: StreamToken) -> Result<usize>;

	/// Copies queued bytes, starting at the head, into the remaining space of the
	/// region at `dst`, advancing its position. Queued bytes are not consumed.
	fn copy_head(&self, stream: StreamToken, dst: Address) -> Result;

	/// Removes the head region, handing its address to the caller. Returns the
	/// null address if the stream is empty.
	fn take_head(&self, stream: StreamToken) -> Result<Address>;

	/// Drops `count` bytes from the head, reclaiming exhausted regions.
	fn discard(&self, stream: StreamToken, count: usize) -> Result;

	/// Reclaims all queued regions and invalidates the token.
	fn release_stream(&self, stream: StreamToken) -> Result;
}
