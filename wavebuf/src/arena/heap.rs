// SPDX-License-Identifier: Apache-2.0

use std::cell::{RefCell, RefMut};
use std::cmp::min;
use std::collections::VecDeque;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::mem;
use std::ops::Range;
use std::rc::Rc;
use itertools::Itertools;
use log::trace;
use crate::{Address, StreamToken};
use super::{Arena, ArenaError, ArenaOptions, Bounds, Result, StreamArena};

/// An in-process [`Arena`] backed by heap storage. Region storage is recycled by
/// size class; see [`ArenaOptions`] for details.
///
/// Addresses carry a generation counter, so using an address after it has been
/// reclaimed fails with [`ArenaError::InvalidAddress`] rather than touching the
/// storage of whatever region reused its slot.
#[derive(Clone)]
pub struct HeapArena(Rc<RefCell<HeapState>>);

#[derive(Default)]
struct HeapState {
	options: ArenaOptions,
	regions: Slab<Region>,
	streams: Slab<VecDeque<Address>>,
	free: Vec<Vec<Box<[u8]>>>,
}

struct Region {
	bytes: Box<[u8]>,
	position: usize,
	limit: usize,
	class: Option<usize>,
}

impl Region {
	fn bounds(&self) -> Bounds {
		Bounds {
			position: self.position,
			limit: self.limit,
			capacity: self.bytes.len(),
		}
	}

	fn remaining(&self) -> usize {
		self.limit.saturating_sub(self.position)
	}

	fn range(&self, address: Address, offset: usize, len: usize) -> Result<Range<usize>> {
		match offset.checked_add(len) {
			Some(end) if end <= self.bytes.len() => Ok(offset..end),
			_ => Err(ArenaError::OutOfBounds { address, offset, len })
		}
	}
}

impl HeapArena {
	/// Creates a new arena.
	pub fn new(options: ArenaOptions) -> Self {
		Self(Rc::new(RefCell::new(HeapState {
			free: vec![Vec::new(); options.size_classes.len()],
			options,
			..HeapState::default()
		})))
	}

	/// Returns the options used to create the arena.
	pub fn options(&self) -> ArenaOptions {
		self.0.borrow().options
	}

	/// Returns the number of live regions.
	pub fn region_count(&self) -> usize {
		self.0.borrow().regions.len()
	}

	/// Returns the number of live streams.
	pub fn stream_count(&self) -> usize {
		self.0.borrow().streams.len()
	}

	/// Returns the number of reclaimed blocks held for reuse, per size class.
	pub fn free_blocks(&self) -> Vec<usize> {
		self.0.borrow().free.iter().map(Vec::len).collect_vec()
	}

	/// Frees all reclaimed blocks held for reuse.
	pub fn shed(&self) {
		for class in self.0.borrow_mut().free.iter_mut() {
			class.clear();
		}
	}

	fn state(&self) -> Result<RefMut<'_, HeapState>> {
		self.0.try_borrow_mut().map_err(|_| ArenaError::Borrow)
	}
}

impl Default for HeapArena {
	fn default() -> Self { Self::new(ArenaOptions::default()) }
}

impl Debug for HeapArena {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let Ok(state) = self.0.try_borrow() else {
			return f.write_str("HeapArena(<borrowed>)")
		};
		f.debug_struct("HeapArena")
			.field("options", &state.options)
			.field("regions", &state.regions.len())
			.field("streams", &state.streams.len())
			.finish_non_exhaustive()
	}
}

impl HeapState {
	fn region(&self, address: Address) -> Result<&Region> {
		self.regions
			.get(address.into_raw())
			.ok_or(ArenaError::InvalidAddress(address))
	}

	fn region_mut(&mut self, address: Address) -> Result<&mut Region> {
		self.regions
			.get_mut(address.into_raw())
			.ok_or(ArenaError::InvalidAddress(address))
	}

	fn stream(&self, token: StreamToken) -> Result<&VecDeque<Address>> {
		self.streams
			.get(token.into_raw())
			.ok_or(ArenaError::InvalidStream(token))
	}

	fn stream_mut(&mut self, token: StreamToken) -> Result<&mut VecDeque<Address>> {
		self.streams
			.get_mut(token.into_raw())
			.ok_or(ArenaError::InvalidStream(token))
	}

	fn copy_queued(
		&self,
		stream: StreamToken,
		target: &mut [u8],
		position: &mut usize,
		limit: usize
	) -> Result {
		for &address in self.stream(stream)? {
			if *position >= limit { break }

			let region = self.region(address)?;
			let count = min(region.remaining(), limit - *position);
			let start = region.position;
			target[*position..*position + count].copy_from_slice(&region.bytes[start..start + count]);
			*position += count;
		}
		Ok(())
	}

	fn allocate(&mut self, len: usize) -> Address {
		let class = self.options.class_of(len);
		let bytes = class.and_then(|i| self.free[i].pop())
						 .unwrap_or_else(|| {
							 let size = class.map_or(len, |i| self.options.size_classes[i]);
							 vec![0; size].into_boxed_slice()
						 });
		let address = Address::from_raw(
			self.regions.insert(Region { bytes, position: 0, limit: len, class })
		);
		trace!("allocated region {address} of {len} bytes");
		address
	}

	fn reclaim(&mut self, address: Address) -> Result {
		let Region { bytes, class, .. } = self.regions
			.remove(address.into_raw())
			.ok_or(ArenaError::InvalidAddress(address))?;
		if let Some(class) = class {
			let free = &mut self.free[class];
			if free.len() < self.options.retain_per_class {
				free.push(bytes);
			}
		}
		trace!("reclaimed region {address}");
		Ok(())
	}
}

impl Arena for HeapArena {
	fn same_arena(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	fn allocate(&self, len: usize) -> Result<Address> {
		Ok(self.state()?.allocate(len))
	}

	fn bounds(&self, address: Address) -> Result<Bounds> {
		Ok(self.state()?.region(address)?.bounds())
	}

	fn set_bounds(&self, address: Address, position: usize, limit: usize) -> Result {
		let mut state = self.state()?;
		let region = state.region_mut(address)?;
		if position > limit || limit > region.bytes.len() {
			return Err(ArenaError::InvalidBounds(address))
		}

		region.position = position;
		region.limit = limit;
		Ok(())
	}

	fn read(&self, address: Address, offset: usize, dst: &mut [u8]) -> Result {
		let state = self.state()?;
		let region = state.region(address)?;
		let range = region.range(address, offset, dst.len())?;
		dst.copy_from_slice(&region.bytes[range]);
		Ok(())
	}

	fn write(&self, address: Address, offset: usize, src: &[u8]) -> Result {
		let mut state = self.state()?;
		let region = state.region_mut(address)?;
		let range = region.range(address, offset, src.len())?;
		region.bytes[range].copy_from_slice(src);
		Ok(())
	}

	fn copy_within(&self, address: Address, src: usize, dst: usize, len: usize) -> Result {
		let mut state = self.state()?;
		let region = state.region_mut(address)?;
		let range = region.range(address, src, len)?;
		region.range(address, dst, len)?;
		region.bytes.copy_within(range, dst);
		Ok(())
	}

	fn reclaim(&self, address: Address) -> Result {
		self.state()?.reclaim(address)
	}
}

impl StreamArena for HeapArena {
	fn create_stream(&self) -> Result<StreamToken> {
		let token = StreamToken::from_raw(
			self.state()?.streams.insert(VecDeque::new())
		);
		trace!("created stream {token}");
		Ok(token)
	}

	fn append(&self, stream: StreamToken, address: Address) -> Result {
		let mut state = self.state()?;
		state.region(address)?;
		state.stream_mut(stream)?.push_back(address);
		Ok(())
	}

	fn has_data(&self, stream: StreamToken) -> Result<bool> {
		let state = self.state()?;
		for &address in state.stream(stream)? {
			if state.region(address)?.remaining() > 0 {
				return Ok(true)
			}
		}
		Ok(false)
	}

	fn head_len(&self, stream: StreamToken) -> Result<usize> {
		let state = self.state()?;
		match state.stream(stream)?.front() {
			Some(&address) => Ok(state.region(address)?.remaining()),
			None => Ok(0)
		}
	}

	fn copy_head(&self, stream: StreamToken, dst: Address) -> Result {
		let mut state = self.state()?;
		if state.stream(stream)?.contains(&dst) {
			return Err(ArenaError::InvalidAddress(dst))
		}

		// Move the destination storage out so source regions can be borrowed from
		// the same slab.
		let (mut target, mut position, limit) = {
			let region = state.region_mut(dst)?;
			(mem::take(&mut region.bytes), region.position, region.limit)
		};

		let result = state.copy_queued(stream, &mut target, &mut position, limit);

		let region = state.region_mut(dst)?;
		region.bytes = target;
		region.position = position;
		result
	}

	fn take_head(&self, stream: StreamToken) -> Result<Address> {
		Ok(self.state()?
			   .stream_mut(stream)?
			   .pop_front()
			   .unwrap_or(Address::NULL))
	}

	fn discard(&self, stream: StreamToken, mut count: usize) -> Result {
		let mut state = self.state()?;
		while count > 0 {
			let Some(&head) = state.stream(stream)?.front() else { break };
			let region = state.region_mut(head)?;
			let remaining = region.remaining();
			if count < remaining {
				region.position += count;
				break
			}

			state.stream_mut(stream)?.pop_front();
			state.reclaim(head)?;
			count -= remaining;
		}
		Ok(())
	}

	fn release_stream(&self, stream: StreamToken) -> Result {
		let mut state = self.state()?;
		let queue = state.streams
						 .remove(stream.into_raw())
						 .ok_or(ArenaError::InvalidStream(stream))?;
		let mut result = Ok(());
		for address in queue {
			if let Err(error) = state.reclaim(address) {
				result = result.and(Err(error));
			}
		}
		trace!("released stream {stream}");
		result
	}
}

/// A generational slab. Keys pack the slot generation into the upper 32 bits
/// and the slot index plus one into the lower 32 bits, so no key is zero.
struct Slab<T> {
	slots: Vec<Slot<T>>,
	vacant: Vec<usize>,
	len: usize,
}

struct Slot<T> {
	generation: u32,
	value: Option<T>,
}

impl<T> Default for Slab<T> {
	fn default() -> Self {
		Self {
			slots: Vec::new(),
			vacant: Vec::new(),
			len: 0,
		}
	}
}

impl<T> Slab<T> {
	fn len(&self) -> usize { self.len }

	fn insert(&mut self, value: T) -> u64 {
		let index = match self.vacant.pop() {
			Some(index) => {
				let slot = &mut self.slots[index];
				slot.generation = slot.generation.wrapping_add(1);
				slot.value = Some(value);
				index
			}
			None => {
				self.slots.push(Slot { generation: 0, value: Some(value) });
				self.slots.len() - 1
			}
		};
		self.len += 1;
		(self.slots[index].generation as u64) << 32 | (index as u64 + 1)
	}

	fn locate(&self, key: u64) -> Option<usize> {
		let index = (key & 0xFFFF_FFFF).checked_sub(1)? as usize;
		let slot = self.slots.get(index)?;
		(slot.generation == (key >> 32) as u32 && slot.value.is_some()).then_some(index)
	}

	fn get(&self, key: u64) -> Option<&T> {
		let index = self.locate(key)?;
		self.slots[index].value.as_ref()
	}

	fn get_mut(&mut self, key: u64) -> Option<&mut T> {
		let index = self.locate(key)?;
		self.slots[index].value.as_mut()
	}

	fn remove(&mut self, key: u64) -> Option<T> {
		let index = self.locate(key)?;
		let value = self.slots[index].value.take();
		self.vacant.push(index);
		self.len -= 1;
		value
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn allocate_rounds_to_class() {
		let arena = HeapArena::new(ArenaOptions::default());
		let address = arena.allocate(100).unwrap();
		assert_eq!(
			arena.bounds(address).unwrap(),
			Bounds { position: 0, limit: 100, capacity: 128 }
		);

		let large = arena.allocate(200000).unwrap();
		assert_eq!(arena.bounds(large).unwrap().capacity, 200000);
	}

	#[test]
	fn same_arena() {
		let arena = HeapArena::default();
		assert!(arena.same_arena(&arena.clone()));
		assert!(!arena.same_arena(&HeapArena::default()));
	}

	#[test]
	fn reclaimed_storage_is_reused() {
		let arena = HeapArena::new(ArenaOptions::default());
		let a = arena.allocate(1000).unwrap();
		arena.reclaim(a).unwrap();
		assert_eq!(arena.free_blocks()[2], 1);

		let b = arena.allocate(900).unwrap();
		assert_eq!(arena.free_blocks()[2], 0);
		assert_ne!(a, b, "a reused slot must get a new generation");
		assert_eq!(arena.bounds(a), Err(ArenaError::InvalidAddress(a)));
	}

	#[test]
	fn retention_limit() {
		let arena = HeapArena::new(ArenaOptions::default().with_retain_per_class(1));
		let a = arena.allocate(4).unwrap();
		let b = arena.allocate(4).unwrap();
		arena.reclaim(a).unwrap();
		arena.reclaim(b).unwrap();
		assert_eq!(arena.free_blocks()[0], 1);
		arena.shed();
		assert_eq!(arena.free_blocks()[0], 0);
	}

	#[test]
	fn out_of_bounds() {
		let arena = HeapArena::new(ArenaOptions::exact());
		let address = arena.allocate(4).unwrap();
		assert!(arena.write(address, 2, &[1, 2]).is_ok());
		assert_eq!(
			arena.write(address, 3, &[1, 2]),
			Err(ArenaError::OutOfBounds { address, offset: 3, len: 2 })
		);
		assert_eq!(arena.set_bounds(address, 3, 5), Err(ArenaError::InvalidBounds(address)));
	}

	#[test]
	fn null_address_is_invalid() {
		let arena = HeapArena::default();
		assert_eq!(arena.bounds(Address::NULL), Err(ArenaError::InvalidAddress(Address::NULL)));
	}

	#[test]
	fn copy_head_spans_regions() {
		let arena = HeapArena::default();
		let stream = arena.create_stream().unwrap();
		for chunk in [&[1u8, 2][..], &[3, 4, 5]] {
			let address = arena.allocate(chunk.len()).unwrap();
			arena.write(address, 0, chunk).unwrap();
			arena.append(stream, address).unwrap();
		}

		let dst = arena.allocate(4).unwrap();
		arena.copy_head(stream, dst).unwrap();
		let mut bytes = [0; 4];
		arena.read(dst, 0, &mut bytes).unwrap();
		assert_eq!(bytes, [1, 2, 3, 4]);
		assert_eq!(arena.bounds(dst).unwrap().position, 4);
		assert_eq!(arena.head_len(stream).unwrap(), 2, "copying must not consume");
	}

	#[test]
	fn release_stream_reclaims_regions() {
		let arena = HeapArena::default();
		let stream = arena.create_stream().unwrap();
		arena.append(stream, arena.allocate(8).unwrap()).unwrap();
		arena.append(stream, arena.allocate(8).unwrap()).unwrap();
		assert_eq!(arena.region_count(), 2);
		arena.release_stream(stream).unwrap();
		assert_eq!(arena.region_count(), 0);
		assert_eq!(arena.stream_count(), 0);
		assert_eq!(arena.has_data(stream), Err(ArenaError::InvalidStream(stream)));
	}
}
