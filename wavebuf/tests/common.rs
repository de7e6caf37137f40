// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(dead_code, unused_macros)]

use std::cell::Cell;
use std::fmt::{Arguments, Debug};
use std::rc::Rc;
use wavebuf::{Address, Arena, ArenaError, Bounds, BufferPool, HeapArena, NativeBuffer, Sink, StreamArena, StreamToken};
use wavebuf::arena::Result;

macro_rules! qc_assert_eq {
	($left:expr,$right:expr) => {{
		let left = $left;
		let right = $right;
		if left == right {
			TestResult::passed()
		} else {
			TestResult::error(
				common::format_qc_assert_error(&left, &right, None)
			)
		}
	}};
	($left:expr,$right:expr,$($arg:tt)+) => {{
		let left = $left;
		let right = $right;
		if left == right {
			TestResult::passed()
		} else {
			TestResult::error(
				common::format_qc_assert_error(&left, &right, Some(format_args!($($arg)+)))
			)
		}
	}};
}

pub fn format_qc_assert_error<L: Debug, R: Debug>(left: &L, right: &R, msg: Option<Arguments>) -> String {
	if let Some(msg) = msg {
		format!(
			"assertion failed `(left == right)`: {msg}\n \
			left: `{left:?}`,\nright: `{right:?}`",
		)
	} else {
		format!(
			"assertion failed `(left == right)`:\n \
			left: `{left:?}`,\nright: `{right:?}`",
		)
	}
}

/// Creates a pool over a fresh heap arena.
pub fn pool() -> BufferPool<HeapArena> {
	BufferPool::new(HeapArena::default())
}

/// Allocates a buffer holding `bytes`, rewound to the start.
pub fn filled<A: Arena>(pool: &BufferPool<A>, bytes: &[u8]) -> NativeBuffer<A> {
	let mut buffer = pool.allocate(bytes.len()).unwrap();
	buffer.write_bytes(bytes);
	buffer.rewind();
	buffer
}

/// Returns the bytes written to `buffer` so far, from zero to its position.
pub fn written<A: Arena>(buffer: &NativeBuffer<A>) -> Vec<u8> {
	let mut bytes = buffer.to_vec().unwrap();
	bytes.truncate(buffer.position());
	bytes
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Fault {
	#[default]
	None,
	/// `bounds` fails.
	Bounds,
	/// `bounds` reports a limit past the capacity.
	Oversized,
}

/// A heap arena whose bounds queries can be made to misbehave.
#[derive(Clone, Default)]
pub struct FaultyArena {
	pub inner: HeapArena,
	fault: Rc<Cell<Fault>>,
}

impl FaultyArena {
	pub fn set_fault(&self, fault: Fault) { self.fault.set(fault) }
}

impl Arena for FaultyArena {
	fn same_arena(&self, other: &Self) -> bool { self.inner.same_arena(&other.inner) }

	fn allocate(&self, len: usize) -> Result<Address> { self.inner.allocate(len) }

	fn bounds(&self, address: Address) -> Result<Bounds> {
		let bounds = self.inner.bounds(address)?;
		match self.fault.get() {
			Fault::None => Ok(bounds),
			Fault::Bounds => Err(ArenaError::Borrow),
			Fault::Oversized => Ok(Bounds { limit: bounds.capacity + 1, ..bounds }),
		}
	}

	fn set_bounds(&self, address: Address, position: usize, limit: usize) -> Result {
		self.inner.set_bounds(address, position, limit)
	}

	fn read(&self, address: Address, offset: usize, dst: &mut [u8]) -> Result {
		self.inner.read(address, offset, dst)
	}

	fn write(&self, address: Address, offset: usize, src: &[u8]) -> Result {
		self.inner.write(address, offset, src)
	}

	fn copy_within(&self, address: Address, src: usize, dst: usize, len: usize) -> Result {
		self.inner.copy_within(address, src, dst, len)
	}

	fn reclaim(&self, address: Address) -> Result { self.inner.reclaim(address) }
}

impl StreamArena for FaultyArena {
	fn create_stream(&self) -> Result<StreamToken> { self.inner.create_stream() }

	fn append(&self, stream: StreamToken, address: Address) -> Result {
		self.inner.append(stream, address)
	}

	fn has_data(&self, stream: StreamToken) -> Result<bool> { self.inner.has_data(stream) }

	fn head_len(&self, stream: StreamToken) -> Result<usize> { self.inner.head_len(stream) }

	fn copy_head(&self, stream: StreamToken, dst: Address) -> Result {
		self.inner.copy_head(stream, dst)
	}

	fn take_head(&self, stream: StreamToken) -> Result<Address> { self.inner.take_head(stream) }

	fn discard(&self, stream: StreamToken, count: usize) -> Result {
		self.inner.discard(stream, count)
	}

	fn release_stream(&self, stream: StreamToken) -> Result { self.inner.release_stream(stream) }
}
