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

//! ## How it works
//!
//! Data is written to and read from fixed-capacity *regions* owned by a memory
//! *arena*, which lives outside the crate and is reached only through the
//! [`Arena`] capability. Regions are named by opaque [addresses](Address); the
//! zero address means "no buffer". [`HeapArena`] is an in-process arena for use
//! when no foreign allocator is involved.
//!
//! ### Buffers
//!
//! A [`NativeBuffer`] is a handle binding an address to a cursor: a position and a
//! limit, little-endian, bounded by the region capacity. Handles come from a
//! [`BufferPool`]. When a handle is released, its region is reclaimed by the arena
//! and the wrapper itself is returned to the pool's free list, to be bound to the
//! next acquired address. Release consumes the handle, so a released wrapper can't
//! be touched until the pool hands it out again. Dropping an unreleased handle
//! releases it.
//!
//! ### Encoding
//!
//! Values are encoded in a TL-style binary format; see the [`codec`] module for
//! the wire layout. Writes go through the [`Sink`] trait and never fail: a field
//! that doesn't fit is logged and dropped whole. A [`SizeCalculator`] runs the
//! same writes without storage to find the exact capacity to allocate. Reads go
//! through [`Source`] in either [strict or lenient](ReadMode) mode.
//!
//! ### Streams
//!
//! A [`ByteStream`] is an arena-owned FIFO of regions, named by a
//! [`StreamToken`]. Buffers appended to a stream move into it. The consumer copies
//! bytes from the head without consuming them, discards bytes across buffer
//! boundaries, or takes the head buffer whole.
//!
//! ### Contexts
//!
//! Pools, arenas, and handles are reference-counted without atomics and can't
//! cross threads. Each context creates its own pool.

mod address;
pub mod arena;
mod buffer;
pub mod codec;
mod error;
mod pool;
mod stream;

pub use address::*;
pub use arena::{Arena, ArenaError, ArenaOptions, Bounds, HeapArena, StreamArena};
pub use buffer::*;
pub use codec::{Constructor, Decode, Encode, encoded_len, ReadMode, SizeCalculator, Sink, Source};
pub use error::*;
pub use pool::{BufferPool, PoolError, PoolOptions};
pub use stream::*;
