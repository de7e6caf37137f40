// SPDX-License-Identifier: Apache-2.0

use pretty_assertions::assert_eq;
use wavebuf::{ArenaError, BufferPool, ByteStream, HeapArena, OperationKind, ReadMode, Source, StreamPool, StreamToken};

#[macro_use]
mod common;

use common::{Fault, FaultyArena};

fn stream_of(pool: &StreamPool<HeapArena>, chunks: &[&[u8]]) -> ByteStream<HeapArena> {
	let mut stream = pool.create().unwrap();
	for chunk in chunks {
		stream.append(common::filled(pool.buffers(), chunk)).unwrap();
	}
	stream
}

#[test]
fn take_head_is_fifo() {
	let pool = StreamPool::new(HeapArena::default());
	let mut stream = stream_of(&pool, &[&[1, 2], &[3, 4, 5], &[6]]);

	for expected in [&[1u8, 2][..], &[3, 4, 5], &[6]] {
		let buffer = stream.take_head().unwrap().unwrap();
		assert_eq!(buffer.position(), 0);
		assert_eq!(buffer.limit(), expected.len());
		assert_eq!(buffer.to_vec().unwrap(), expected);
		buffer.release().unwrap();
	}

	assert!(stream.take_head().unwrap().is_none());
	assert!(!stream.has_data().unwrap());
	stream.dispose().unwrap();
	assert_eq!(pool.arena().region_count(), 0);
}

#[test]
fn append_queues_unread_bytes() {
	let pool = StreamPool::new(HeapArena::default());
	let mut stream = pool.create().unwrap();
	assert!(!stream.has_data().unwrap());
	assert_eq!(stream.head_len().unwrap(), 0);

	let mut buffer = common::filled(pool.buffers(), &[1, 2, 3, 4]);
	assert_eq!(buffer.read_byte(ReadMode::Strict).unwrap(), 1);
	stream.append(buffer).unwrap();
	assert!(stream.has_data().unwrap());
	assert_eq!(stream.head_len().unwrap(), 3);

	let mut dst = pool.buffers().allocate(3).unwrap();
	stream.copy_head(&mut dst).unwrap();
	dst.rewind();
	assert_eq!(dst.read_data(3, ReadMode::Strict).unwrap(), [2, 3, 4]);
	dst.release().unwrap();
	stream.dispose().unwrap();
}

#[test]
fn discard_crosses_boundaries() {
	let pool = StreamPool::new(HeapArena::default());
	let mut stream = stream_of(&pool, &[&[1, 2], &[3, 4, 5], &[6]]);
	assert_eq!(pool.arena().region_count(), 3);

	stream.discard(3).unwrap();
	assert_eq!(pool.arena().region_count(), 2, "the emptied head is reclaimed");
	assert_eq!(stream.head_len().unwrap(), 2);

	let mut dst = pool.buffers().allocate(8).unwrap();
	stream.copy_head(&mut dst).unwrap();
	assert_eq!(dst.position(), 3);
	assert_eq!(common::written(&dst), [4, 5, 6]);
	assert_eq!(stream.head_len().unwrap(), 2, "copying does not consume");

	stream.discard(3).unwrap();
	assert!(!stream.has_data().unwrap());
	assert!(stream.take_head().unwrap().is_none());
	dst.release().unwrap();
	stream.dispose().unwrap();
}

#[test]
fn copy_head_fills_destination() {
	let pool = StreamPool::new(HeapArena::default());
	let stream = stream_of(&pool, &[&[1, 2], &[3, 4, 5]]);

	let mut dst = pool.buffers().allocate(4).unwrap();
	stream.copy_head(&mut dst).unwrap();
	assert_eq!(dst.position(), 4);
	assert!(!dst.has_remaining());
	assert_eq!(dst.to_vec().unwrap(), [1, 2, 3, 4]);
	dst.release().unwrap();
	stream.dispose().unwrap();
}

#[test]
fn null_token_is_absent() {
	let pool = StreamPool::new(HeapArena::default());
	assert!(pool.acquire(StreamToken::NULL).unwrap().is_none());
	assert_eq!(pool.arena().stream_count(), 0);
}

#[test]
fn acquire_existing_stream() {
	let pool = StreamPool::new(HeapArena::default());
	let stream = stream_of(&pool, &[&[1]]);
	let token = stream.token();
	let id = stream.id();
	stream.dispose().unwrap();

	let error = pool.acquire(token).unwrap_err();
	assert_eq!(error.operation(), OperationKind::StreamQuery);

	let stream = pool.create().unwrap();
	assert_eq!(stream.id(), id, "stream wrappers are reused");
	let token = stream.into_token();
	assert_eq!(pool.arena().stream_count(), 1, "handing off keeps the stream alive");

	let stream = pool.acquire(token).unwrap().unwrap();
	assert_eq!(stream.token(), token);
	assert_eq!(stream.id(), id);
	stream.dispose().unwrap();
}

#[test]
fn dispose_reclaims_everything() {
	let pool = StreamPool::new(HeapArena::default());
	let stream = stream_of(&pool, &[&[1, 2], &[3]]);
	assert_eq!(pool.arena().region_count(), 2);
	assert_eq!(pool.arena().stream_count(), 1);

	stream.dispose().unwrap();
	assert_eq!(pool.arena().region_count(), 0);
	assert_eq!(pool.arena().stream_count(), 0);
	assert_eq!(pool.len(), 1);
}

#[test]
fn drop_disposes() {
	let pool = StreamPool::new(HeapArena::default());
	{
		let _stream = stream_of(&pool, &[&[1, 2, 3]]);
	}
	assert_eq!(pool.arena().region_count(), 0);
	assert_eq!(pool.arena().stream_count(), 0);
	assert_eq!(pool.len(), 1);
}

#[test]
fn foreign_buffer_is_rejected() {
	let pool = StreamPool::new(HeapArena::default());
	let foreign = BufferPool::new(HeapArena::default());
	let mut stream = pool.create().unwrap();
	let own = common::filled(pool.buffers(), &[9; 4]);
	let buffer = common::filled(&foreign, &[1, 2, 3, 4]);
	assert_eq!(own.address(), buffer.address(), "separate arenas hand out the same keys");

	let error = stream.append(buffer).unwrap_err();
	assert_eq!(error.operation(), OperationKind::StreamAppend);
	assert_eq!(error.arena_source(), Some(&ArenaError::ForeignRegion(own.address())));
	assert_eq!(foreign.arena().region_count(), 0, "the foreign buffer is released");
	assert_eq!(foreign.len(), 1);
	assert!(!stream.has_data().unwrap());
	assert_eq!(own.to_vec().unwrap(), [9; 4]);

	stream.append(own).unwrap();
	let mut dst = foreign.allocate(4).unwrap();
	let before = dst.to_vec().unwrap();
	let error = stream.copy_head(&mut dst).unwrap_err();
	assert_eq!(error.operation(), OperationKind::StreamCopy);
	assert_eq!(error.arena_source(), Some(&ArenaError::ForeignRegion(dst.address())));
	assert_eq!(dst.position(), 0);
	assert_eq!(dst.to_vec().unwrap(), before);
	assert_eq!(stream.head_len().unwrap(), 4, "the stream is untouched");

	dst.release().unwrap();
	stream.dispose().unwrap();
	assert_eq!(pool.arena().region_count(), 0);
}

#[test]
fn take_head_reclaims_unbound_region() {
	let arena = FaultyArena::default();
	let pool = StreamPool::new(arena.clone());
	let mut stream = pool.create().unwrap();
	stream.append(common::filled(pool.buffers(), &[1, 2])).unwrap();
	assert_eq!(arena.inner.region_count(), 1);

	arena.set_fault(Fault::Bounds);
	let error = stream.take_head().unwrap_err();
	assert_eq!(error.operation(), OperationKind::StreamTake);
	assert_eq!(error.arena_source(), Some(&ArenaError::Borrow));
	assert_eq!(arena.inner.region_count(), 0, "the taken region is reclaimed");

	arena.set_fault(Fault::None);
	assert!(!stream.has_data().unwrap());
	stream.dispose().unwrap();
}
