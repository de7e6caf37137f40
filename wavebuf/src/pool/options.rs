// SPDX-License-Identifier: Apache-2.0

/// Options for tuning [`BufferPool`](super::BufferPool) and
/// [`StreamPool`](crate::StreamPool) wrapper recycling.
///
/// # Retain limit
///
/// The maximum number of released wrappers kept in the free list. Wrappers
/// released while the list is full are dropped. Defaults to `64`. With a limit of
/// zero, wrappers are never recycled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PoolOptions {
	pub retain_limit: usize,
}

impl Default for PoolOptions {
	fn default() -> Self { Self::new() }
}

impl PoolOptions {
	/// Creates a new set of pool options.
	pub const fn new() -> Self {
		Self { retain_limit: 64 }
	}

	/// Presets the options to create a pool which never recycles wrappers.
	#[inline]
	pub const fn unpooled() -> Self {
		Self { retain_limit: 0 }
	}

	/// Returns the retain limit.
	#[inline]
	pub const fn retain_limit(&self) -> usize { self.retain_limit }

	/// Sets the retain limit.
	#[inline]
	pub const fn with_retain_limit(mut self, value: usize) -> Self {
		self.retain_limit = value;
		self
	}
}
