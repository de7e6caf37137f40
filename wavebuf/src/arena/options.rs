// SPDX-License-Identifier: Apache-2.0

/// The default region size classes, in bytes.
pub const DEFAULT_SIZE_CLASSES: &[usize] = &[8, 128, 1024, 4096, 16384, 40000, 160000];

/// Options for tuning [`HeapArena`](super::HeapArena)'s storage recycling.
///
/// # Size classes
///
/// Requested region lengths are rounded up to the smallest class that fits, so
/// reclaimed storage can be handed out again for any request of that class.
/// Lengths larger than the largest class are allocated exactly and freed when
/// reclaimed. Classes must be sorted in ascending order.
///
/// # Retention
///
/// The number of reclaimed blocks kept per size class. Blocks reclaimed past this
/// limit are freed. Defaults to `16`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct ArenaOptions {
	pub size_classes: &'static [usize],
	pub retain_per_class: usize,
}

impl Default for ArenaOptions {
	fn default() -> Self { Self::new() }
}

impl ArenaOptions {
	/// Creates a new set of arena options.
	pub const fn new() -> Self {
		Self {
			size_classes: DEFAULT_SIZE_CLASSES,
			retain_per_class: 16,
		}
	}

	/// Presets the options to create an arena which never recycles storage.
	#[inline]
	pub const fn exact() -> Self {
		Self {
			size_classes: &[],
			retain_per_class: 0,
		}
	}

	/// Returns the region size classes.
	#[inline]
	pub const fn size_classes(&self) -> &'static [usize] { self.size_classes }

	/// Returns the number of reclaimed blocks kept per size class.
	#[inline]
	pub const fn retain_per_class(&self) -> usize { self.retain_per_class }

	/// Sets the region size classes.
	#[inline]
	pub const fn with_size_classes(mut self, value: &'static [usize]) -> Self {
		self.size_classes = value;
		self
	}

	/// Sets the number of reclaimed blocks kept per size class.
	#[inline]
	pub const fn with_retain_per_class(mut self, value: usize) -> Self {
		self.retain_per_class = value;
		self
	}

	/// Returns the index of the smallest class fitting `len`, or `None` if `len`
	/// exceeds all classes.
	pub(crate) fn class_of(&self, len: usize) -> Option<usize> {
		self.size_classes.iter().position(|&size| len <= size)
	}
}
