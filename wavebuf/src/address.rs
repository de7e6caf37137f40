// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// An opaque token naming a byte region owned by an [arena](crate::Arena). The
/// zero value is the *null* address, meaning "no buffer".
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Address(u64);

/// An opaque token naming a buffer queue owned by a
/// [stream arena](crate::StreamArena). The zero value is the *null* token.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct StreamToken(u64);

macro_rules! token_impls {
	($($ty:ident $name:literal),+) => {
		$(
		impl $ty {
			/// The null value.
			pub const NULL: Self = Self(0);

			/// Creates a token from its raw value.
			#[inline]
			pub const fn from_raw(value: u64) -> Self { Self(value) }

			/// Returns the raw value.
			#[inline]
			pub const fn into_raw(self) -> u64 { self.0 }

			/// Returns `true` if this is the null value.
			#[inline]
			pub const fn is_null(self) -> bool { self.0 == 0 }

			/// Returns `Some` if the value is not null.
			#[inline]
			pub fn non_null(self) -> Option<Self> {
				(!self.is_null()).then_some(self)
			}
		}

		impl From<u64> for $ty {
			fn from(value: u64) -> Self { Self(value) }
		}

		impl From<$ty> for u64 {
			fn from(value: $ty) -> Self { value.0 }
		}

		impl Display for $ty {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				if self.is_null() {
					f.write_str("null")
				} else {
					write!(f, "{:#x}", self.0)
				}
			}
		}

		impl Debug for $ty {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				write!(f, concat!($name, "({})"), self)
			}
		}
		)+
	};
}

token_impls! {
	Address "Address",
	StreamToken "StreamToken"
}
