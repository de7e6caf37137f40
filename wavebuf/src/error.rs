// SPDX-License-Identifier: Apache-2.0

use std::{fmt, result};
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use amplify_derive::Display;
use crate::arena::ArenaError;
use crate::codec::Constructor;
use crate::pool::PoolError;

pub type ErrorBox = Box<dyn StdError + Send + Sync>;
pub type Result<T = ()> = result::Result<T, Error>;

/// The operation that failed.
#[derive(Copy, Clone, Debug, Default, Display, Eq, PartialEq)]
pub enum OperationKind {
	#[default]
	#[display("unknown operation")]
	Unknown,
	#[display("read byte")]
	ReadByte,
	#[display("read int32")]
	ReadInt32,
	#[display("read int64")]
	ReadInt64,
	#[display("read float")]
	ReadFloat,
	#[display("read double")]
	ReadDouble,
	#[display("read bool")]
	ReadBool,
	#[display("read raw bytes")]
	ReadBytes,
	#[display("read byte array")]
	ReadByteArray,
	#[display("read string")]
	ReadString,
	#[display("read nested buffer")]
	ReadBuffer,
	#[display("write byte")]
	WriteByte,
	#[display("write int32")]
	WriteInt32,
	#[display("write int64")]
	WriteInt64,
	#[display("write float")]
	WriteFloat,
	#[display("write double")]
	WriteDouble,
	#[display("write bool")]
	WriteBool,
	#[display("write raw bytes")]
	WriteBytes,
	#[display("write byte array")]
	WriteByteArray,
	#[display("write string")]
	WriteString,
	#[display("write nested buffer")]
	WriteBuffer,
	#[display("acquire buffer")]
	Acquire,
	#[display("allocate buffer")]
	Allocate,
	#[display("release buffer")]
	Release,
	#[display("sync buffer bounds")]
	Sync,
	#[display("compact buffer")]
	Compact,
	#[display("create stream")]
	StreamCreate,
	#[display("append to stream")]
	StreamAppend,
	#[display("copy stream head")]
	StreamCopy,
	#[display("take stream head")]
	StreamTake,
	#[display("discard stream bytes")]
	StreamDiscard,
	#[display("query stream")]
	StreamQuery,
	#[display("dispose stream")]
	StreamDispose,
	#[display("shed free list")]
	Shed,
}

/// What went wrong.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
	#[display("premature end of buffer")]
	Eos,
	#[display("length prefix exceeds the remaining bytes")]
	Truncated,
	#[display("length does not fit in a 24-bit prefix")]
	LengthOverflow,
	#[display("unrecognized boolean constructor {0}")]
	InvalidBool(Constructor),
	#[display("invalid UTF-8")]
	Utf8,
	#[display("arena error")]
	Arena,
	#[display("wrapper pool error")]
	Pool,
}

#[derive(Debug)]
pub struct Error {
	op: OperationKind,
	kind: ErrorKind,
	source: Option<ErrorBox>,
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let Self { op, kind, source } = self;
		if let Some(source) = source {
			write!(f, "{op} failed; {kind} ({source})")
		} else {
			write!(f, "{op} failed; {kind}")
		}
	}
}

impl StdError for Error {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		if let Some(ref source) = self.source {
			Some(source.as_ref())
		} else {
			None
		}
	}
}

impl Error {
	pub(crate) fn new(
		op: OperationKind,
		kind: ErrorKind,
		source: Option<ErrorBox>
	) -> Self {
		Self { op, kind, source }
	}

	/// Creates a new "end of buffer" error.
	pub fn eos(op: OperationKind) -> Self { Self::new(op, ErrorKind::Eos, None) }

	/// Creates a new error for a length prefix pointing past the end of the buffer.
	pub fn truncated(op: OperationKind) -> Self {
		Self::new(op, ErrorKind::Truncated, None)
	}

	/// Creates a new error for a length too large to be prefixed.
	pub fn length_overflow(op: OperationKind) -> Self {
		Self::new(op, ErrorKind::LengthOverflow, None)
	}

	/// Creates a new error for an unrecognized boolean constructor.
	pub fn invalid_bool(op: OperationKind, value: Constructor) -> Self {
		Self::new(op, ErrorKind::InvalidBool(value), None)
	}

	/// Creates a new UTF-8 decode error.
	pub fn utf8(op: OperationKind, error: impl StdError + Send + Sync + 'static) -> Self {
		Self::new(op, ErrorKind::Utf8, Some(error.into()))
	}

	/// Creates a new arena error.
	pub fn arena(op: OperationKind, error: ArenaError) -> Self {
		Self::new(op, ErrorKind::Arena, Some(error.into()))
	}

	/// Creates a new wrapper pool error.
	pub fn pool(op: OperationKind, error: PoolError) -> Self {
		Self::new(op, ErrorKind::Pool, Some(error.into()))
	}

	/// Returns the operation kind.
	pub fn operation(&self) -> OperationKind { self.op }

	/// Sets the operation kind.
	pub fn with_operation(mut self, op: OperationKind) -> Self {
		self.op = op;
		self
	}

	/// Returns the error kind.
	pub fn kind(&self) -> ErrorKind { self.kind }

	/// Returns the source downcast into an arena error, if possible.
	pub fn arena_source(&self) -> Option<&ArenaError> {
		self.source()?.downcast_ref()
	}
}

/// Attaches an operation to lower-level errors.
pub(crate) trait ResultContext<T> {
	fn context(self, op: OperationKind) -> Result<T>;
}

impl<T> ResultContext<T> for result::Result<T, ArenaError> {
	fn context(self, op: OperationKind) -> Result<T> {
		self.map_err(|err| Error::arena(op, err))
	}
}

impl<T> ResultContext<T> for result::Result<T, PoolError> {
	fn context(self, op: OperationKind) -> Result<T> {
		self.map_err(|err| Error::pool(op, err))
	}
}

impl<T> ResultContext<T> for Result<T> {
	fn context(self, op: OperationKind) -> Result<T> {
		self.map_err(|err| err.with_operation(op))
	}
}
