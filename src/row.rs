//! # Row Serialization
//!
//! RowanDB stores records with a fixed schema: a `u32` primary key plus two
//! bounded text columns. Every row serializes to exactly 291 bytes, which is
//! what makes the leaf-cell layout a simple array of fixed-size slots.
//!
//! ## On-Disk Image (291 bytes)
//!
//! ```text
//! Offset  Size  Field     Description
//! ------  ----  --------  ----------------------------------------
//! 0       4     id        Primary key, little-endian u32
//! 4       32    username  UTF-8 bytes, NUL-padded to the slot size
//! 36      255   email     UTF-8 bytes, NUL-padded to the slot size
//! ```
//!
//! Strings shorter than their slot are padded with zero bytes; reads stop at
//! the first NUL. A string that exactly fills its slot has no terminator,
//! matching the original file format.
//!
//! ## Validation
//!
//! Length limits are enforced at construction, not at serialization: once a
//! [`Row`] exists it is guaranteed to fit its image. Oversized input is a
//! typed [`RowError`], never a panic or a truncation.

use std::fmt;

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{COLUMN_EMAIL_SIZE, COLUMN_USERNAME_SIZE, ROW_SIZE};

/// Construction-time validation failures for [`Row`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    UsernameTooLong { len: usize },
    EmailTooLong { len: usize },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::UsernameTooLong { len } => {
                write!(f, "username is {} bytes, max {}", len, COLUMN_USERNAME_SIZE)
            }
            RowError::EmailTooLong { len } => {
                write!(f, "email is {} bytes, max {}", len, COLUMN_EMAIL_SIZE)
            }
        }
    }
}

impl std::error::Error for RowError {}

/// One record: primary key plus the fixed text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    /// Builds a row, rejecting field values that would not fit their slot.
    pub fn new(
        id: u32,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, RowError> {
        let username = username.into();
        let email = email.into();

        if username.len() > COLUMN_USERNAME_SIZE {
            return Err(RowError::UsernameTooLong {
                len: username.len(),
            });
        }
        if email.len() > COLUMN_EMAIL_SIZE {
            return Err(RowError::EmailTooLong { len: email.len() });
        }

        Ok(Self {
            id,
            username,
            email,
        })
    }

    pub fn to_image(&self) -> RowImage {
        RowImage::from_row(self)
    }

    pub fn from_image(image: &RowImage) -> Self {
        image.to_row()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

/// The 291-byte serialized form of a [`Row`], transmutable from page bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RowImage {
    id: U32,
    username: [u8; COLUMN_USERNAME_SIZE],
    email: [u8; COLUMN_EMAIL_SIZE],
}

const _: () = assert!(size_of::<RowImage>() == ROW_SIZE);

impl RowImage {
    pub fn from_row(row: &Row) -> Self {
        let mut image = Self {
            id: U32::new(row.id),
            username: [0u8; COLUMN_USERNAME_SIZE],
            email: [0u8; COLUMN_EMAIL_SIZE],
        };
        image.username[..row.username.len()].copy_from_slice(row.username.as_bytes());
        image.email[..row.email.len()].copy_from_slice(row.email.as_bytes());
        image
    }

    pub fn to_row(&self) -> Row {
        Row {
            id: self.id.get(),
            username: slot_to_string(&self.username),
            email: slot_to_string(&self.email),
        }
    }

    pub fn id(&self) -> u32 {
        self.id.get()
    }
}

/// Reads a NUL-padded slot back into an owned string, stopping at the first
/// zero byte. Non-UTF-8 bytes are replaced rather than erroring; they can
/// only appear in files written by a foreign tool.
fn slot_to_string(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}
