use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::{Error as HashError, Hash};

/// Address of an immutable block of bytes, derived from the bytes themselves.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct ContentId(Hash);

impl ContentId {
    /// Computes the identifier of `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(Hash::new(data))
    }

    #[must_use]
    pub const fn hash(&self) -> &Hash {
        &self.0
    }
}

impl From<[u8; 32]> for ContentId {
    fn from(id: [u8; 32]) -> Self {
        Self(id.into())
    }
}

impl From<Hash> for ContentId {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

impl Deref for ContentId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for ContentId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0.to_base58()
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct InvalidContentId(HashError);

impl FromStr for ContentId {
    type Err = InvalidContentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse().map_err(InvalidContentId)?))
    }
}
