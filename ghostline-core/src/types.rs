//! Addressing types for point-to-point messaging.
//!
//! - [`Rank`]: index of a process within the communicating group
//! - [`Tag`]: message class used for matching (size control vs. payload)
//! - [`RequestId`]: token naming one non-blocking or persistent request

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Index of a process in the communicating group.
///
/// # Examples
///
/// ```
/// use ghostline_core::Rank;
///
/// let rank: Rank = "3".parse().expect("parse");
/// assert_eq!(rank, Rank::new(3));
/// assert_eq!(rank.index(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(u32);

impl Rank {
    /// Create a rank from its numeric value.
    pub const fn new(rank: u32) -> Self {
        Self(rank)
    }

    /// Numeric value of the rank.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Rank as a slice index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every rank of a group of `size` processes.
    pub fn all(size: usize) -> impl Iterator<Item = Rank> {
        (0..size as u32).map(Rank)
    }
}

impl From<u32> for Rank {
    fn from(rank: u32) -> Self {
        Self(rank)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when parsing a [`Rank`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rank: {0}")]
pub struct RankParseError(String);

impl FromStr for Rank {
    type Err = RankParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Rank)
            .map_err(|_| RankParseError(s.to_string()))
    }
}

/// Message class used when matching receives and probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(u32);

impl Tag {
    /// Size announcements exchanged while binding persistent requests.
    pub const CONTROL: Tag = Tag(0);

    /// Halo payloads.
    pub const DATA: Tag = Tag(1);

    /// Create a tag from its numeric value.
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    /// Numeric value of the tag.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Tag::CONTROL => write!(f, "control"),
            Tag::DATA => write!(f, "data"),
            Tag(other) => write!(f, "tag#{other}"),
        }
    }
}

/// Token naming one request created by a [`Transport`](crate::Transport).
///
/// Ids are never reused by a transport, so a stale id is reported as
/// unknown rather than silently aliasing a newer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a request id from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of the id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}
