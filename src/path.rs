//! [`Path`]: the structural identity key for an operation within a
//! [`Client`](crate::client::Client).
//!
//! A path is an ordered sequence of hashable, `Send + Sync` tokens.
//! Equality and hashing are structural (element-wise); one path is a
//! *prefix* of another when it is no longer and its elements match
//! pairwise from the front. `Client::stores` uses prefix matching to find
//! every store under a namespace (e.g. `["users"]` matches
//! `["users", 7]` and `["users", 7, "friends"]`).

use std::fmt;
use std::hash::Hash;

/// One token in a [`Path`].
///
/// A closed set rather than a generic parameter: operations are erased and
/// stored in a single `Client` map, so path tokens need one concrete,
/// hashable representation regardless of which operation produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// A string component, e.g. `"users"`.
    Str(String),
    /// A signed integer component, e.g. a negative offset.
    Int(i64),
    /// An unsigned integer component, e.g. a database row id.
    UInt(u64),
    /// A boolean component, used for coarse flags in a path.
    Bool(bool),
    /// A UUID component, e.g. a client-generated identifier.
    Uuid(uuid::Uuid),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

macro_rules! impl_from_segment {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for PathSegment {
            fn from(value: $ty) -> Self {
                Self::$variant(value.into())
            }
        }
    };
}

impl_from_segment!(&str, Str);
impl_from_segment!(String, Str);
impl_from_segment!(i32, Int);
impl_from_segment!(i64, Int);
impl_from_segment!(u32, UInt);
impl_from_segment!(u64, UInt);
impl_from_segment!(bool, Bool);
impl_from_segment!(uuid::Uuid, Uuid);

/// Structural identity of an operation: an ordered, hashable sequence of
/// [`PathSegment`]s.
///
/// Paths are value types — cheap to clone, compare, and hash — and are the
/// key a [`Client`](crate::client::Client) uses to find or create the
/// `Store` for an operation.
///
/// ```
/// use operon::path::Path;
///
/// let users = Path::from(["users"]);
/// let user_7 = Path::from_segments(vec!["users".into(), 7u64.into()]);
/// assert!(users.is_prefix_of(&user_7));
/// assert!(!user_7.is_prefix_of(&users));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// Builds a path from already-converted segments.
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Number of segments in this path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` for the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The path's segments, in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// `self` is a prefix of `other`: `self` is no longer than `other` and
    /// every element matches pairwise from the front.
    ///
    /// The empty path is a prefix of everything, including itself.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Appends one segment, returning a new path.
    pub fn appending(&self, segment: impl Into<PathSegment>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl<T, const N: usize> From<[T; N]> for Path
where
    T: Into<PathSegment>,
{
    fn from(value: [T; N]) -> Self {
        Self(value.into_iter().map(Into::into).collect())
    }
}

impl<T> FromIterator<T> for Path
where
    T: Into<PathSegment>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_pairwise() {
        let a = Path::from(["a", "b"]);
        let abc = Path::from_segments(vec!["a".into(), "b".into(), "c".into()]);
        assert!(a.is_prefix_of(&abc));
        assert!(!Path::from(["a", "c"]).is_prefix_of(&abc));
    }

    #[test]
    fn path_is_not_prefix_when_elements_differ() {
        let a_c = Path::from(["a", "c"]);
        let abc = Path::from_segments(vec!["a".into(), "b".into(), "c".into()]);
        assert!(!a_c.is_prefix_of(&abc));
    }

    #[test]
    fn empty_path_is_prefix_of_everything() {
        let empty = Path::default();
        let abc = Path::from(["a", "b", "c"]);
        assert!(empty.is_prefix_of(&abc));
        assert!(empty.is_prefix_of(&empty));
    }

    #[test]
    fn equality_and_hash_are_structural() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::Hasher;

        let p1 = Path::from(["users", "7"]);
        let p2 = Path::from(["users", "7"]);
        assert_eq!(p1, p2);

        let mut h1 = DefaultHasher::new();
        p1.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        p2.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn longer_path_is_never_a_prefix_of_a_shorter_one() {
        let long = Path::from(["a", "b", "c"]);
        let short = Path::from(["a", "b"]);
        assert!(!long.is_prefix_of(&short));
    }
}
