use std::fmt;

use thiserror::Error;

/// One segment of a hierarchical [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    /// A named segment, e.g. `"todos"`.
    Str(String),
    /// A numeric segment, e.g. an id.
    Int(i64),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Str(segment) => f.write_str(segment),
            KeySegment::Int(segment) => write!(f, "{segment}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(segment: &str) -> Self {
        KeySegment::Str(segment.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(segment: String) -> Self {
        KeySegment::Str(segment)
    }
}

macro_rules! int_segment {
    ($($int:ty),*) => {
        $(
            impl From<$int> for KeySegment {
                fn from(segment: $int) -> Self {
                    KeySegment::Int(i64::from(segment))
                }
            }
        )*
    };
}

int_segment!(i8, i16, i32, i64, u8, u16, u32);

/// Errors raised while building keys or registering queries under them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryKeyError {
    /// Keys need at least one segment.
    #[error("a query key needs at least one segment")]
    Empty,
    /// The key passes through, or lands on, a node of the other kind.
    #[error("query key `{key}` conflicts with an existing query or key prefix")]
    PathConflict {
        /// The key that could not be registered.
        key: QueryKey,
    },
    /// A query already exists under the key with different value or error types.
    #[error("query key `{key}` is registered with different value or error types")]
    TypeMismatch {
        /// The key that was looked up.
        key: QueryKey,
    },
}

/// Hierarchical identifier of a query: a query key plus optional subkeys.
///
/// ```
/// use swr_query::*;
///
/// let key = QueryKey::from(("todos", 5));
/// assert_eq!(key, QueryKey::from("todos").child(5));
/// assert_eq!(key.to_string(), "todos/5");
/// assert!(key.starts_with(&QueryKey::from("todos")));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Builds a key from a dynamic list of segments.
    pub fn new<S>(segments: impl IntoIterator<Item = S>) -> Result<Self, QueryKeyError>
    where
        S: Into<KeySegment>,
    {
        let segments: Vec<KeySegment> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            Err(QueryKeyError::Empty)
        } else {
            Ok(QueryKey(segments))
        }
    }

    /// Appends a subkey.
    pub fn child(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// The segments of this key, never empty.
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Whether `prefix` addresses this key or one of its ancestors.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryKey").field(&self.0).finish()
    }
}

impl<T> From<T> for QueryKey
where
    T: Into<KeySegment>,
{
    fn from(segment: T) -> Self {
        QueryKey(vec![segment.into()])
    }
}

macro_rules! tuple_key {
    ($($name:ident),+) => {
        impl<$($name),+> From<($($name,)+)> for QueryKey
        where
            $($name: Into<KeySegment>),+
        {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                QueryKey(vec![$($name.into()),+])
            }
        }
    };
}

tuple_key!(A, B);
tuple_key!(A, B, C);
tuple_key!(A, B, C, D);
