/// Outcome of a single call to a query's fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult<V, E> {
    /// The fetch succeeded.
    Ok(V),
    /// The fetch failed and should not be retried.
    Err(E),
    /// The fetch failed and the retry policy decides whether to try again.
    Retry {
        /// The error of this attempt.
        err: E,
        /// Whether to show the error to subscribers while waiting for the next attempt.
        return_error: bool,
    },
}

impl<V, E> From<Result<V, E>> for FetchResult<V, E> {
    fn from(result: Result<V, E>) -> Self {
        match result {
            Ok(data) => FetchResult::Ok(data),
            Err(err) => FetchResult::Err(err),
        }
    }
}

/// The result of a query as seen by its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult<V, E> {
    /// Fetching is blocked by an unresolved or stopped dependency.
    Idle,
    /// No data is available yet.
    Loading,
    /// The latest fetch failed.
    Err {
        /// Whether another attempt is scheduled.
        is_refetching: bool,
        /// The error of the latest attempt.
        err: E,
    },
    /// Data is available.
    Ok(V),
}

impl<V, E> QueryResult<V, E> {
    /// Returns the data, if present.
    pub fn data(&self) -> Option<&V> {
        match self {
            QueryResult::Ok(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error, if present.
    pub fn err(&self) -> Option<&E> {
        match self {
            QueryResult::Err { err, .. } => Some(err),
            _ => None,
        }
    }

    /// Returns true for [`QueryResult::Idle`].
    pub fn is_idle(&self) -> bool {
        matches!(self, QueryResult::Idle)
    }

    /// Returns true for [`QueryResult::Loading`].
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryResult::Loading)
    }

    /// Returns true for [`QueryResult::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryResult::Ok(_))
    }

    /// Returns true for [`QueryResult::Err`].
    pub fn is_err(&self) -> bool {
        matches!(self, QueryResult::Err { .. })
    }

    /// Ok and Err end a fetch loop; Idle and Loading do not.
    pub(crate) fn is_settled(&self) -> bool {
        self.is_ok() || self.is_err()
    }

    /// Transform the data.
    pub fn map<R>(self, mapper: impl FnOnce(V) -> R) -> QueryResult<R, E> {
        match self {
            QueryResult::Idle => QueryResult::Idle,
            QueryResult::Loading => QueryResult::Loading,
            QueryResult::Err { is_refetching, err } => QueryResult::Err { is_refetching, err },
            QueryResult::Ok(data) => QueryResult::Ok(mapper(data)),
        }
    }
}
