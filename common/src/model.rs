use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const MAX_LIMIT: u64 = 1000;

/// Pagination parameters, as accepted by the list endpoints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, IntoParams, ToSchema)]
pub struct Paginated {
    /// The maximum number of entries to return (at most 1000)
    #[serde(default = "default::limit")]
    pub limit: u64,
    /// The first entry to return, counted from the start of the full result set
    #[serde(default)]
    pub offset: u64,
}

impl Default for Paginated {
    fn default() -> Self {
        Self {
            limit: default::limit(),
            offset: 0,
        }
    }
}

impl Paginated {
    /// Clamp the limit into `1..=MAX_LIMIT`.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_LIMIT),
            offset: self.offset,
        }
    }
}

mod default {
    pub const fn limit() -> u64 {
        25
    }
}

/// A page of results, with the total number of matching entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResults<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PaginatedResults<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResults<U> {
        PaginatedResults {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// A value which carries a revision, for optimistic concurrency on writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Revisioned<T> {
    pub value: T,
    /// An opaque revision, to be passed back via `If-Match`
    pub revision: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(25, 25)]
    #[case(1000, 1000)]
    #[case(5000, 1000)]
    #[test_log::test]
    fn clamp_limits(#[case] limit: u64, #[case] expected: u64) {
        let paginated = Paginated { limit, offset: 0 }.clamped();
        assert_eq!(paginated.limit, expected);
    }
}
