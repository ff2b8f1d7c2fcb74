/// Default number of messages returned when a query sets no limit.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Hard cap on messages returned by a single query.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// A topic-pattern query: dotted topic with optional wildcards and a
/// `?last=` recency bound, e.g. `teams.*.ch1?last=1h`.
#[derive(Clone, Debug)]
pub struct Query {
    pub topic: Vec<u8>,
    /// Isolation tag; zero selects the master contract.
    pub contract: u32,
    pub limit: usize,
}

impl Query {
    pub fn new(topic: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            contract: 0,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn with_contract(mut self, contract: u32) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_QUERY_LIMIT);
        self
    }
}
