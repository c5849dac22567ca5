//! Multi-strategy locality search
//!
//! Strategies are tried in configured order. The first strategy that yields a
//! locality is committed and walked to the end; the others are never queried
//! afterwards, even if a later page of the committed strategy fails.
//!
//! ```text
//! Trying(0) --empty--> Trying(1) --empty--> ... --> Exhausted
//!     |                    |
//!  first item           first item
//!     v                    v
//! Committed(0)         Committed(1) --cursor exhausted--> Drained(1)
//! ```

use crate::fetcher::mindat_client::MindatClient;
use crate::fetcher::pagination::LocalityPages;
use crate::fetcher::{FetcherError, FetcherResult, QueryParams};
use crate::Locality;
use futures_util::stream::{self, Stream};
use std::fmt;
use tracing::{info, warn};

/// One `(query parameter, value)` query against the search endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchStrategy {
    rank: usize,
    param: String,
    value: String,
}

impl SearchStrategy {
    /// Create a strategy at position `rank`
    pub fn new(rank: usize, param: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            rank,
            param: param.into(),
            value: value.into(),
        }
    }

    /// Strategies used when none are configured: locality type, then free text
    pub fn defaults_for(locality_type: &str) -> Vec<Self> {
        vec![
            Self::new(0, "ltype", locality_type),
            Self::new(1, "txt", locality_type),
        ]
    }

    /// Position in the configured list
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Query parameter name
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Query parameter value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.param, self.value)
    }
}

/// Position of a search in the strategy state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Querying strategy `i` for a first result
    Trying(usize),
    /// Strategy `i` produced results; streaming its remaining pages
    Committed(usize),
    /// Strategy `i` was committed and its walk completed
    Drained(usize),
    /// No strategy produced any result
    Exhausted,
    /// A request failed; the search yields nothing further
    Failed,
}

/// Locality queries over the configured strategies
#[derive(Clone)]
pub struct LocalitiesRepository {
    client: MindatClient,
    strategies: Vec<SearchStrategy>,
}

impl LocalitiesRepository {
    /// Create a repository
    pub fn new(client: MindatClient, strategies: Vec<SearchStrategy>) -> Self {
        Self { client, strategies }
    }

    /// Configured strategies in order
    pub fn strategies(&self) -> &[SearchStrategy] {
        &self.strategies
    }

    /// Search localities of a country, one strategy at a time
    pub fn mines_in_country(&self, country: &str) -> StrategySearch {
        let base = vec![
            ("format".to_string(), "json".to_string()),
            ("country".to_string(), country.to_string()),
        ];
        StrategySearch::new(self.client.clone(), self.strategies.clone(), base)
    }
}

/// A running multi-strategy search; pull with [`StrategySearch::next_locality`]
pub struct StrategySearch {
    client: MindatClient,
    strategies: Vec<SearchStrategy>,
    base: QueryParams,
    state: SearchState,
    current: Option<LocalityPages>,
}

impl StrategySearch {
    fn new(client: MindatClient, strategies: Vec<SearchStrategy>, base: QueryParams) -> Self {
        Self {
            client,
            strategies,
            base,
            state: SearchState::Trying(0),
            current: None,
        }
    }

    /// Current state
    pub fn state(&self) -> SearchState {
        self.state
    }

    /// The committed strategy, once one has produced results
    pub fn committed_strategy(&self) -> Option<&SearchStrategy> {
        match self.state {
            SearchState::Committed(i) | SearchState::Drained(i) => self.strategies.get(i),
            _ => None,
        }
    }

    /// Total count reported by the server for the active strategy
    pub fn total(&self) -> Option<u64> {
        self.current.as_ref().and_then(LocalityPages::total)
    }

    fn params_for(&self, strategy: &SearchStrategy) -> QueryParams {
        let mut params = self.base.clone();
        params.push((strategy.param().to_string(), strategy.value().to_string()));
        params
    }

    /// Pull the next locality
    ///
    /// `Ok(None)` means the search is over, either drained or exhausted.
    pub async fn next_locality(&mut self) -> FetcherResult<Option<Locality>> {
        loop {
            match self.state {
                SearchState::Trying(i) => {
                    let Some(strategy) = self.strategies.get(i).cloned() else {
                        info!(
                            strategies = self.strategies.len(),
                            "No search strategy returned results"
                        );
                        self.state = SearchState::Exhausted;
                        self.current = None;
                        return Ok(None);
                    };

                    if self.current.is_none() {
                        info!(strategy = %strategy, rank = i, "Trying search strategy");
                        let params = self.params_for(&strategy);
                        self.current = Some(self.client.search_localities(&params)?);
                    }

                    let first = match self.current.as_mut() {
                        Some(pages) => pages.next_item().await,
                        None => Ok(None),
                    };
                    match first {
                        Ok(Some(locality)) => {
                            info!(strategy = %strategy, rank = i, "Committed to search strategy");
                            self.state = SearchState::Committed(i);
                            return Ok(Some(locality));
                        }
                        Ok(None) => {
                            info!(strategy = %strategy, rank = i, "Strategy returned no results");
                            self.current = None;
                            self.state = SearchState::Trying(i + 1);
                        }
                        Err(e) => {
                            warn!(strategy = %strategy, error = %e, "Search request failed");
                            self.state = SearchState::Failed;
                            return Err(e);
                        }
                    }
                }
                SearchState::Committed(i) => {
                    let next = match self.current.as_mut() {
                        Some(pages) => pages.next_item().await,
                        None => Ok(None),
                    };
                    return match next {
                        Ok(Some(locality)) => Ok(Some(locality)),
                        Ok(None) => {
                            self.state = SearchState::Drained(i);
                            Ok(None)
                        }
                        Err(e) => {
                            warn!(rank = i, error = %e, "Page request failed after commit");
                            self.state = SearchState::Failed;
                            Err(e)
                        }
                    };
                }
                SearchState::Drained(_) | SearchState::Exhausted | SearchState::Failed => {
                    return Ok(None)
                }
            }
        }
    }

    /// Drain every remaining locality
    pub async fn collect_all(mut self) -> FetcherResult<Vec<Locality>> {
        let mut out = Vec::new();
        while let Some(locality) = self.next_locality().await? {
            out.push(locality);
        }
        Ok(out)
    }

    /// Adapt into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = FetcherResult<Locality>> {
        stream::try_unfold(self, |mut search| async move {
            let locality = search.next_locality().await?;
            Ok::<_, FetcherError>(locality.map(|loc| (loc, search)))
        })
    }
}
