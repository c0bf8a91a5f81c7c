use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, GuestDirectory};
use crate::models::GuestSummary;
use crate::utils::{digits_only, is_all_digits};

/// Cap on returned matches; keeps typeahead render cost bounded.
pub const DEFAULT_RESULT_LIMIT: usize = 25;

/// Which query strategy a session uses. Fixed at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Local => write!(f, "local"),
            SearchMode::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SearchMode::Local),
            "remote" => Ok(SearchMode::Remote),
            other => Err(format!("unknown search mode '{}', expected local or remote", other)),
        }
    }
}

/// Substring search over a store snapshot.
///
/// - blank query: no results, never "everything"
/// - digits only: matched against phone numbers with punctuation stripped
/// - otherwise: case-insensitive substring of the normalized key
///
/// Matches whose key starts with the query come first; each group keeps
/// snapshot order, so identical input always yields identical output.
pub fn search_local<'a>(
    query: &str,
    snapshot: impl IntoIterator<Item = &'a GuestSummary>,
    limit: usize,
) -> Vec<GuestSummary> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    if is_all_digits(query) {
        return snapshot
            .into_iter()
            .filter(|g| g.phone().is_some_and(|p| digits_only(p).contains(query)))
            .take(limit)
            .cloned()
            .collect();
    }

    let needle = query.to_lowercase();
    let (prefixed, contained): (Vec<&GuestSummary>, Vec<&GuestSummary>) = snapshot
        .into_iter()
        .filter(|g| g.normalized_key().contains(&needle))
        .partition(|g| g.normalized_key().starts_with(&needle));

    prefixed
        .into_iter()
        .chain(contained)
        .take(limit)
        .cloned()
        .collect()
}

/// Delegate a query to the directory's search endpoint.
///
/// A blank query short-circuits without a request. `Ok(None)` means the
/// token was cancelled before the response arrived; callers drop it.
pub async fn search_remote(
    directory: &dyn GuestDirectory,
    query: &str,
    cancel: &CancellationToken,
    limit: usize,
) -> Result<Option<Vec<GuestSummary>>, ApiError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Some(Vec::new()));
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        result = directory.search(query) => {
            let guests = result?;
            Ok(Some(
                guests
                    .into_iter()
                    .take(limit)
                    .map(|g| g.into_summary())
                    .collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{remote, MockDirectory};
    use std::time::Duration;

    fn guest(id: &str, name: &str, phone: Option<&str>) -> GuestSummary {
        GuestSummary::new(id, name, phone.map(str::to_string), None)
    }

    fn pool() -> Vec<GuestSummary> {
        vec![
            guest("1", "Lekana", Some("+1 555-1234")),
            guest("2", "Ravi", None),
        ]
    }

    fn ids(results: &[GuestSummary]) -> Vec<&str> {
        results.iter().map(|g| g.id()).collect()
    }

    #[test]
    fn test_blank_query_returns_nothing() {
        assert!(search_local("", &pool(), 25).is_empty());
        assert!(search_local("   ", &pool(), 25).is_empty());
    }

    #[test]
    fn test_local_substring_scenario() {
        assert_eq!(ids(&search_local("lek", &pool(), 25)), vec!["1"]);
    }

    #[test]
    fn test_local_match_is_case_insensitive() {
        for query in ["lek", "LEK", "ekan"] {
            assert_eq!(ids(&search_local(query, &pool(), 25)), vec!["1"], "query {query}");
        }
    }

    #[test]
    fn test_digit_query_matches_formatted_phone() {
        assert_eq!(ids(&search_local("5551234", &pool(), 25)), vec!["1"]);
        assert_eq!(ids(&search_local("1555", &pool(), 25)), vec!["1"]);
        assert!(search_local("999", &pool(), 25).is_empty());
    }

    #[test]
    fn test_alpha_query_does_not_use_phone_logic() {
        assert!(search_local("abc", &pool(), 25).is_empty());
        // "555-1234" has punctuation, so it goes through the normalized key.
        assert_eq!(ids(&search_local("555-1234", &pool(), 25)), vec!["1"]);
    }

    #[test]
    fn test_digit_query_ignores_guests_without_phone() {
        let snapshot = vec![guest("1", "Room 101", None)];
        assert!(search_local("101", &snapshot, 25).is_empty());
    }

    #[test]
    fn test_prefix_matches_rank_first() {
        let snapshot = vec![
            guest("1", "Aleko", None),
            guest("2", "Lekana", None),
            guest("3", "Bilek", None),
            guest("4", "Lekan", None),
        ];
        assert_eq!(ids(&search_local("lek", &snapshot, 25)), vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn test_results_are_capped_and_stable() {
        let snapshot: Vec<GuestSummary> = (0..100)
            .map(|n| guest(&format!("{:03}", n), &format!("Guest {}", n), None))
            .collect();

        let first = search_local("guest", &snapshot, 20);
        let second = search_local("guest", &snapshot, 20);

        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
        assert_eq!(first[0].id(), "000");
    }

    #[test]
    fn test_search_mode_parsing() {
        assert_eq!("local".parse::<SearchMode>(), Ok(SearchMode::Local));
        assert_eq!(" Remote ".parse::<SearchMode>(), Ok(SearchMode::Remote));
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::Remote.to_string(), "remote");
    }

    #[tokio::test]
    async fn test_remote_blank_query_makes_no_request() {
        let directory = MockDirectory::new();
        let cancel = CancellationToken::new();

        let results = search_remote(&directory, "  ", &cancel, 25).await.expect("search");

        assert_eq!(results, Some(Vec::new()));
        assert!(directory.search_queries().is_empty());
    }

    #[tokio::test]
    async fn test_remote_search_maps_results() {
        let directory = MockDirectory::new().with_search("neo", vec![remote("3", "Neo", None)]);
        let cancel = CancellationToken::new();

        let results = search_remote(&directory, "neo", &cancel, 25)
            .await
            .expect("search")
            .expect("not cancelled");

        assert_eq!(ids(&results), vec!["3"]);
        assert_eq!(results[0].normalized_key(), "neo");
        assert_eq!(directory.search_queries(), vec!["neo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_search_resolves_to_none_when_cancelled() {
        let directory = MockDirectory::new()
            .with_search("neo", vec![remote("3", "Neo", None)])
            .with_search_delay("neo", Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let results = search_remote(&directory, "neo", &cancel, 25).await.expect("search");
        assert_eq!(results, None);
    }

    #[tokio::test]
    async fn test_remote_failure_is_returned() {
        let directory = MockDirectory::new().failing_search();
        let cancel = CancellationToken::new();

        let err = search_remote(&directory, "neo", &cancel, 25)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::ServerError(_)));
    }
}
