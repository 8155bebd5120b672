//! Initial list load with enriched-then-reduced join fallback.

use std::future::Future;

use tracing::{debug, warn};

use crate::error::TogetherError;
use crate::filter::WishScope;
use crate::model::wish::Wish;
use crate::priority::sort_wishes;
use crate::store::{JoinSpec, StoreError, WishQuery, WishStore};

/// A loaded, sorted collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub wishes: Vec<Wish>,
    /// Join that produced the rows. `None` when the scope had no group and
    /// nothing was queried.
    pub join: Option<JoinSpec>,
}

/// Run `fetch` with the enriched join, retrying once with the reduced join
/// if it fails for any reason.
///
/// # Errors
///
/// Returns the reduced attempt's error when both attempts fail.
pub async fn with_join_fallback<T, F, Fut>(mut fetch: F) -> Result<(T, JoinSpec), StoreError>
where
    F: FnMut(JoinSpec) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match fetch(JoinSpec::Enriched).await {
        Ok(value) => Ok((value, JoinSpec::Enriched)),
        Err(enriched_error) => {
            debug!(error = %enriched_error, "enriched join failed; retrying reduced join");
            match fetch(JoinSpec::Reduced).await {
                Ok(value) => Ok((value, JoinSpec::Reduced)),
                Err(reduced_error) => {
                    warn!(
                        enriched_error = %enriched_error,
                        error = %reduced_error,
                        "both joins failed"
                    );
                    Err(reduced_error)
                }
            }
        }
    }
}

/// Load every wish in `scope`, newest first from the store, then sorted by
/// priority. An unavailable scope loads nothing and never touches the store.
///
/// # Errors
///
/// Returns [`TogetherError::FetchFailed`] when both join attempts fail.
pub async fn load_snapshot(
    store: &dyn WishStore,
    scope: &WishScope,
) -> Result<Snapshot, TogetherError> {
    let Some(query) = WishQuery::for_scope(scope) else {
        debug!("scope has no group; empty snapshot");
        return Ok(Snapshot::default());
    };

    let query = &query;
    let (wishes, join) = with_join_fallback(move |join| store.query_wishes(query, join))
        .await
        .map_err(TogetherError::FetchFailed)?;

    debug!(
        channel = %scope.channel_name(),
        join = join.as_str(),
        count = wishes.len(),
        "loaded snapshot"
    );
    Ok(Snapshot {
        wishes: sort_wishes(wishes),
        join: Some(join),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn enriched_success_skips_reduced() {
        let calls = RefCell::new(Vec::new());
        let result = with_join_fallback(|join| {
            calls.borrow_mut().push(join);
            async { Ok::<_, StoreError>(1) }
        })
        .await
        .expect("ok");
        assert_eq!(result, (1, JoinSpec::Enriched));
        assert_eq!(*calls.borrow(), [JoinSpec::Enriched]);
    }

    #[tokio::test]
    async fn enriched_failure_falls_back() {
        let result = with_join_fallback(|join| async move {
            match join {
                JoinSpec::Enriched => Err(StoreError::MissingRelation("wish_priorities".into())),
                JoinSpec::Reduced => Ok(2),
            }
        })
        .await
        .expect("fallback succeeds");
        assert_eq!(result, (2, JoinSpec::Reduced));
    }

    #[tokio::test]
    async fn both_failures_report_reduced_error() {
        let result: Result<((), JoinSpec), _> = with_join_fallback(|join| async move {
            Err(StoreError::Unavailable(join.as_str().to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(msg)) if msg == "reduced"));
    }
}
