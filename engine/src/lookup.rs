use std::cell::{Ref, RefCell};

use pilji_shared::ParcelFeature;
use thiserror::Error;

use crate::governor::{CallOutcome, GovernorLimit, RateGovernor};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// Denied by the rate governor before any call went out. Surfaced to the
    /// caller so the UI can say so; never silently dropped.
    #[error("lookup rate limited")]
    RateLimited,
    #[error("lookup timed out")]
    Timeout,
    #[error("lookup provider failure: {0}")]
    Provider(String),
}

/// The parcel lookup capability: coordinate or address in, at most one
/// parcel feature out. "No parcel there" is `Ok(None)`, not an error.
pub trait ParcelLookup {
    fn lookup_point(
        &self,
        lon: f64,
        lat: f64,
    ) -> impl Future<Output = Result<Option<ParcelFeature>, LookupError>>;

    fn lookup_address(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<ParcelFeature>, LookupError>>;
}

/// Wraps a lookup client with the rate governor: admission check before
/// every outbound call, outcome and duration recorded after. The clock is
/// injected so the window logic is testable off the browser.
pub struct GovernedLookup<L, Now: Fn() -> f64> {
    inner: L,
    provider: String,
    governor: RefCell<RateGovernor>,
    now_ms: Now,
}

impl<L: ParcelLookup, Now: Fn() -> f64> GovernedLookup<L, Now> {
    pub fn new(inner: L, provider: impl Into<String>, now_ms: Now) -> Self {
        Self {
            inner,
            provider: provider.into(),
            governor: RefCell::new(RateGovernor::new()),
            now_ms,
        }
    }

    pub fn with_limit(self, limit: GovernorLimit) -> Self {
        self.governor.borrow_mut().set_limit(&self.provider, limit);
        self
    }

    pub fn governor(&self) -> Ref<'_, RateGovernor> {
        self.governor.borrow()
    }

    fn admit(&self) -> Result<f64, LookupError> {
        let started = (self.now_ms)();
        if self.governor.borrow_mut().try_acquire(&self.provider, started) {
            Ok(started)
        } else {
            self.governor
                .borrow_mut()
                .record(&self.provider, CallOutcome::RateLimited, 0.0);
            Err(LookupError::RateLimited)
        }
    }

    fn settle(
        &self,
        started: f64,
        result: &Result<Option<ParcelFeature>, LookupError>,
    ) {
        let outcome = match result {
            Ok(Some(_)) => CallOutcome::Success,
            Ok(None) => CallOutcome::NotFound,
            Err(LookupError::Timeout) => CallOutcome::Timeout,
            Err(_) => CallOutcome::ProviderError,
        };
        let elapsed = (self.now_ms)() - started;
        self.governor
            .borrow_mut()
            .record(&self.provider, outcome, elapsed);
    }
}

impl<L: ParcelLookup, Now: Fn() -> f64> ParcelLookup for GovernedLookup<L, Now> {
    async fn lookup_point(
        &self,
        lon: f64,
        lat: f64,
    ) -> Result<Option<ParcelFeature>, LookupError> {
        let started = self.admit()?;
        let result = self.inner.lookup_point(lon, lat).await;
        self.settle(started, &result);
        result
    }

    async fn lookup_address(&self, query: &str) -> Result<Option<ParcelFeature>, LookupError> {
        let started = self.admit()?;
        let result = self.inner.lookup_address(query).await;
        self.settle(started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use futures::executor::block_on;
    use pilji_shared::{ParcelFeature, ParcelGeometry, ParcelId};

    use super::{GovernedLookup, LookupError, ParcelLookup};
    use crate::governor::{CallOutcome, GovernorLimit};

    struct StubLookup {
        response: Result<Option<ParcelFeature>, LookupError>,
    }

    impl ParcelLookup for StubLookup {
        async fn lookup_point(
            &self,
            _lon: f64,
            _lat: f64,
        ) -> Result<Option<ParcelFeature>, LookupError> {
            self.response.clone()
        }

        async fn lookup_address(
            &self,
            _query: &str,
        ) -> Result<Option<ParcelFeature>, LookupError> {
            self.response.clone()
        }
    }

    fn feature() -> ParcelFeature {
        ParcelFeature {
            id: ParcelId::from("1111012900103440001"),
            geometry: ParcelGeometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]]),
            properties: serde_json::json!({}),
        }
    }

    fn governed(
        response: Result<Option<ParcelFeature>, LookupError>,
        max_calls: u32,
        clock: Rc<Cell<f64>>,
    ) -> GovernedLookup<StubLookup, impl Fn() -> f64> {
        GovernedLookup::new(StubLookup { response }, "vworld", move || clock.get()).with_limit(
            GovernorLimit {
                max_calls,
                window_ms: 60_000.0,
            },
        )
    }

    #[test]
    fn denied_calls_surface_rate_limited_without_hitting_the_provider() {
        let clock = Rc::new(Cell::new(0.0));
        let lookup = governed(Ok(Some(feature())), 1, Rc::clone(&clock));

        assert!(
            block_on(lookup.lookup_point(126.97, 37.57))
                .expect("first call should pass")
                .is_some()
        );
        assert_eq!(
            block_on(lookup.lookup_point(126.97, 37.57)),
            Err(LookupError::RateLimited)
        );

        let outcomes: Vec<CallOutcome> =
            lookup.governor().recent().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![CallOutcome::Success, CallOutcome::RateLimited]);
    }

    #[test]
    fn outcomes_and_durations_are_recorded() {
        let clock = Rc::new(Cell::new(1_000.0));
        let lookup = governed(Ok(None), 10, Rc::clone(&clock));

        // Not-found is a clean outcome, not an error.
        assert!(
            block_on(lookup.lookup_address("종로구 사직동 344-1"))
                .expect("call should pass")
                .is_none()
        );
        let record = lookup
            .governor()
            .recent()
            .next()
            .cloned()
            .expect("a record should exist");
        assert_eq!(record.outcome, CallOutcome::NotFound);
        assert_eq!(record.provider, "vworld");
    }

    #[test]
    fn provider_errors_still_count_against_the_window() {
        let clock = Rc::new(Cell::new(0.0));
        let lookup = governed(
            Err(LookupError::Provider("upstream 500".to_string())),
            1,
            Rc::clone(&clock),
        );

        assert!(matches!(
            block_on(lookup.lookup_point(126.97, 37.57)),
            Err(LookupError::Provider(_))
        ));
        assert_eq!(
            block_on(lookup.lookup_point(126.97, 37.57)),
            Err(LookupError::RateLimited)
        );
    }
}
