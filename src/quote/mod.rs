//! Bridge route quoting and ranking

use crate::backend::QuoteService;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{QuoteRequest, Route};

use ethers::types::U256;
use std::sync::Arc;
use tracing::{debug, warn};

/// Requests and ranks bridge routes.
///
/// An empty route list is a valid answer (no liquidity for the pair) and is
/// returned as `Ok(vec![])`. Transport failures are errors, and so is a
/// non-empty answer in which no route parses.
pub struct QuoteRouter {
    service: Arc<dyn QuoteService>,
}

impl QuoteRouter {
    pub fn new(service: Arc<dyn QuoteService>) -> Self {
        Self { service }
    }

    /// Routes for the request, best first
    pub async fn get_routes(&self, request: &QuoteRequest) -> BridgeResult<Vec<Route>> {
        let quote = self.service.quote(request).await?;
        let received = quote.routes.len();
        let routes = rank_routes(quote.routes);

        debug!(
            chain_from = request.chain_from,
            chain_to = request.chain_to,
            received,
            usable = routes.len(),
            "Quote received"
        );

        if received > 0 && routes.is_empty() {
            return Err(BridgeError::QuoteServiceError(format!(
                "no parseable routes among {} returned",
                received
            )));
        }

        Ok(routes)
    }

    pub async fn best_route(&self, request: &QuoteRequest) -> BridgeResult<Option<Route>> {
        Ok(self.get_routes(request).await?.into_iter().next())
    }
}

/// Sort by estimated output (desc), then fee (asc), then hop count (asc).
/// Routes with unparseable amounts are dropped.
pub fn rank_routes(routes: Vec<Route>) -> Vec<Route> {
    let mut scored: Vec<(U256, U256, Route)> = routes
        .into_iter()
        .filter_map(|route| match (route.estimated_output_units(), route.fee_units()) {
            (Some(output), Some(fee)) => Some((output, fee, route)),
            _ => {
                warn!(
                    "Dropping route {} with unparseable amounts (output={:?}, fee={:?})",
                    route.id, route.estimated_output, route.fee
                );
                None
            }
        })
        .collect();

    scored.sort_by(|(out_a, fee_a, a), (out_b, fee_b, b)| {
        out_b
            .cmp(out_a)
            .then_with(|| fee_a.cmp(fee_b))
            .then_with(|| a.path.len().cmp(&b.path.len()))
    });

    scored.into_iter().map(|(_, _, route)| route).collect()
}
