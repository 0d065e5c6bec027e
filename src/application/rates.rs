use crate::domain::chain::{ChainId, TokenSymbol};
use crate::domain::corridor::PayoutCorridorRegistry;
use crate::domain::ports::RateFeedRef;
use crate::domain::rate::RateQuote;
use crate::error::{RampError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Default)]
struct RateCache {
    /// Bumped every time a refresh starts; a completion only lands if its
    /// generation is still the latest.
    generation: u64,
    selected: Option<String>,
    quote: Option<RateQuote>,
    usd_prices: HashMap<TokenSymbol, Decimal>,
}

/// Fetches and caches the fiat rate of the active corridor and crypto spot
/// prices.
///
/// A failed refresh clears the cached quote: callers see `RateUnavailable`
/// rather than a stale or zero rate.
pub struct RateOracleClient {
    feed: RateFeedRef,
    corridors: Arc<PayoutCorridorRegistry>,
    cache: Mutex<RateCache>,
}

impl RateOracleClient {
    pub fn new(feed: RateFeedRef, corridors: Arc<PayoutCorridorRegistry>) -> Self {
        Self {
            feed,
            corridors,
            cache: Mutex::new(RateCache::default()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, RateCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One feed request for `corridor`, translated to the feed's code.
    pub async fn fetch_fiat_rate(&self, corridor: &str) -> Result<RateQuote> {
        let api_code = self.corridors.api_code_for(corridor);
        let value = self.feed.fiat_per_usd(&api_code).await.map_err(|err| {
            warn!(corridor, api_code = %api_code, error = %err, "Fiat rate fetch failed");
            RampError::RateUnavailable(corridor.to_string())
        })?;
        if value <= Decimal::ZERO {
            warn!(corridor, api_code = %api_code, %value, "Feed returned a non-positive rate");
            return Err(RampError::RateUnavailable(corridor.to_string()));
        }
        Ok(RateQuote::new(corridor, value))
    }

    /// US dollar price of `token`. Pegged tokens are worth exactly one dollar
    /// and never hit the feed.
    pub async fn fetch_crypto_usd_price(&self, token: TokenSymbol) -> Result<Decimal> {
        let Some(asset_id) = token.price_feed_id() else {
            return Ok(Decimal::ONE);
        };
        let price = self.feed.usd_price(asset_id).await.map_err(|err| {
            warn!(%token, asset_id, error = %err, "Crypto price fetch failed");
            RampError::RateUnavailable(token.to_string())
        })?;
        if price <= Decimal::ZERO {
            return Err(RampError::RateUnavailable(token.to_string()));
        }
        self.cache().usd_prices.insert(token, price);
        Ok(price)
    }

    /// Cached price when available, otherwise a fresh fetch.
    pub async fn crypto_usd_price(&self, token: TokenSymbol) -> Result<Decimal> {
        if token.price_feed_id().is_none() {
            return Ok(Decimal::ONE);
        }
        let cached = self.cache().usd_prices.get(&token).copied();
        match cached {
            Some(price) => Ok(price),
            None => self.fetch_crypto_usd_price(token).await,
        }
    }

    pub async fn gas_price_wei(&self, chain_id: ChainId) -> Result<u128> {
        self.feed.gas_price_wei(chain_id).await.map_err(|err| {
            warn!(%chain_id, error = %err, "Gas price fetch failed");
            RampError::RateUnavailable(format!("gas on chain {chain_id}"))
        })
    }

    /// Makes `corridor` the selected one and refreshes its quote.
    ///
    /// Returns `Ok(None)` when another refresh was started while this one was
    /// in flight; its result is discarded so the latest selection wins.
    pub async fn refresh(&self, corridor: &str) -> Result<Option<RateQuote>> {
        let generation = {
            let mut cache = self.cache();
            cache.generation += 1;
            if cache.selected.as_deref() != Some(corridor) {
                cache.quote = None;
            }
            cache.selected = Some(corridor.to_string());
            cache.generation
        };

        let result = self.fetch_fiat_rate(corridor).await;

        let mut cache = self.cache();
        if cache.generation != generation {
            debug!(corridor, "Discarding superseded rate result");
            return Ok(None);
        }
        match result {
            Ok(quote) => {
                debug!(corridor, rate = %quote.fiat_per_usd, "Rate refreshed");
                cache.quote = Some(quote.clone());
                Ok(Some(quote))
            }
            Err(err) => {
                cache.quote = None;
                Err(err)
            }
        }
    }

    /// Latest quote for `corridor`, if it is the selected corridor and its
    /// last refresh succeeded.
    pub fn current_quote(&self, corridor: &str) -> Result<RateQuote> {
        self.cache()
            .quote
            .as_ref()
            .filter(|quote| quote.corridor == corridor)
            .cloned()
            .ok_or_else(|| RampError::RateUnavailable(corridor.to_string()))
    }

    /// Cached quote, otherwise a fresh fetch.
    ///
    /// The fetched quote is returned even if a refresh started meanwhile; it
    /// is only cached when no refresh started and `corridor` is selected.
    pub async fn quote_for(&self, corridor: &str) -> Result<RateQuote> {
        if let Ok(quote) = self.current_quote(corridor) {
            return Ok(quote);
        }
        let generation = self.cache().generation;
        let quote = self.fetch_fiat_rate(corridor).await?;

        let mut cache = self.cache();
        let selected = cache
            .selected
            .as_deref()
            .is_none_or(|selected| selected == corridor);
        if cache.generation == generation && selected {
            cache.selected = Some(corridor.to_string());
            cache.quote = Some(quote.clone());
        }
        Ok(quote)
    }

    pub fn selected_corridor(&self) -> Option<String> {
        self.cache().selected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::StaticRateFeed;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn client(feed: StaticRateFeed) -> RateOracleClient {
        RateOracleClient::new(
            Arc::new(feed),
            Arc::new(PayoutCorridorRegistry::builtin()),
        )
    }

    #[tokio::test]
    async fn test_feed_is_queried_with_api_code() {
        let feed = StaticRateFeed::new().with_rate("KES", dec!(129.25));
        let rates = client(feed.clone());

        let quote = rates.refresh("KSH").await.unwrap().unwrap();
        assert_eq!(quote.corridor, "KSH");
        assert_eq!(quote.fiat_per_usd, dec!(129.25));
        assert_eq!(feed.fiat_requests(), ["KES"]);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_quote() {
        let feed = StaticRateFeed::new().with_rate("UGX", dec!(3850));
        let rates = client(feed.clone());

        rates.refresh("UGX").await.unwrap();
        assert!(rates.current_quote("UGX").is_ok());

        feed.remove_rate("UGX");
        let err = rates.refresh("UGX").await.unwrap_err();
        assert!(matches!(err, RampError::RateUnavailable(ref code) if code == "UGX"));
        assert!(matches!(
            rates.current_quote("UGX"),
            Err(RampError::RateUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_rate_is_not_a_quote() {
        let rates = client(StaticRateFeed::new().with_rate("RWF", Decimal::ZERO));
        assert!(rates.refresh("RWF").await.is_err());
        assert!(rates.current_quote("RWF").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stale_refresh_does_not_overwrite_newer() {
        let feed = StaticRateFeed::new()
            .with_rate("UGX", dec!(3850))
            .with_rate("KES", dec!(129))
            .with_delay("UGX", Duration::from_secs(3))
            .with_delay("KES", Duration::from_secs(1));
        let rates = client(feed);

        let (stale, fresh) = tokio::join!(rates.refresh("UGX"), rates.refresh("KSH"));

        assert!(stale.unwrap().is_none());
        assert_eq!(fresh.unwrap().unwrap().corridor, "KSH");
        let current = rates.current_quote("KSH").unwrap();
        assert_eq!(current.fiat_per_usd, dec!(129));
        assert!(rates.current_quote("UGX").is_err());
    }

    #[tokio::test]
    async fn test_pegged_tokens_skip_the_feed() {
        let feed = StaticRateFeed::new().with_usd_price("ethereum", dec!(3452.78));
        let rates = client(feed.clone());

        assert_eq!(rates.crypto_usd_price(TokenSymbol::Usdc).await.unwrap(), Decimal::ONE);
        assert_eq!(
            rates.crypto_usd_price(TokenSymbol::Eth).await.unwrap(),
            dec!(3452.78)
        );
        // Second read is served from cache.
        rates.crypto_usd_price(TokenSymbol::Eth).await.unwrap();
        assert_eq!(feed.price_requests(), ["ethereum"]);
        assert!(rates.crypto_usd_price(TokenSymbol::Flr).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_for_survives_concurrent_refresh() {
        let feed = StaticRateFeed::new()
            .with_rate("UGX", dec!(3850))
            .with_delay("UGX", Duration::from_secs(1));
        let rates = client(feed.clone());

        let (background, quote) = tokio::join!(rates.refresh("UGX"), rates.quote_for("UGX"));

        assert!(background.unwrap().is_some());
        assert_eq!(quote.unwrap().fiat_per_usd, dec!(3850));
        assert!(rates.current_quote("UGX").is_ok());

        // Served from cache now.
        rates.quote_for("UGX").await.unwrap();
        assert_eq!(feed.fiat_requests().len(), 2);
    }
}
