use super::throttle::{pause, Pause, RetryPolicy, Throttle};
use crate::config::FetchConfig;
use crate::error::ScreenerError;
use crate::models::FetchOutcome;
use crate::Result;
use governor::{Quota, RateLimiter};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const REFERER_URL: &str = "https://gu.qq.com/";
const NO_MATCH_SYMBOL: &str = "pv_none_match";

// Positional fields of the tilde-delimited quote payload
pub(crate) const FIELD_NAME: usize = 1;
pub(crate) const FIELD_PRICE: usize = 3;
pub(crate) const FIELD_VOLUME: usize = 6;
pub(crate) const FIELD_CHANGE_PCT: usize = 32;
pub(crate) const FIELD_TURNOVER: usize = 37;
pub(crate) const FIELD_PE: usize = 39;
pub(crate) const FIELD_PB: usize = 46;
pub(crate) const FIELD_API_DIVIDEND_YIELD: usize = 52;
pub(crate) const FIELD_DIVIDEND_PER_SHARE: usize = 53;
pub(crate) const FIELD_TURNOVER_RATE: usize = 56;

type SourceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Exchange-prefixed symbol: codes starting with "6" trade in Shanghai,
/// everything else in Shenzhen.
pub fn market_symbol(code: &str) -> String {
    if code.starts_with('6') {
        format!("sh{}", code)
    } else {
        format!("sz{}", code)
    }
}

/// Shared access to the quote and k-line endpoints.
///
/// Cloning is cheap; all clones share the HTTP connection pool, the
/// throttle and the request-rate ceiling.
#[derive(Clone)]
pub struct TencentSource {
    client: Client,
    quote_base: String,
    kline_base: String,
    throttle: Arc<dyn Throttle>,
    rate_limiter: Arc<SourceRateLimiter>,
}

impl TencentSource {
    pub fn new(config: &FetchConfig, throttle: Arc<dyn Throttle>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let per_second = NonZeroU32::new(config.max_requests_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            quote_base: config.quote_base_url.trim_end_matches('/').to_string(),
            kline_base: config.kline_base_url.trim_end_matches('/').to_string(),
            throttle,
            rate_limiter,
        })
    }

    pub fn throttle(&self) -> &dyn Throttle {
        self.throttle.as_ref()
    }

    pub(crate) fn quote_url(&self, symbols: &str) -> String {
        format!("{}/q={}", self.quote_base, symbols)
    }

    pub(crate) fn kline_url(&self) -> String {
        format!("{}/appstock/app/fqkline/get", self.kline_base)
    }

    /// One rate-limited GET with a freshly rotated user agent
    pub(crate) async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<String> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .header(USER_AGENT, self.throttle.user_agent())
            .header(ACCEPT, "*/*")
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
            .header(REFERER, REFERER_URL)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScreenerError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Drive `op` under `policy`.
    ///
    /// `Ok(Some)` ends with `Fetched` and `Ok(None)` ends immediately with
    /// `Absent`. Transient errors are retried with exponential backoff
    /// until the attempt budget is spent; any other error fails at once.
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        label: &str,
        policy: RetryPolicy,
        mut op: F,
    ) -> FetchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for attempt in 0..policy.max_attempts {
            if attempt > 0 && policy.pre_request_delay {
                pause(self.throttle(), Pause::PreRequest).await;
            }

            match op().await {
                Ok(Some(value)) => {
                    if attempt > 0 {
                        tracing::info!(
                            "✓ Fetched {} after {} attempts",
                            label,
                            attempt + 1
                        );
                    }
                    return FetchOutcome::Fetched(value);
                }
                Ok(None) => {
                    tracing::debug!("{} has no usable data", label);
                    return FetchOutcome::Absent;
                }
                Err(e) if !e.is_transient() => {
                    tracing::error!("Not retrying {}: {}", label, e);
                    return FetchOutcome::Failed;
                }
                Err(e) => {
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt + 1,
                        policy.max_attempts,
                        label,
                        e
                    );
                    if attempt + 1 < policy.max_attempts {
                        pause(
                            self.throttle(),
                            Pause::Backoff {
                                attempt,
                                jitter_max: policy.jitter_max,
                            },
                        )
                        .await;
                    }
                }
            }
        }

        tracing::error!(
            "Giving up on {} after {} attempts",
            label,
            policy.max_attempts
        );
        FetchOutcome::Failed
    }
}

/// One `v_<symbol>="f0~f1~..."` entry of a quote response
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuoteEntry<'a> {
    pub symbol: &'a str,
    fields: Vec<&'a str>,
}

impl<'a> QuoteEntry<'a> {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_no_match(&self) -> bool {
        self.symbol == NO_MATCH_SYMBOL
    }

    /// Non-empty text field
    pub fn text(&self, index: usize) -> Option<&'a str> {
        self.fields
            .get(index)
            .map(|field| field.trim())
            .filter(|field| !field.is_empty())
    }

    /// Finite numeric field; blanks and garbage read as unknown
    pub fn number(&self, index: usize) -> Option<f64> {
        self.text(index)
            .and_then(|field| field.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }
}

/// Split a (possibly multi-symbol) quote response into entries
pub(crate) fn parse_quote_entries(body: &str) -> Vec<QuoteEntry<'_>> {
    body.split(';')
        .filter_map(|line| {
            let line = line.trim();
            let rest = &line[line.find("v_")? + 2..];
            let (symbol, payload) = rest.split_once('=')?;
            let start = payload.find('"')?;
            let end = payload.rfind('"')?;
            if end <= start {
                return None;
            }
            Some(QuoteEntry {
                symbol: symbol.trim(),
                fields: payload[start + 1..end].split('~').collect(),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Build a quote line with the given positional fields set
    pub fn quote_line(symbol: &str, fields: &[(usize, &str)]) -> String {
        let mut parts = vec![String::new(); 60];
        parts[0] = "1".to_string();
        parts[2] = symbol[2..].to_string();
        for (index, value) in fields {
            parts[*index] = value.to_string();
        }
        format!("v_{}=\"{}\";\n", symbol, parts.join("~"))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::quote_line;
    use super::*;
    use crate::api::throttle::NoDelay;

    fn local_source() -> TencentSource {
        TencentSource::new(&FetchConfig::default(), Arc::new(NoDelay)).unwrap()
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let source = local_source();
        let mut calls = 0;
        let outcome: FetchOutcome<u32> = source
            .with_retry("sh600000", RetryPolicy::QUOTE, || {
                calls += 1;
                async { Err(ScreenerError::Scoring("non-finite input".into())) }
            })
            .await;

        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_spends_budget_on_transient_error() {
        let source = local_source();
        let mut calls = 0;
        let outcome: FetchOutcome<u32> = source
            .with_retry("sh600000", RetryPolicy::FUNDAMENTALS, || {
                calls += 1;
                async { Err(ScreenerError::malformed("sh600000", "short payload")) }
            })
            .await;

        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_market_symbol() {
        assert_eq!(market_symbol("600519"), "sh600519");
        assert_eq!(market_symbol("688981"), "sh688981");
        assert_eq!(market_symbol("000001"), "sz000001");
        assert_eq!(market_symbol("300750"), "sz300750");
    }

    #[test]
    fn test_parse_single_entry() {
        let body = quote_line("sh600000", &[(FIELD_NAME, "PF Bank"), (FIELD_PRICE, "10.52")]);
        let entries = parse_quote_entries(&body);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].symbol, "sh600000");
        assert_eq!(entries[0].len(), 60);
        assert_eq!(entries[0].text(FIELD_NAME), Some("PF Bank"));
        assert_eq!(entries[0].number(FIELD_PRICE), Some(10.52));
        assert_eq!(entries[0].number(FIELD_PE), None);
    }

    #[test]
    fn test_parse_multiple_entries_and_noise() {
        let mut body = quote_line("sh600000", &[(FIELD_CHANGE_PCT, "1.2")]);
        body.push_str("garbage without marker;");
        body.push_str(&quote_line("sz000001", &[(FIELD_CHANGE_PCT, "-0.5")]));

        let entries = parse_quote_entries(&body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].symbol, "sz000001");
        assert_eq!(entries[1].number(FIELD_CHANGE_PCT), Some(-0.5));
    }

    #[test]
    fn test_no_match_entry() {
        let entries = parse_quote_entries("v_pv_none_match=\"1\";");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_no_match());
    }

    #[test]
    fn test_number_rejects_garbage() {
        let body = quote_line("sh600000", &[(FIELD_PE, "abc"), (FIELD_PB, "NaN")]);
        let entries = parse_quote_entries(&body);
        assert_eq!(entries[0].number(FIELD_PE), None);
        assert_eq!(entries[0].number(FIELD_PB), None);
    }
}
