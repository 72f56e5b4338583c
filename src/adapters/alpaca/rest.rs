//! Alpaca REST client.
//!
//! Every request goes through [`AlpacaRest::send_with_retry`]: statuses in
//! the configured retry list, timeouts and connection failures are retried
//! with exponential backoff; anything else is final. Order submissions keep
//! their `client_order_id` across retries, so a retry after a lost response
//! finds the original order instead of placing a second one.

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use super::types::{
    Account, ApiErrorBody, BarsResponse, OrderRequest, OrderResponse, StopLossLeg,
};
use super::{AlpacaCredentials, AlpacaEndpoints};
use crate::domain::bar::Bar;
use crate::domain::config_validation::ExecutionSettings;
use crate::domain::error::RevtraderError;
use crate::domain::order::{Fill, OrderSide, TradeIntent};
use crate::ports::bar_source::{BarRequest, BarSource};
use crate::ports::execution_port::ExecutionPort;

/// Largest page the bars endpoint serves.
const MAX_PAGE: usize = 10_000;
const FILL_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct AlpacaRest {
    client: Client,
    endpoints: AlpacaEndpoints,
    settings: ExecutionSettings,
    fill_timeout: Duration,
}

impl AlpacaRest {
    pub fn new(
        credentials: &AlpacaCredentials,
        endpoints: AlpacaEndpoints,
        settings: ExecutionSettings,
    ) -> Result<Self, RevtraderError> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", header_value(&credentials.key_id)?);
        headers.insert("APCA-API-SECRET-KEY", header_value(&credentials.secret_key)?);

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RevtraderError::Transport {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(AlpacaRest {
            client,
            endpoints,
            settings,
            fill_timeout: Duration::from_secs(30),
        })
    }

    /// How long `execute` polls a submitted order for its fill.
    pub fn with_fill_timeout(mut self, fill_timeout: Duration) -> Self {
        self.fill_timeout = fill_timeout;
        self
    }

    pub fn account(&self) -> Result<Account, RevtraderError> {
        let url = format!("{}/v2/account", self.endpoints.trading_url);
        let resp = self.send_with_retry("account", || self.client.get(&url))?;
        let resp = into_success(resp)?;
        parse_json(resp)
    }

    pub fn open_orders(&self) -> Result<Vec<OrderResponse>, RevtraderError> {
        let url = format!("{}/v2/orders", self.endpoints.trading_url);
        let resp = self.send_with_retry("open orders", || {
            self.client.get(&url).query(&[("status", "open")])
        })?;
        parse_json(into_success(resp)?)
    }

    pub fn order_by_client_id(&self, client_order_id: &str) -> Result<Option<OrderResponse>, RevtraderError> {
        let url = format!("{}/v2/orders:by_client_order_id", self.endpoints.trading_url);
        let resp = self.send_with_retry("order lookup", || {
            self.client
                .get(&url)
                .query(&[("client_order_id", client_order_id)])
        })?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(into_success(resp)?).map(Some)
    }

    fn cancel_order(&self, order_id: &str) -> Result<(), RevtraderError> {
        let url = format!("{}/v2/orders/{}", self.endpoints.trading_url, order_id);
        let resp = self.send_with_retry("cancel", || self.client.delete(&url))?;
        into_success(resp).map(|_| ())
    }

    fn submit(&self, intent: &TradeIntent) -> Result<OrderResponse, RevtraderError> {
        let url = format!("{}/v2/orders", self.endpoints.trading_url);
        let body = order_request(intent);
        let mut last_error = String::new();

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.settings.backoff, attempt);
                debug!(attempt, ?delay, client_order_id = %body.client_order_id, "retrying order");
                thread::sleep(delay);
            }

            match self.client.post(&url).json(&body).send() {
                Ok(resp) if resp.status().is_success() => return parse_json(resp),
                Ok(resp) if self.is_retryable(resp.status()) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(attempt, status = %resp.status(), "order submit refused, will retry");
                }
                Ok(resp) if attempt > 0 && resp.status() == StatusCode::UNPROCESSABLE_ENTITY => {
                    // an earlier attempt may have landed after all
                    if let Some(order) = self.order_by_client_id(&body.client_order_id)? {
                        info!(client_order_id = %body.client_order_id, "found order from earlier attempt");
                        return Ok(order);
                    }
                    return Err(rejection(resp));
                }
                Ok(resp) => return Err(rejection(resp)),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = e.to_string();
                    warn!(attempt, error = %e, "order submit failed, will retry");
                }
                Err(e) => {
                    return Err(RevtraderError::Transport {
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(RevtraderError::DispatchFailed {
            attempts: self.settings.max_retries + 1,
            reason: last_error,
        })
    }

    /// Polls until the order fills, dies, or `fill_timeout` passes. A
    /// timed-out order is cancelled and then looked up again, so a fill that
    /// raced the cancel is still reported as a fill.
    fn await_fill(&self, submitted: OrderResponse) -> Result<OrderResponse, RevtraderError> {
        let client_order_id = submitted.client_order_id.clone();
        let deadline = Instant::now() + self.fill_timeout;
        let mut order = submitted;

        loop {
            if order.is_filled() {
                return Ok(order);
            }
            if order.is_dead() {
                return settle(order);
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(FILL_POLL_INTERVAL);
            match self.order_by_client_id(&client_order_id) {
                Ok(Some(latest)) => order = latest,
                Ok(None) => warn!(%client_order_id, "submitted order not visible yet"),
                Err(e) => warn!(%client_order_id, error = %e, "fill poll failed"),
            }
        }

        warn!(%client_order_id, status = %order.status, "fill timed out, cancelling");
        if let Err(e) = self.cancel_order(&order.id) {
            warn!(%client_order_id, error = %e, "cancel failed");
        }
        self.final_state(&client_order_id)
    }

    /// Looks the order up until it is filled or dead. Gives up with
    /// `Unreconciled` after `max_retries + 1` lookups.
    fn final_state(&self, client_order_id: &str) -> Result<OrderResponse, RevtraderError> {
        let mut last = String::from("no lookup made");
        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                thread::sleep(FILL_POLL_INTERVAL);
            }
            match self.order_by_client_id(client_order_id) {
                Ok(Some(order)) if order.is_filled() => return Ok(order),
                Ok(Some(order)) if order.is_dead() => return settle(order),
                Ok(Some(order)) => last = format!("still {}", order.status),
                Ok(None) => last = "order not found".to_string(),
                Err(e) => last = e.to_string(),
            }
            debug!(client_order_id, attempt, state = %last, "order not settled");
        }
        Err(RevtraderError::Unreconciled {
            client_order_id: client_order_id.to_string(),
            reason: last,
        })
    }

    fn is_retryable(&self, status: StatusCode) -> bool {
        self.settings.retry_codes.contains(&status.as_u16())
    }

    fn send_with_retry<F>(&self, what: &str, build: F) -> Result<Response, RevtraderError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                thread::sleep(backoff_delay(self.settings.backoff, attempt));
            }

            match build().send() {
                Ok(resp) if self.is_retryable(resp.status()) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(what, attempt, status = %resp.status(), "request refused, will retry");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = e.to_string();
                    warn!(what, attempt, error = %e, "request failed, will retry");
                }
                Err(e) => {
                    return Err(RevtraderError::Transport {
                        reason: format!("{what}: {e}"),
                    });
                }
            }
        }

        Err(RevtraderError::Transport {
            reason: format!(
                "{what}: gave up after {} attempts: {last_error}",
                self.settings.max_retries + 1
            ),
        })
    }
}

impl BarSource for AlpacaRest {
    fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, RevtraderError> {
        let url = format!("{}/v2/stocks/{}/bars", self.endpoints.data_url, request.symbol);
        let start = request.start.to_rfc3339();
        let end = request.end.to_rfc3339();
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_limit = (request.limit - bars.len()).min(MAX_PAGE).to_string();
            let resp = self.send_with_retry("bars", || {
                let mut req = self.client.get(&url).query(&[
                    ("start", start.as_str()),
                    ("end", end.as_str()),
                    ("timeframe", request.timeframe.as_str()),
                    ("limit", page_limit.as_str()),
                ]);
                if let Some(token) = &page_token {
                    req = req.query(&[("page_token", token.as_str())]);
                }
                req
            })?;
            let page: BarsResponse = parse_json(into_success(resp)?)?;

            bars.extend(
                page.bars
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| Bar::with_open(b.t, b.o, b.c)),
            );

            match page.next_page_token {
                Some(token) if bars.len() < request.limit => page_token = Some(token),
                _ => break,
            }
        }

        debug!(symbol = %request.symbol, bars = bars.len(), "fetched bars");
        if bars.is_empty() {
            return Err(RevtraderError::NoData {
                symbol: request.symbol.clone(),
            });
        }
        bars.truncate(request.limit);
        Ok(bars)
    }
}

impl ExecutionPort for AlpacaRest {
    fn execute(&mut self, intent: &TradeIntent) -> Result<Fill, RevtraderError> {
        let submitted = self.submit(intent)?;
        info!(
            client_order_id = %submitted.client_order_id,
            status = %submitted.status,
            "order accepted"
        );
        let filled = self.await_fill(submitted)?;
        fill_from_order(&filled, intent)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RevtraderError> {
    HeaderValue::from_str(value).map_err(|_| RevtraderError::ConfigInvalid {
        section: "alpaca".to_string(),
        key: "key_id".to_string(),
        reason: "credentials contain characters not allowed in a header".to_string(),
    })
}

pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

pub fn order_request(intent: &TradeIntent) -> OrderRequest {
    let order = &intent.order;
    let stop_loss = order.stop_price.map(|p| StopLossLeg {
        stop_price: format!("{p:.2}"),
    });
    OrderRequest {
        symbol: order.symbol.clone(),
        qty: order.quantity.to_string(),
        side: order.side.as_str().to_string(),
        order_type: "market".to_string(),
        time_in_force: order.time_in_force.as_str().to_string(),
        client_order_id: order.client_order_id.clone(),
        order_class: stop_loss.as_ref().map(|_| "oto".to_string()),
        stop_loss,
    }
}

pub fn fill_from_order(order: &OrderResponse, intent: &TradeIntent) -> Result<Fill, RevtraderError> {
    let price = order
        .filled_avg_price
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .ok_or_else(|| RevtraderError::Unreconciled {
            client_order_id: order.client_order_id.clone(),
            reason: "filled without a price".to_string(),
        })?;
    let quantity = match order.filled_quantity().round() as u32 {
        0 => intent.order.quantity,
        q => q,
    };
    let side = OrderSide::parse(&order.side).ok_or_else(|| RevtraderError::Unreconciled {
        client_order_id: order.client_order_id.clone(),
        reason: format!("filled with unknown side {:?}", order.side),
    })?;

    Ok(Fill {
        client_order_id: order.client_order_id.clone(),
        side,
        quantity,
        price,
        timestamp: order.filled_at.unwrap_or_else(Utc::now),
    })
}

/// A dead order still counts as filled for whatever quantity filled
/// before it died.
fn settle(order: OrderResponse) -> Result<OrderResponse, RevtraderError> {
    if order.filled_quantity() > 0.0 {
        warn!(
            client_order_id = %order.client_order_id,
            status = %order.status,
            filled = order.filled_quantity(),
            "order ended partially filled"
        );
        return Ok(order);
    }
    Err(RevtraderError::ExecutionRejected {
        reason: format!(
            "order {} ended as {} with nothing filled",
            order.client_order_id, order.status
        ),
    })
}

fn rejection(resp: Response) -> RevtraderError {
    let status = resp.status();
    let message = resp
        .json::<ApiErrorBody>()
        .map(|b| b.message)
        .unwrap_or_else(|_| "no error body".to_string());
    RevtraderError::ExecutionRejected {
        reason: format!("HTTP {status}: {message}"),
    }
}

fn into_success(resp: Response) -> Result<Response, RevtraderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .json::<ApiErrorBody>()
        .map(|b| b.message)
        .unwrap_or_else(|_| "no error body".to_string());
    Err(RevtraderError::Transport {
        reason: format!("HTTP {status}: {message}"),
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, RevtraderError> {
    resp.json()
        .map_err(|e| RevtraderError::malformed(format!("unexpected response body: {e}")))
}
