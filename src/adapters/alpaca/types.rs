//! Alpaca wire types.
//!
//! Monetary fields arrive as decimal strings and are kept that way until
//! converted at the adapter boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /v2/stocks/{symbol}/bars`
#[derive(Debug, Clone, Deserialize)]
pub struct BarsResponse {
    /// `null` when the range holds no bars.
    #[serde(default)]
    pub bars: Option<Vec<RestBar>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestBar {
    pub t: DateTime<Utc>,
    pub o: f64,
    pub c: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopLossLeg {
    pub stop_price: String,
}

/// `POST /v2/orders`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    pub client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLossLeg>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OrderResponse {
    pub id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: String,
    pub status: String,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub filled_qty: Option<String>,
    #[serde(default)]
    pub filled_avg_price: Option<String>,
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl OrderResponse {
    pub fn is_filled(&self) -> bool {
        self.status == "filled"
    }

    /// Shares filled so far; zero when absent or unreadable.
    pub fn filled_quantity(&self) -> f64 {
        self.filled_qty
            .as_deref()
            .and_then(|q| q.parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// No further fills can arrive.
    pub fn is_dead(&self) -> bool {
        matches!(
            self.status.as_str(),
            "canceled" | "expired" | "rejected" | "suspended" | "stopped" | "done_for_day"
        )
    }
}

/// `GET /v2/account`
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub currency: Option<String>,
    pub cash: String,
    pub equity: String,
    pub buying_power: String,
    #[serde(default)]
    pub portfolio_value: Option<String>,
}

/// Error body returned with non-2xx REST responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

/// Client-to-server websocket messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    Auth { key: String, secret: String },
    Subscribe { bars: Vec<String> },
}

/// One element of a server websocket frame. Frames are JSON arrays.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "T")]
pub enum StreamMessage {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error { code: i64, msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },
    #[serde(rename = "b")]
    Bar(StreamBar),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamBar {
    #[serde(rename = "S")]
    pub symbol: String,
    pub o: f64,
    pub c: f64,
    pub t: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bars_response_parses_and_ignores_extra_fields() {
        let json = r#"{
            "bars": [
                {"t":"2021-06-01T13:30:00Z","o":125.08,"h":125.35,"l":124.9,"c":125.1,"v":210371,"n":1200,"vw":125.1},
                {"t":"2021-06-01T13:31:00Z","o":125.1,"h":125.2,"l":125.0,"c":125.19,"v":91000}
            ],
            "symbol": "AAPL",
            "next_page_token": "QUFQTHxN"
        }"#;
        let resp: BarsResponse = serde_json::from_str(json).unwrap();
        let bars = resp.bars.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].t, Utc.with_ymd_and_hms(2021, 6, 1, 13, 30, 0).unwrap());
        assert_eq!(bars[1].c, 125.19);
        assert_eq!(resp.next_page_token.as_deref(), Some("QUFQTHxN"));
    }

    #[test]
    fn empty_bars_response() {
        let resp: BarsResponse =
            serde_json::from_str(r#"{"bars":null,"symbol":"AAPL","next_page_token":null}"#).unwrap();
        assert!(resp.bars.is_none());
        assert!(resp.next_page_token.is_none());
    }

    #[test]
    fn oto_order_request_shape() {
        let req = OrderRequest {
            symbol: "AAPL".into(),
            qty: "500".into(),
            side: "buy".into(),
            order_type: "market".into(),
            time_in_force: "gtc".into(),
            client_order_id: "rev-AAPL-1".into(),
            order_class: Some("oto".into()),
            stop_loss: Some(StopLossLeg {
                stop_price: "94.05".into(),
            }),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], "market");
        assert_eq!(v["order_class"], "oto");
        assert_eq!(v["stop_loss"]["stop_price"], "94.05");
    }

    #[test]
    fn plain_order_omits_oto_fields() {
        let req = OrderRequest {
            symbol: "AAPL".into(),
            qty: "500".into(),
            side: "sell".into(),
            order_type: "market".into(),
            time_in_force: "day".into(),
            client_order_id: "rev-AAPL-2".into(),
            order_class: None,
            stop_loss: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("order_class").is_none());
        assert!(v.get("stop_loss").is_none());
    }

    #[test]
    fn order_response_states() {
        let json = r#"{
            "id": "61e69015-8549-4bfd-b9c3-01e75843f47d",
            "client_order_id": "rev-AAPL-1",
            "symbol": "AAPL",
            "side": "buy",
            "status": "filled",
            "qty": "500",
            "filled_qty": "500",
            "filled_avg_price": "125.12",
            "filled_at": "2021-06-01T13:31:02.123Z",
            "submitted_at": "2021-06-01T13:31:01Z",
            "order_class": ""
        }"#;
        let order: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(order.is_filled());
        assert!(!order.is_dead());
        assert_eq!(order.filled_avg_price.as_deref(), Some("125.12"));
        assert_eq!(order.filled_quantity(), 500.0);
    }

    #[test]
    fn filled_quantity_defaults_to_zero() {
        let json = r#"{"id":"x","client_order_id":"c","symbol":"AAPL","side":"buy",
            "status":"canceled","filled_qty":null}"#;
        let order: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(order.is_dead());
        assert_eq!(order.filled_quantity(), 0.0);
    }

    #[test]
    fn control_messages_serialize_with_action_tag() {
        let auth = ControlMessage::Auth {
            key: "k".into(),
            secret: "s".into(),
        };
        assert_eq!(
            serde_json::to_string(&auth).unwrap(),
            r#"{"action":"auth","key":"k","secret":"s"}"#
        );
        let sub = ControlMessage::Subscribe {
            bars: vec!["AAPL".into()],
        };
        assert_eq!(
            serde_json::to_string(&sub).unwrap(),
            r#"{"action":"subscribe","bars":["AAPL"]}"#
        );
    }

    #[test]
    fn stream_frame_variants() {
        let frame = r#"[
            {"T":"success","msg":"authenticated"},
            {"T":"subscription","trades":[],"quotes":[],"bars":["AAPL"]},
            {"T":"b","S":"AAPL","o":125.0,"h":125.5,"l":124.8,"c":125.2,"v":1000,"t":"2021-06-01T13:31:00Z"},
            {"T":"q","S":"AAPL","bp":125.1},
            {"T":"error","code":402,"msg":"auth failed"}
        ]"#;
        let msgs: Vec<StreamMessage> = serde_json::from_str(frame).unwrap();
        assert_eq!(
            msgs[0],
            StreamMessage::Success {
                msg: "authenticated".into()
            }
        );
        assert_eq!(
            msgs[1],
            StreamMessage::Subscription {
                bars: vec!["AAPL".into()]
            }
        );
        match &msgs[2] {
            StreamMessage::Bar(bar) => {
                assert_eq!(bar.symbol, "AAPL");
                assert_eq!(bar.c, 125.2);
            }
            other => panic!("expected bar, got {other:?}"),
        }
        assert_eq!(msgs[3], StreamMessage::Other);
        assert!(matches!(msgs[4], StreamMessage::Error { code: 402, .. }));
    }
}
