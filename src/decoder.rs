// =============================================================================
// Message Decoder — classifies raw combined-stream messages
// =============================================================================
//
// The combined stream wraps every payload in an envelope:
//
//   { "stream": "btcusdt@aggTrade", "data": { ... } }
//
// Three stream tags are understood; anything else is an error the caller logs
// and drops.  Decoding is stateless and never touches shared state.

use serde_json::Value;

use crate::error::DecodeError;

/// One typed event extracted from a raw stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A single aggregated trade.  `buyer_is_maker == true` means the taker
    /// was selling; otherwise the taker was buying.
    Trade {
        price: f64,
        quantity: f64,
        buyer_is_maker: bool,
    },
    /// Mark price tick with the instantaneous funding rate as a fraction
    /// (e.g. 0.0001 == 0.01%).
    MarkPrice { mark_price: f64, funding_rate: f64 },
    /// Rolling 24h traded base volume.
    Ticker { volume_24h: f64 },
}

/// Decode one raw combined-stream message into a [`StreamEvent`].
///
/// Expected shapes:
/// ```json
/// { "stream": "btcusdt@aggTrade",      "data": { "p": "37000.0", "q": "0.5", "m": false } }
/// { "stream": "btcusdt@markPrice@1s",  "data": { "p": "37001.2", "r": "0.0001" } }
/// { "stream": "btcusdt@ticker",        "data": { "v": "123456.7" } }
/// ```
pub fn decode(text: &str) -> Result<StreamEvent, DecodeError> {
    let root: Value = serde_json::from_str(text)?;

    let stream = root["stream"]
        .as_str()
        .ok_or(DecodeError::MissingStreamTag)?;
    let data = &root["data"];

    if stream.ends_with("@aggTrade") {
        Ok(StreamEvent::Trade {
            price: str_number(data, "p")?,
            quantity: str_number(data, "q")?,
            buyer_is_maker: data["m"].as_bool().ok_or(DecodeError::MissingField("m"))?,
        })
    } else if stream.contains("@markPrice") {
        Ok(StreamEvent::MarkPrice {
            mark_price: str_number(data, "p")?,
            funding_rate: str_number(data, "r")?,
        })
    } else if stream.ends_with("@ticker") {
        // The ticker payload carries base volume as "v"; some payload
        // variants use "V" (taker buy volume) — prefer "v".
        let volume = str_number(data, "v").or_else(|_| str_number(data, "V"))?;
        Ok(StreamEvent::Ticker { volume_24h: volume })
    } else {
        Err(DecodeError::UnknownStream(stream.to_string()))
    }
}

/// Extract a decimal-string field (the venue sends numbers as strings).
fn str_number(data: &Value, field: &'static str) -> Result<f64, DecodeError> {
    let raw = data[field]
        .as_str()
        .ok_or(DecodeError::MissingField(field))?;
    raw.parse().map_err(|_| DecodeError::BadNumber {
        field,
        value: raw.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_agg_trade_taker_buy() {
        let raw = r#"{"stream":"btcusdt@aggTrade","data":{"p":"100.0","q":"2.0","m":false}}"#;
        let event = decode(raw).unwrap();
        assert_eq!(
            event,
            StreamEvent::Trade {
                price: 100.0,
                quantity: 2.0,
                buyer_is_maker: false
            }
        );
    }

    #[test]
    fn decode_agg_trade_taker_sell() {
        let raw = r#"{"stream":"ethusdt@aggTrade","data":{"p":"50.5","q":"1.0","m":true}}"#;
        match decode(raw).unwrap() {
            StreamEvent::Trade { buyer_is_maker, .. } => assert!(buyer_is_maker),
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn decode_mark_price() {
        let raw = r#"{"stream":"btcusdt@markPrice@1s","data":{"p":"37001.25","r":"0.0001"}}"#;
        assert_eq!(
            decode(raw).unwrap(),
            StreamEvent::MarkPrice {
                mark_price: 37001.25,
                funding_rate: 0.0001
            }
        );
    }

    #[test]
    fn decode_ticker_prefers_lowercase_v() {
        let raw = r#"{"stream":"btcusdt@ticker","data":{"v":"123.5","V":"60.0"}}"#;
        assert_eq!(
            decode(raw).unwrap(),
            StreamEvent::Ticker { volume_24h: 123.5 }
        );
    }

    #[test]
    fn decode_ticker_falls_back_to_uppercase_v() {
        let raw = r#"{"stream":"btcusdt@ticker","data":{"V":"60.0"}}"#;
        assert_eq!(
            decode(raw).unwrap(),
            StreamEvent::Ticker { volume_24h: 60.0 }
        );
    }

    #[test]
    fn unknown_stream_is_typed_error() {
        let raw = r#"{"stream":"btcusdt@depth","data":{}}"#;
        assert!(matches!(decode(raw), Err(DecodeError::UnknownStream(_))));
    }

    #[test]
    fn garbage_is_invalid_json() {
        assert!(matches!(decode("not json"), Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn missing_field_is_reported() {
        let raw = r#"{"stream":"btcusdt@aggTrade","data":{"p":"100.0","m":false}}"#;
        assert!(matches!(decode(raw), Err(DecodeError::MissingField("q"))));
    }

    #[test]
    fn non_numeric_price_is_reported() {
        let raw = r#"{"stream":"btcusdt@aggTrade","data":{"p":"abc","q":"1","m":false}}"#;
        assert!(matches!(
            decode(raw),
            Err(DecodeError::BadNumber { field: "p", .. })
        ));
    }
}
