//! Picks the display/charge currency for a request.
//!
//! Precedence: session claim, `currency` cookie, `X-Currency` header, IP
//! geolocation, configured default. A value the exchange table cannot
//! convert into is skipped.

use std::{convert::Infallible, net::{IpAddr, SocketAddr}};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    currency::{Currency, ExchangeRates},
    integrations::geoip::is_public_ip,
    middleware::auth::{bearer_token, decode_claims},
    state::AppState,
};

pub const CURRENCY_COOKIE: &str = "currency";
pub const CURRENCY_HEADER: &str = "x-currency";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CurrencySource {
    Session,
    Cookie,
    Header,
    Geolocation,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DetectedCurrency {
    pub currency: Currency,
    pub source: CurrencySource,
}

/// Raw hints found on the request, before validation.
#[derive(Debug, Default)]
pub struct CurrencyHints<'a> {
    pub session: Option<&'a str>,
    pub cookie: Option<&'a str>,
    pub header: Option<&'a str>,
}

fn usable(raw: Option<&str>, rates: &ExchangeRates) -> Option<Currency> {
    raw.and_then(Currency::parse).filter(|c| rates.supports(*c))
}

/// First usable explicit hint, in precedence order.
pub fn pick_from_hints(hints: &CurrencyHints<'_>, rates: &ExchangeRates) -> Option<DetectedCurrency> {
    [
        (hints.session, CurrencySource::Session),
        (hints.cookie, CurrencySource::Cookie),
        (hints.header, CurrencySource::Header),
    ]
    .into_iter()
    .find_map(|(raw, source)| usable(raw, rates).map(|currency| DetectedCurrency { currency, source }))
}

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

/// Client address from proxy headers, falling back to the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    };
    forwarded.or_else(real_ip).or(peer.map(|addr| addr.ip()))
}

fn session_currency(headers: &HeaderMap, state: &AppState) -> Option<String> {
    let token = bearer_token(headers).ok().flatten()?;
    decode_claims(&state.config.jwt.secret, token).ok()?.currency
}

pub async fn detect(headers: &HeaderMap, peer: Option<SocketAddr>, state: &AppState) -> DetectedCurrency {
    let rates = &state.config.currency.rates;
    let session = session_currency(headers, state);
    let hints = CurrencyHints {
        session: session.as_deref(),
        cookie: cookie_value(headers, CURRENCY_COOKIE),
        header: headers.get(CURRENCY_HEADER).and_then(|v| v.to_str().ok()),
    };
    if let Some(found) = pick_from_hints(&hints, rates) {
        return found;
    }

    if let Some(ip) = client_ip(headers, peer).filter(is_public_ip) {
        match state.geo.country_for_ip(ip).await {
            Ok(Some(country)) => {
                let currency = Currency::for_country(&country);
                if rates.supports(currency) {
                    return DetectedCurrency {
                        currency,
                        source: CurrencySource::Geolocation,
                    };
                }
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(%ip, error = %err, "currency geolocation failed"),
        }
    }

    DetectedCurrency {
        currency: state.config.currency.default,
        source: CurrencySource::Default,
    }
}

impl FromRequestParts<AppState> for DetectedCurrency {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(detect(&parts.headers, peer, state).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn rates() -> ExchangeRates {
        ExchangeRates::parse(Currency::Egp, "USD=0.02,SAR=0.077,AED=0.075").unwrap()
    }

    #[test]
    fn session_beats_cookie_and_header() {
        let hints = CurrencyHints {
            session: Some("SAR"),
            cookie: Some("AED"),
            header: Some("USD"),
        };
        assert_eq!(
            pick_from_hints(&hints, &rates()),
            Some(DetectedCurrency {
                currency: Currency::Sar,
                source: CurrencySource::Session
            })
        );
    }

    #[test]
    fn unsupported_values_fall_through() {
        let hints = CurrencyHints {
            session: Some("JPY"),
            cookie: Some("KWD"),
            header: Some("usd"),
        };
        // KWD parses but has no configured rate.
        assert_eq!(
            pick_from_hints(&hints, &rates()),
            Some(DetectedCurrency {
                currency: Currency::Usd,
                source: CurrencySource::Header
            })
        );
        assert_eq!(pick_from_hints(&CurrencyHints::default(), &rates()), None);
    }

    #[test]
    fn reads_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; currency=AED; lang=ar"),
        );
        assert_eq!(cookie_value(&headers, "currency"), Some("AED"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let peer: SocketAddr = "10.0.0.2:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), Some(peer.ip()));

        headers.insert("x-real-ip", HeaderValue::from_static("41.33.10.9"));
        assert_eq!(client_ip(&headers, Some(peer)), "41.33.10.9".parse().ok());

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("41.33.10.2, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)), "41.33.10.2".parse().ok());
    }
}
