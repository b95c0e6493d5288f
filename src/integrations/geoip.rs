use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::integrations::http_client;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geolocation service returned {0}")]
    Status(reqwest::StatusCode),
}

/// Resolves a client IP to an ISO 3166 alpha-2 country code.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn country_for_ip(&self, ip: IpAddr) -> Result<Option<String>, GeoError>;
}

/// Used when no geolocation service is configured.
pub struct NoopGeoLocator;

#[async_trait]
impl GeoLocator for NoopGeoLocator {
    async fn country_for_ip(&self, _ip: IpAddr) -> Result<Option<String>, GeoError> {
        Ok(None)
    }
}

/// Calls a plain-text lookup endpoint such as `https://ipapi.co/{ip}/country/`.
pub struct HttpGeoLocator {
    client: reqwest::Client,
    url_template: String,
}

impl HttpGeoLocator {
    pub fn new(url_template: impl Into<String>) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(2))?,
            url_template: url_template.into(),
        })
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn country_for_ip(&self, ip: IpAddr) -> Result<Option<String>, GeoError> {
        let url = self.url_template.replace("{ip}", &ip.to_string());
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GeoError::Status(response.status()));
        }
        let body = response.text().await?;
        Ok(parse_country(&body))
    }
}

fn parse_country(body: &str) -> Option<String> {
    let code = body.trim();
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| code.to_ascii_uppercase())
}

/// Loopback, private, link-local and unspecified addresses never geolocate.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let unique_local = (v6.segments()[0] & 0xfe00) == 0xfc00;
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_country_codes() {
        assert_eq!(parse_country("eg\n"), Some("EG".into()));
        assert_eq!(parse_country("Undefined"), None);
        assert_eq!(parse_country(""), None);
    }

    #[test]
    fn filters_non_routable_addresses() {
        assert!(!is_public_ip(&"127.0.0.1".parse().unwrap()));
        assert!(!is_public_ip(&"10.1.2.3".parse().unwrap()));
        assert!(!is_public_ip(&"192.168.0.10".parse().unwrap()));
        assert!(!is_public_ip(&"::1".parse().unwrap()));
        assert!(!is_public_ip(&"fd00::1".parse().unwrap()));
        assert!(is_public_ip(&"41.33.10.2".parse().unwrap()));
        assert!(is_public_ip(&"2a00:1450::1".parse().unwrap()));
    }
}
