use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Currencies the storefront can quote and charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Egp,
    Sar,
    Aed,
    Kwd,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Egp,
        Currency::Sar,
        Currency::Aed,
        Currency::Kwd,
        Currency::Usd,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Egp => "EGP",
            Currency::Sar => "SAR",
            Currency::Aed => "AED",
            Currency::Kwd => "KWD",
            Currency::Usd => "USD",
        }
    }

    /// Case-insensitive parse; surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(value))
    }

    /// Minor units per major unit (KWD uses fils, 1000 per dinar).
    pub fn minor_units(&self) -> i64 {
        match self {
            Currency::Kwd => 1000,
            _ => 100,
        }
    }

    /// Currency used for visitors from an ISO 3166 alpha-2 country.
    pub fn for_country(country: &str) -> Self {
        match country.trim().to_ascii_uppercase().as_str() {
            "EG" => Currency::Egp,
            "SA" => Currency::Sar,
            "AE" => Currency::Aed,
            "KW" => Currency::Kwd,
            _ => Currency::Usd,
        }
    }

    /// Formats minor units as a decimal string, e.g. `12345` EGP -> `"123.45"`.
    pub fn format_minor(&self, amount: i64) -> String {
        let unit = self.minor_units();
        let digits = if unit == 1000 { 3 } else { 2 };
        let sign = if amount < 0 { "-" } else { "" };
        let abs = amount.unsigned_abs();
        let unit = unit as u64;
        format!("{sign}{}.{:0width$}", abs / unit, abs % unit, width = digits)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateParseError {
    #[error("malformed rate entry `{0}`")]
    Malformed(String),
    #[error("unsupported currency `{0}`")]
    UnsupportedCurrency(String),
    #[error("rate for {0} must be positive")]
    NonPositive(String),
}

const PPM: i128 = 1_000_000;

/// Conversion rates from the base currency, stored as parts-per-million of
/// one base major unit so conversion stays in integer arithmetic.
#[derive(Debug, Clone)]
pub struct ExchangeRates {
    base: Currency,
    rates_ppm: HashMap<Currency, i64>,
}

impl ExchangeRates {
    pub fn identity(base: Currency) -> Self {
        let mut rates_ppm = HashMap::new();
        rates_ppm.insert(base, PPM as i64);
        Self { base, rates_ppm }
    }

    /// Parses `USD=0.0204,SAR=0.0765` where each value is the amount of that
    /// currency one base unit buys.
    pub fn parse(base: Currency, raw: &str) -> Result<Self, RateParseError> {
        let mut rates = Self::identity(base);
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (code, value) = entry
                .split_once('=')
                .ok_or_else(|| RateParseError::Malformed(entry.to_string()))?;
            let currency = Currency::parse(code)
                .ok_or_else(|| RateParseError::UnsupportedCurrency(code.trim().to_string()))?;
            let rate: f64 = value
                .trim()
                .parse()
                .map_err(|_| RateParseError::Malformed(entry.to_string()))?;
            let ppm = (rate * PPM as f64).round() as i64;
            if ppm <= 0 {
                return Err(RateParseError::NonPositive(currency.code().to_string()));
            }
            rates.rates_ppm.insert(currency, ppm);
        }
        Ok(rates)
    }

    pub fn base(&self) -> Currency {
        self.base
    }

    pub fn supports(&self, currency: Currency) -> bool {
        self.rates_ppm.contains_key(&currency)
    }

    /// Converts base-currency minor units into `to` minor units, rounding half up.
    pub fn convert(&self, amount: i64, to: Currency) -> Option<i64> {
        let ppm = *self.rates_ppm.get(&to)? as i128;
        let scaled = amount as i128 * ppm * to.minor_units() as i128;
        let divisor = PPM * self.base.minor_units() as i128;
        let rounded = (scaled + divisor / 2).div_euclid(divisor);
        i64::try_from(rounded).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Currency::parse(" egp "), Some(Currency::Egp));
        assert_eq!(Currency::parse("Sar"), Some(Currency::Sar));
        assert_eq!(Currency::parse("JPY"), None);
    }

    #[test]
    fn country_mapping_falls_back_to_usd() {
        assert_eq!(Currency::for_country("eg"), Currency::Egp);
        assert_eq!(Currency::for_country("AE"), Currency::Aed);
        assert_eq!(Currency::for_country("FR"), Currency::Usd);
    }

    #[test]
    fn identity_conversion_is_exact() {
        let rates = ExchangeRates::identity(Currency::Egp);
        assert_eq!(rates.convert(123_45, Currency::Egp), Some(123_45));
        assert_eq!(rates.convert(100, Currency::Usd), None);
    }

    #[test]
    fn converts_with_rounding_and_minor_units() {
        let rates = ExchangeRates::parse(Currency::Egp, "USD=0.02, KWD=0.0063").unwrap();
        // 1000.00 EGP -> 20.00 USD
        assert_eq!(rates.convert(100_000, Currency::Usd), Some(2_000));
        // 1000.00 EGP -> 6.300 KWD (fils)
        assert_eq!(rates.convert(100_000, Currency::Kwd), Some(6_300));
        // 0.25 EGP -> 0.005 USD rounds half up to 1 cent
        assert_eq!(rates.convert(25, Currency::Usd), Some(1));
    }

    #[test]
    fn rejects_bad_rate_strings() {
        assert!(matches!(
            ExchangeRates::parse(Currency::Egp, "USD"),
            Err(RateParseError::Malformed(_))
        ));
        assert!(matches!(
            ExchangeRates::parse(Currency::Egp, "JPY=3"),
            Err(RateParseError::UnsupportedCurrency(_))
        ));
        assert!(matches!(
            ExchangeRates::parse(Currency::Egp, "USD=0"),
            Err(RateParseError::NonPositive(_))
        ));
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(Currency::Egp.format_minor(12_345), "123.45");
        assert_eq!(Currency::Kwd.format_minor(6_300), "6.300");
        assert_eq!(Currency::Usd.format_minor(5), "0.05");
    }
}
