use std::{env, time::Duration};

use anyhow::Context;

use crate::currency::{Currency, ExchangeRates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct PaymobConfig {
    pub base_url: String,
    pub api_key: String,
    pub integration_id: i64,
    pub iframe_id: i64,
    pub hmac_secret: String,
}

#[derive(Debug, Clone)]
pub struct TabbyConfig {
    pub base_url: String,
    pub secret_key: String,
    pub merchant_code: String,
    pub webhook_header: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub paymob: Option<PaymobConfig>,
    pub tabby: Option<TabbyConfig>,
    pub pending_timeout: Duration,
    pub cleanup_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CurrencyConfig {
    pub base: Currency,
    pub default: Currency,
    pub rates: ExchangeRates,
    pub geoip_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub frontend_url: String,
    pub cors_origin: Option<String>,
    pub jwt: JwtConfig,
    pub payments: PaymentConfig,
    pub currency: CurrencyConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let environment = Environment::parse(&env::var("APP_ENV").unwrap_or_default());
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let jwt = JwtConfig {
            secret: env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            access_ttl_minutes: env_parse("JWT_ACCESS_TTL_MINUTES", 60),
            refresh_ttl_days: env_parse("JWT_REFRESH_TTL_DAYS", 30),
        };

        let payments = PaymentConfig {
            paymob: paymob_from_env()?,
            tabby: tabby_from_env(),
            pending_timeout: Duration::from_secs(env_parse("PAYMENT_TIMEOUT_MINUTES", 30u64) * 60),
            cleanup_interval: Duration::from_secs(env_parse("PAYMENT_CLEANUP_INTERVAL_SECS", 300)),
        };

        let base = currency_from_env("BASE_CURRENCY", Currency::Egp)?;
        let rates = match env::var("FX_RATES") {
            Ok(raw) => ExchangeRates::parse(base, &raw).context("invalid FX_RATES")?,
            Err(_) => ExchangeRates::identity(base),
        };
        let currency = CurrencyConfig {
            base,
            default: currency_from_env("DEFAULT_CURRENCY", base)?,
            rates,
            geoip_url: env::var("GEOIP_URL").ok().filter(|u| !u.is_empty()),
        };

        let mail = MailConfig {
            from: env::var("EMAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string()),
            api_url: env::var("EMAIL_API_URL").ok().filter(|u| !u.is_empty()),
            api_key: env::var("EMAIL_API_KEY").ok(),
        };

        Ok(Self {
            database_url,
            host,
            port,
            environment,
            frontend_url,
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
            jwt,
            payments,
            currency,
            mail,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn currency_from_env(key: &str, default: Currency) -> anyhow::Result<Currency> {
    match env::var(key) {
        Ok(raw) => Currency::parse(&raw).with_context(|| format!("{key} has unsupported currency {raw}")),
        Err(_) => Ok(default),
    }
}

fn paymob_from_env() -> anyhow::Result<Option<PaymobConfig>> {
    let Ok(api_key) = env::var("PAYMOB_API_KEY") else {
        return Ok(None);
    };
    let integration_id = env::var("PAYMOB_INTEGRATION_ID")
        .context("PAYMOB_INTEGRATION_ID is not set")?
        .parse()
        .context("PAYMOB_INTEGRATION_ID must be a number")?;
    let iframe_id = env::var("PAYMOB_IFRAME_ID")
        .context("PAYMOB_IFRAME_ID is not set")?
        .parse()
        .context("PAYMOB_IFRAME_ID must be a number")?;
    Ok(Some(PaymobConfig {
        base_url: env::var("PAYMOB_BASE_URL")
            .unwrap_or_else(|_| "https://accept.paymob.com".to_string()),
        api_key,
        integration_id,
        iframe_id,
        hmac_secret: env::var("PAYMOB_HMAC_SECRET").context("PAYMOB_HMAC_SECRET is not set")?,
    }))
}

fn tabby_from_env() -> Option<TabbyConfig> {
    let secret_key = env::var("TABBY_SECRET_KEY").ok()?;
    Some(TabbyConfig {
        base_url: env::var("TABBY_BASE_URL").unwrap_or_else(|_| "https://api.tabby.ai".to_string()),
        secret_key,
        merchant_code: env::var("TABBY_MERCHANT_CODE").unwrap_or_default(),
        webhook_header: env::var("TABBY_WEBHOOK_HEADER")
            .unwrap_or_else(|_| "x-webhook-secret".to_string()),
        webhook_secret: env::var("TABBY_WEBHOOK_SECRET").unwrap_or_default(),
    })
}
