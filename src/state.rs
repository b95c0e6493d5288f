use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, create_orm_conn},
    integrations::{
        gateway::{PaymentGateway, PaymentGateways},
        geoip::{GeoLocator, HttpGeoLocator, NoopGeoLocator},
        mailer::{Mailer, mailer_from_config},
        paymob::PaymobGateway,
        tabby::TabbyGateway,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub gateways: PaymentGateways,
    pub mailer: Arc<dyn Mailer>,
    pub geo: Arc<dyn GeoLocator>,
}

impl AppState {
    /// Wires the configured integrations around an existing pool.
    pub fn new(pool: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let mut gateways = PaymentGateways::new();
        if let Some(paymob) = &config.payments.paymob {
            gateways = gateways.with(Arc::new(PaymobGateway::new(paymob.clone())?));
        }
        if let Some(tabby) = &config.payments.tabby {
            gateways = gateways.with(Arc::new(TabbyGateway::new(tabby.clone())?));
        }

        let geo: Arc<dyn GeoLocator> = match &config.currency.geoip_url {
            Some(url) => Arc::new(HttpGeoLocator::new(url.clone())?),
            None => Arc::new(NoopGeoLocator),
        };
        let mailer = mailer_from_config(&config.mail)?;

        Ok(Self {
            orm: create_orm_conn(&pool),
            pool,
            config: Arc::new(config),
            gateways,
            mailer,
            geo,
        })
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways = self.gateways.with(gateway);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLocator>) -> Self {
        self.geo = geo;
        self
    }
}
