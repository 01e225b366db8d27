use std::collections::BTreeMap;

use async_trait::async_trait;
use fros_models::{GeoPoint, Transaction};
use serde::{Deserialize, Serialize};

use super::ContextProvider;
use crate::error::ProviderError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoAssessment {
    pub reported: Option<GeoPoint>,
    pub home: Option<GeoPoint>,
    /// Great-circle distance between home and the reported location.
    pub distance_km: Option<f64>,
    pub country: Option<String>,
    pub high_risk_country: bool,
    /// Reported country differs from the home country.
    pub foreign: bool,
}

pub struct GeolocationProvider {
    homes: BTreeMap<String, GeoPoint>,
    high_risk_countries: Vec<String>,
}

impl GeolocationProvider {
    pub fn new(homes: BTreeMap<String, GeoPoint>, high_risk_countries: Vec<String>) -> Self {
        Self {
            homes,
            high_risk_countries,
        }
    }

    fn is_high_risk(&self, country: &str) -> bool {
        self.high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    }
}

#[async_trait]
impl ContextProvider for GeolocationProvider {
    fn name(&self) -> &str {
        "geolocation"
    }

    /// Account plus the reported position rounded to ~1 km, so one account
    /// transacting from two places gets two cache entries.
    fn subject(&self, tx: &Transaction) -> String {
        match tx.location() {
            Some(p) => format!("{}@{:.2},{:.2}", tx.origin_account, p.latitude, p.longitude),
            None => format!("{}@unknown", tx.origin_account),
        }
    }

    async fn fetch(&self, tx: &Transaction) -> Result<serde_json::Value, ProviderError> {
        let reported = tx.location().cloned();
        let home = self.homes.get(&tx.origin_account).cloned();

        let distance_km = match (&reported, &home) {
            (Some(r), Some(h)) => Some(h.distance_km(r)),
            _ => None,
        };
        let country = reported.as_ref().and_then(|r| r.country.clone());
        let high_risk_country = country.as_deref().is_some_and(|c| self.is_high_risk(c));
        let foreign = match (
            country.as_deref(),
            home.as_ref().and_then(|h| h.country.as_deref()),
        ) {
            (Some(here), Some(home_country)) => !here.eq_ignore_ascii_case(home_country),
            _ => false,
        };

        let assessment = GeoAssessment {
            reported,
            home,
            distance_km,
            country,
            high_risk_country,
            foreign,
        };
        serde_json::to_value(assessment).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}
