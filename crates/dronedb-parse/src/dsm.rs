//! DSM altitude service contract (spec §6.3): `altitude_for(lat, lon)`
//! returns elevation above the ellipsoid, or 0 on any failure, and never
//! propagates an error — consulting it is a best-effort enrichment during
//! parse, never a reason to fail parsing.

use dronedb_core::config::LayeredConfig;
use std::time::Duration;
use url::Url;

pub struct DsmClient {
    base_url: Option<Url>,
    http: reqwest::blocking::Client,
}

impl DsmClient {
    pub fn from_config(config: &LayeredConfig) -> Self {
        let base_url = config.dsm_service_url.value.as_ref().and_then(|s| Url::parse(s).ok());
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { base_url, http }
    }

    /// Never fails: returns 0.0 when unconfigured, unreachable, or the
    /// response can't be parsed.
    pub fn altitude_for(&self, lat: f64, lon: f64) -> f64 {
        let Some(base) = &self.base_url else {
            return 0.0;
        };
        let mut url = base.clone();
        url.query_pairs_mut().append_pair("lat", &lat.to_string()).append_pair("lon", &lon.to_string());

        match self.http.get(url).send().and_then(|r| r.error_for_status()).and_then(|r| r.json::<AltitudeResponse>())
        {
            Ok(resp) => resp.altitude,
            Err(e) => {
                tracing::debug!(error = %e, "DSM altitude service unavailable, defaulting to 0");
                0.0
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct AltitudeResponse {
    altitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_client_returns_zero() {
        let config = LayeredConfig::with_defaults();
        let client = DsmClient::from_config(&config);
        assert_eq!(client.altitude_for(50.0, 0.0), 0.0);
    }
}
