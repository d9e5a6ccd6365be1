//! HTTPS implementation of [`SearchApi`].
//!
//! All calls go through [`HarvesterClient::post_json`], which holds a
//! [`RateController`] permit for the duration of the request and reports
//! success or throttling back to the controller. Blocked responses often
//! arrive as HTTP 200 with an empty or non-JSON body, so those are treated
//! as throttling too.

use crate::client::{
    payload, ApiError, ApiResult, Amenity, CalendarDay, Description, ReviewPage, SearchApi,
    SearchPage,
};
use crate::config::HarvestConfig;
use crate::limiter::RateController;
use crate::periods::StayWindow;
use crate::pricing::PriceObservation;
use crate::{BoundingBox, Listing};
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Zoom level used for single-listing price-quote searches.
const PINPOINT_ZOOM: u8 = 16;

/// Half-width in degrees of the box searched around a listing for quotes.
const PINPOINT_SPAN: f64 = 0.001;

/// Rate-controlled HTTPS client for the upstream API.
pub struct HarvesterClient {
    http: reqwest::Client,
    controller: Arc<RateController>,
    base_url: String,
    api_key: String,
    currency: String,
    translate_descriptions: bool,
}

impl HarvesterClient {
    /// Create a client from the harvest configuration.
    pub fn new(controller: Arc<RateController>, config: &HarvestConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            controller,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            currency: config.currency.clone(),
            translate_descriptions: config.translate_description_to_english,
        })
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// Holds a pacing permit across the request. Connection failures, 429s,
    /// and empty or undecodable bodies are reported to the controller as
    /// throttling signals before the error is returned.
    async fn post_json(&self, path: &str, body: &Value) -> ApiResult<Value> {
        let _permit = self.controller.acquire().await?;

        let user_agent = {
            let mut rng = rand::thread_rng();
            *payload::USER_AGENTS
                .choose(&mut rng)
                .unwrap_or(&payload::USER_AGENTS[0])
        };

        let url = format!("{}{path}", self.base_url);
        let response = match self
            .http
            .post(&url)
            .header("User-Agent", user_agent)
            .header("X-Airbnb-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let failures = self.controller.report_throttled().await;
                warn!(%url, failures, error = %e, "request failed at connection level");
                return Err(ApiError::Network(e.to_string()));
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            let failures = self.controller.report_throttled().await;
            warn!(%url, failures, "upstream throttled the request");
            return Err(ApiError::Throttled);
        }
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "unexpected HTTP status");
            return Err(ApiError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let decoded: Value = match serde_json::from_str(text.trim()) {
            Ok(value) => value,
            // A 200 with an empty or non-JSON body is a soft block
            Err(_) => {
                let failures = self.controller.report_throttled().await;
                warn!(%url, failures, body_len = text.len(), "undecodable 200 response");
                return Err(ApiError::Throttled);
            }
        };

        self.controller.report_success();
        debug!(%url, "request completed");
        Ok(decoded)
    }
}

#[async_trait]
impl SearchApi for HarvesterClient {
    async fn search(&self, area: &BoundingBox, zoom: u8, offset: u32) -> ApiResult<SearchPage> {
        let body = payload::search_payload(area, zoom, offset, None, &self.currency);
        let response = self.post_json(payload::SEARCH_ENDPOINT, &body).await?;
        payload::parse_search_page(&response)
    }

    async fn fetch_calendar(&self, listing_id: &str) -> ApiResult<Vec<CalendarDay>> {
        let today = Utc::now().date_naive();
        let body = payload::calendar_payload(listing_id, today);
        let response = self.post_json(payload::CALENDAR_ENDPOINT, &body).await?;
        payload::parse_calendar(&response, today)
    }

    async fn fetch_price_quote(
        &self,
        listing: &Listing,
        window: &StayWindow,
        guests: u8,
    ) -> ApiResult<Option<PriceObservation>> {
        // Quotes only come back through dated searches, so search a tight box
        // around the listing's own coordinate
        let area = BoundingBox {
            ne_lat: listing.lat + PINPOINT_SPAN,
            ne_lng: listing.lng + PINPOINT_SPAN,
            sw_lat: listing.lat - PINPOINT_SPAN,
            sw_lng: listing.lng - PINPOINT_SPAN,
        };
        let body = payload::search_payload(
            &area,
            PINPOINT_ZOOM,
            0,
            Some((window, guests)),
            &self.currency,
        );
        let response = self.post_json(payload::SEARCH_ENDPOINT, &body).await?;

        Ok(payload::parse_price_quote(&response, &listing.id)?.map(|price| PriceObservation {
            listing_id: listing.id.clone(),
            period: window.period,
            guests,
            check_in: window.check_in,
            price,
            available: true,
        }))
    }

    async fn fetch_description(&self, listing_id: &str) -> ApiResult<Description> {
        let body = payload::pdp_sections_payload(listing_id, self.translate_descriptions);
        let response = self.post_json(payload::PDP_SECTIONS_ENDPOINT, &body).await?;
        payload::parse_description(&response, listing_id)
    }

    async fn fetch_reviews(&self, listing_id: &str, offset: u32) -> ApiResult<ReviewPage> {
        let body = payload::reviews_payload(listing_id, offset);
        let response = self.post_json(payload::REVIEWS_ENDPOINT, &body).await?;
        payload::parse_reviews(&response)
    }

    async fn fetch_amenities(&self, listing_id: &str) -> ApiResult<Vec<Amenity>> {
        let body = payload::pdp_sections_payload(listing_id, false);
        let response = self.post_json(payload::PDP_SECTIONS_ENDPOINT, &body).await?;
        payload::parse_amenities(&response)
    }
}
