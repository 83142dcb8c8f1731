//! API client for communicating with the restaurant REST API.
//!
//! This module provides the `ApiClient` struct used by the data layer and
//! the offline queue. Requests are never retried and carry no timeout;
//! callers decide what a failure means.

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::models::{NewReview, Restaurant, Review};

use super::ApiError;

/// What the server sent back for an accepted review.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// JSON body describing the stored review
    Created(Review),
    /// Success status with a non-JSON body
    Acknowledged,
}

// The reviews endpoint answers with a bare object when only one review matches
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// API client for the restaurant backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the backend at `base_url` (e.g. `http://localhost:1337`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    // ===== Restaurants =====

    /// Fetch the full restaurant list
    pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>> {
        let url = format!("{}/restaurants", self.base_url);
        let restaurants: Vec<Restaurant> = self.get(&url).await?;
        debug!(count = restaurants.len(), "Fetched restaurants");
        Ok(restaurants)
    }

    /// Set the favorite flag of a restaurant on the server
    pub async fn update_favorite(&self, restaurant_id: i64, is_favorite: bool) -> Result<()> {
        let url = format!(
            "{}/restaurants/{}/?is_favorite={}",
            self.base_url, restaurant_id, is_favorite
        );

        let response = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send PUT request to {}", url))?;

        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Reviews =====

    /// Post a new review. Only parses the body when the server says it is JSON.
    pub async fn submit_review(&self, review: &NewReview) -> Result<SubmitOutcome> {
        let url = format!("{}/reviews/", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(review)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send POST request to {}", url))?;

        let response = Self::check_response(response).await?;

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if !is_json {
            return Ok(SubmitOutcome::Acknowledged);
        }

        let created: Review = response
            .json()
            .await
            .context("Failed to parse created review")?;
        Ok(SubmitOutcome::Created(created))
    }

    /// Fetch every review for one restaurant
    pub async fn fetch_reviews(&self, restaurant_id: i64) -> Result<Vec<Review>> {
        let url = format!("{}/reviews/?restaurant_id={}", self.base_url, restaurant_id);
        let reviews: OneOrMany<Review> = self.get(&url).await?;
        Ok(reviews.into())
    }
}
