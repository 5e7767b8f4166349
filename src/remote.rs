use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::currency::ExchangeRates;
use crate::expenses::{ExpenseFields, ExpenseRecord};

pub const DEFAULT_TABLE: &str = "expenses";
pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/JPY";
pub const RATES_SOURCE_NAME: &str = "open.er-api.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("expense store is not configured (set store_url and store_key)")]
    NotConfigured,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Remote table holding the expense rows.
pub trait LedgerStore: Send + Sync {
    /// All rows, newest first.
    fn list(&self) -> Result<Vec<ExpenseRecord>, RemoteError>;
    fn create(&self, fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError>;
    fn update(&self, id: &str, fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError>;
    fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

pub trait RateSource: Send + Sync {
    fn latest(&self) -> Result<ExchangeRates, RemoteError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub key: String,
    pub table: String,
}

impl StoreConfig {
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), self.table)
    }
}

/// PostgREST-style table client.
#[derive(Debug, Clone)]
pub struct RestLedgerStore {
    config: StoreConfig,
    client: Client,
}

impl RestLedgerStore {
    pub fn new(config: StoreConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(auth_headers(&config.key)?)
            .build()?;
        Ok(Self { config, client })
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn returned_row(&self, response: Response) -> Result<ExpenseRecord, RemoteError> {
        let rows: Vec<ExpenseRecord> = response.json()?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("no row returned".to_string()))
    }
}

impl LedgerStore for RestLedgerStore {
    #[instrument(skip(self), fields(table = %self.config.table))]
    fn list(&self) -> Result<Vec<ExpenseRecord>, RemoteError> {
        let request = self
            .client
            .get(self.config.endpoint())
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let rows: Vec<ExpenseRecord> = self.send(request)?.json()?;
        debug!(rows = rows.len(), "listed expenses");
        Ok(rows)
    }

    #[instrument(skip(self, fields), fields(table = %self.config.table))]
    fn create(&self, fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError> {
        let request = self
            .client
            .post(self.config.endpoint())
            .header("Prefer", "return=representation")
            .json(&[fields]);
        let response = self.send(request)?;
        self.returned_row(response)
    }

    #[instrument(skip(self, fields), fields(table = %self.config.table))]
    fn update(&self, id: &str, fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError> {
        let request = self
            .client
            .patch(self.config.endpoint())
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=representation")
            .json(fields);
        let response = self.send(request)?;
        self.returned_row(response)
    }

    #[instrument(skip(self), fields(table = %self.config.table))]
    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.config.endpoint())
            .query(&[("id", id_filter(id))]);
        self.send(request)?;
        Ok(())
    }
}

/// Stand-in used when no store credentials are configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredStore;

impl LedgerStore for UnconfiguredStore {
    fn list(&self) -> Result<Vec<ExpenseRecord>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn create(&self, _fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn update(&self, _id: &str, _fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn delete(&self, _id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

#[derive(Debug, Clone)]
pub struct OpenErApiRates {
    url: String,
    client: Client,
}

impl OpenErApiRates {
    pub fn new(url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

impl RateSource for OpenErApiRates {
    #[instrument(skip(self), fields(url = %self.url))]
    fn latest(&self) -> Result<ExchangeRates, RemoteError> {
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        let body: RatesResponse = response.json()?;
        parse_rates(body)
    }
}

fn parse_rates(body: RatesResponse) -> Result<ExchangeRates, RemoteError> {
    ExchangeRates::from_table(&body.rates)
        .ok_or_else(|| RemoteError::Decode("rates table lacks TWD or USD".to_string()))
}

fn auth_headers(key: &str) -> Result<HeaderMap, RemoteError> {
    let invalid = |err: InvalidHeaderValue| RemoteError::Decode(format!("invalid store key: {err}"));
    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
    );
    Ok(headers)
}

fn id_filter(id: &str) -> String {
    format!("eq.{id}")
}
