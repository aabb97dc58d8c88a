//! HTTP client for the MeterVPN server.
//!
//! Uses reqwest; the account is sent the way the server's web pages send it,
//! as an `accountId` cookie.

use std::time::Duration;

use reqwest::header::COOKIE;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::ServerConfig;

use super::MeterApi;
use super::types::{
    AccountId, AssignedAddress, CompletionResponse, CreatedAccount, ErrorBody, ExtendRequest,
    ExtensionResponse, PeerInfo, PriceSnapshot, RegisterKeyRequest, SettlementStatus,
};

/// MeterVPN API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    #[error("No account configured; run `metervpn account create` first")]
    MissingAccount,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// MeterVPN HTTP API client, scoped to at most one account.
#[derive(Debug, Clone)]
pub struct MeterClient {
    http: reqwest::Client,
    base_url: String,
    account: Option<AccountId>,
}

impl MeterClient {
    /// Create a new client for the configured server.
    pub fn new(config: &ServerConfig, account: Option<AccountId>) -> Result<Self, ApiError> {
        if config.base_url.trim().is_empty() {
            return Err(ApiError::Config("base_url is empty".into()));
        }
        Url::parse(&config.base_url)
            .map_err(|e| ApiError::Config(format!("invalid base_url: {e}")))?;

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("metervpn/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            account,
        })
    }

    /// The account this client acts for.
    pub const fn account(&self) -> Option<&AccountId> {
        self.account.as_ref()
    }

    /// Re-scope the client to `account`.
    #[must_use]
    pub fn with_account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    /// Build the URL for a given API path.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the account cookie, failing if there is no account.
    fn scoped(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let account = self.account.as_ref().ok_or(ApiError::MissingAccount)?;
        Ok(builder.header(COOKIE, format!("accountId={account}")))
    }

    /// Turn a non-success response into `ApiError::Api`, keeping the server's message.
    async fn error_from(resp: Response) -> ApiError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown").to_string()
                } else {
                    trimmed.to_string()
                }
            });
        ApiError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Check HTTP response status, returning error for non-success codes.
    async fn check_status(resp: Response) -> Result<Response, ApiError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(Self::error_from(resp).await)
        }
    }
}

impl MeterApi for MeterClient {
    async fn create_account(&self) -> Result<CreatedAccount, ApiError> {
        let resp = self.http.post(self.url("/peer")).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn peer(&self) -> Result<PeerInfo, ApiError> {
        let resp = self.scoped(self.http.get(self.url("/peer")))?.send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn price(&self) -> Result<PriceSnapshot, ApiError> {
        let resp = self.http.get(self.url("/price")).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn register_public_key(&self, public_key: &str) -> Result<(), ApiError> {
        let body = RegisterKeyRequest {
            public_key: public_key.to_string(),
        };
        let resp = self
            .scoped(self.http.post(self.url("/peer/pubkey")))?
            .json(&body)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn assigned_address(&self) -> Result<AssignedAddress, ApiError> {
        let resp = self
            .scoped(self.http.get(self.url("/peer/ip")))?
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn request_extension(&self, duration: Duration) -> Result<ExtensionResponse, ApiError> {
        let body = ExtendRequest {
            duration: duration.as_secs().to_string(),
        };
        let resp = self
            .scoped(self.http.post(self.url("/peer/extend")))?
            .json(&body)
            .send()
            .await?;

        match resp.status() {
            StatusCode::PAYMENT_REQUIRED => {
                let invoice = resp.text().await?.trim().to_string();
                if invoice.is_empty() {
                    return Err(ApiError::InvalidResponse(
                        "402 without a payment request".into(),
                    ));
                }
                debug!(invoice_len = invoice.len(), "Extension requires payment");
                Ok(ExtensionResponse::PaymentRequired { invoice })
            }
            status if status.is_success() => Ok(ExtensionResponse::Granted),
            _ => Err(Self::error_from(resp).await),
        }
    }

    async fn settlement_status(&self, invoice: &str) -> Result<SettlementStatus, ApiError> {
        let url = Url::parse_with_params(
            &self.url("/peer/extend/completed"),
            &[("payReq", invoice)],
        )
        .map_err(|e| ApiError::Config(format!("invalid settlement URL: {e}")))?;

        let mut request = self.http.get(url);
        if let Some(account) = &self.account {
            request = request.header(COOKIE, format!("accountId={account}"));
        }
        let resp = request.send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(SettlementStatus::UnknownInvoice);
        }
        let resp = Self::check_status(resp).await?;
        let body: CompletionResponse = resp.json().await?;
        Ok(body.into())
    }
}
