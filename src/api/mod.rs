// src/api/mod.rs - REST client for the remote print service
pub mod models;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use self::models::{
    BaudRateUpdate, CommandAck, CommandRequest, CreatePrinterRequest, JobAction, JobStatusUpdate,
    PrinterList, PrinterResource, PrinterStatus,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Got invalid response {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },
    #[error("Response for {0} carried no usable Location header")]
    MissingLocation(String),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Credentials(&'static str),
}

/// Basic-auth credentials for the print service.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.api_key.is_empty() {
            return Err(ApiError::Credentials("No API key available for the print service"));
        }
        if self.api_secret.is_empty() {
            return Err(ApiError::Credentials("No API secret available for the print service"));
        }
        Ok(())
    }
}

/// Client resource the printers of this node are registered under.
pub fn client_uri(service_url: &Url, node_uuid: &Uuid) -> Result<Url, ApiError> {
    Ok(service_url.join(&format!("/client/{node_uuid}/"))?)
}

/// The remote calls the bridge depends on.
#[async_trait]
pub trait PrintService: Send + Sync {
    async fn list_printers(&self, client: &Url) -> Result<Vec<PrinterResource>, ApiError>;

    /// Registers a printer and returns its URI.
    async fn create_printer(&self, request: &CreatePrinterRequest) -> Result<Url, ApiError>;

    async fn update_baud_rate(&self, printer: &Url, baud_rate: u32) -> Result<(), ApiError>;

    async fn printer_status(&self, printer: &Url) -> Result<PrinterStatus, ApiError>;

    /// Submits a command and returns its acknowledgement URI.
    async fn send_command(&self, printer: &Url, command: &str) -> Result<Url, ApiError>;

    async fn command_ack(&self, ack: &Url) -> Result<CommandAck, ApiError>;

    async fn update_job(&self, job: &Url, action: JobAction) -> Result<(), ApiError>;
}

/// [`PrintService`] over HTTPS with basic auth.
#[derive(Clone)]
pub struct HttpPrintService {
    client: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl HttpPrintService {
    pub fn new(base_url: Url, credentials: Credentials) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, credentials, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: Url,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        credentials.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.client
            .request(method, url.clone())
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.api_secret))
    }

    async fn checked(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            url,
            body,
        })
    }

    /// Resolves the `Location` header against the request URL, it may be relative.
    fn location(response: &Response) -> Result<Url, ApiError> {
        let missing = || ApiError::MissingLocation(response.url().to_string());
        let value = response.headers().get(LOCATION).ok_or_else(missing)?;
        let value = value.to_str().map_err(|_| missing())?;
        Ok(response.url().join(value)?)
    }
}

#[async_trait]
impl PrintService for HttpPrintService {
    async fn list_printers(&self, client: &Url) -> Result<Vec<PrinterResource>, ApiError> {
        let url = self.base_url.join("/printer/instance/")?;
        tracing::debug!("Getting printer list from {} for client {}", url, client);
        let response = self
            .request(Method::GET, &url)
            .query(&[("filter[client]", client.as_str())])
            .send()
            .await?;
        let list: PrinterList = Self::checked(response).await?.json().await?;
        Ok(list.resources)
    }

    async fn create_printer(&self, request: &CreatePrinterRequest) -> Result<Url, ApiError> {
        let url = self.base_url.join("/printer/instance/")?;
        let response = self.request(Method::POST, &url).json(request).send().await?;
        let response = Self::checked(response).await?;
        Self::location(&response)
    }

    async fn update_baud_rate(&self, printer: &Url, baud_rate: u32) -> Result<(), ApiError> {
        let response = self
            .request(Method::PUT, printer)
            .json(&BaudRateUpdate { baud_rate })
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn printer_status(&self, printer: &Url) -> Result<PrinterStatus, ApiError> {
        let response = self.request(Method::GET, printer).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn send_command(&self, printer: &Url, command: &str) -> Result<Url, ApiError> {
        let url = printer.join("command/")?;
        let response = self
            .request(Method::POST, &url)
            .json(&CommandRequest { command })
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Self::location(&response)
    }

    async fn command_ack(&self, ack: &Url) -> Result<CommandAck, ApiError> {
        let response = self.request(Method::GET, ack).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn update_job(&self, job: &Url, action: JobAction) -> Result<(), ApiError> {
        let response = self
            .request(Method::PUT, job)
            .json(&JobStatusUpdate { status: action })
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }
}
