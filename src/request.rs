use std::sync::Arc;

use crate::{
    error::{Error, Result},
    handshake::BackendParameters,
    pinning::{pinned_client_config, CertificatePinner},
};

/// Description of one request to the backend web server.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    /// Absolute URL to request; a descriptor without one is invalid
    pub url:    Option<String>,
    /// HTTP method, defaulting to GET
    pub method: Option<String>,
    /// Request body, if any
    pub body:   Option<Vec<u8>>,
}

impl RequestDescriptor {
    /// A GET descriptor for the given URL.
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// HTTPS client for the backend's web API, trusting only the pinned
/// certificate.
///
/// When the backend negotiated no certificate, requests go over plain HTTP
/// and the pin is never consulted.
pub struct RequestClient {
    http:   reqwest::Client,
    pinner: Arc<CertificatePinner>,
}

impl RequestClient {
    /// Builds a client around resolved backend parameters.
    pub fn new(parameters: &BackendParameters) -> Result<Self> {
        let pinner = Arc::new(CertificatePinner::new(
            parameters.web_server_certificate.clone(),
        ));

        let http = reqwest::Client::builder()
            .use_preconfigured_tls(pinned_client_config(Arc::clone(&pinner)))
            .build()
            .map_err(Error::ClientInit)?;

        Ok(Self { http, pinner })
    }

    /// The pin shared with every TLS verification this client performs.
    pub fn pinner(&self) -> Arc<CertificatePinner> {
        Arc::clone(&self.pinner)
    }

    /// Performs one request, buffering the full response body.
    ///
    /// A descriptor without a URL fails immediately with no network
    /// activity. Transport failures carry the URL and the underlying cause;
    /// they are per-request and leave the pinned trust state untouched.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<Vec<u8>> {
        let url = descriptor
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::InvalidRequest {
                reason: "no URL was provided".to_string(),
            })?;

        let method = match &descriptor.method {
            Some(name) => reqwest::Method::from_bytes(name.as_bytes()).map_err(|_| {
                Error::InvalidRequest {
                    reason: format!("unsupported HTTP method {name:?}"),
                }
            })?,
            None => reqwest::Method::GET,
        };

        tracing::debug!(%url, %method, "sending request to backend");

        let mut request = self.http.request(method, url.as_str());
        if let Some(body) = descriptor.body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|source| Error::Transport {
            url: url.clone(),
            source,
        })?;

        let body = response
            .bytes()
            .await
            .map_err(|source| Error::Transport {
                url: url.clone(),
                source,
            })?;

        tracing::debug!(%url, bytes = body.len(), "backend response received");
        Ok(body.to_vec())
    }
}
