//! Network fetch capability and its reqwest implementation.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::TransportError;
use crate::request::{Request, Response};

/// Something that can turn a request into a response over the network.
///
/// Only transport failures are errors. A reachable server that answers with
/// a 4xx or 5xx status yields `Ok`.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request)
    -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// HTTP network backed by a shared reqwest client.
pub struct HttpNetwork {
  client: reqwest::Client,
  offline: AtomicBool,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("hikecache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      client,
      offline: AtomicBool::new(false),
    })
  }

  /// Simulate losing connectivity: every fetch fails with `TransportError::Offline`.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn is_offline(&self) -> bool {
    self.offline.load(Ordering::SeqCst)
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
    let url = request.url.to_string();
    if self.is_offline() {
      return Err(TransportError::Offline { url });
    }

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| transport_error(&url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError::Body {
        url: url.clone(),
        message: e.to_string(),
      })?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

fn transport_error(url: &str, e: reqwest::Error) -> TransportError {
  let url = url.to_string();
  if e.is_timeout() {
    TransportError::Timeout { url }
  } else if e.is_connect() {
    TransportError::Connect {
      url,
      message: e.to_string(),
    }
  } else {
    TransportError::Other {
      url,
      message: e.to_string(),
    }
  }
}
