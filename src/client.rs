//! The compile client.
//!
//! `Client::compile` runs one request/response session: serialize the tree,
//! connect, send the request, stream audio into the destination and resolve
//! any requested durations. No retries; any transport failure ends the call.

use std::io::Write;

use tracing::{debug, info};
use url::Url;

use crate::builder::AudioBuilder;
use crate::config::{ClientConfig, DEFAULT_ENDPOINT};
use crate::error::{PodioError, Result};
use crate::session::{connect, CancelToken, ConnectOptions, Session, SessionSummary};
use crate::wire::{FetchContext, Format, OpeningMessage};

#[derive(Debug, Clone)]
pub struct Client {
    endpoint: String,
    api_key: String,
    options: ConnectOptions,
}

impl Client {
    /// Client for the public service endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            options: ConnectOptions::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(PodioError::Config("api_key is not set".to_string()));
        }
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            options: config.connect_options(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Endpoint with the API key appended as the `apiKey` query parameter.
    /// Any fragment is dropped; WebSocket URIs cannot carry one.
    pub fn connection_uri(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            PodioError::Config(format!("invalid endpoint {:?}: {e}", self.endpoint))
        })?;
        url.set_fragment(None);
        url.query_pairs_mut().append_pair("apiKey", &self.api_key);
        Ok(url)
    }

    /// Compile `tree` to `format`, writing the audio stream into `dst`.
    ///
    /// Blocks until the service closes the session. Slots passed to
    /// `save_duration` are written as their status messages arrive. On error,
    /// bytes already written to `dst` stay there.
    pub fn compile<W: Write>(
        &self,
        format: Format,
        tree: &AudioBuilder,
        dst: &mut W,
        cancel: &CancelToken,
    ) -> Result<SessionSummary> {
        let mut context = FetchContext::new();
        let opening = OpeningMessage::new(format, tree, &mut context)?.to_text()?;
        debug!(references = context.len(), "serialized audio tree");

        info!(endpoint = %self.endpoint, %format, "compiling");
        let uri = self.connection_uri()?;
        let connection = connect(uri.as_str(), &self.options, cancel)?;
        let summary =
            Session::new(connection, context, dst, cancel.clone()).run(opening)?;
        info!(bytes = summary.bytes, "compile finished");
        Ok(summary)
    }

    /// Compile into memory.
    pub fn compile_to_vec(
        &self,
        format: Format,
        tree: &AudioBuilder,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.compile(format, tree, &mut out, cancel)?;
        Ok(out)
    }
}
