//! Shared dispatcher bound to the LLM backend

use crate::core::dispatcher::Dispatcher;
use crate::core::error::TransportError;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::transport::HttpTransport;
use log::info;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// The one dispatcher every caller in the process submits through.
///
/// Built once at startup and registered with the service provider as an existing instance.
pub struct LlmBackend {
    dispatcher: Dispatcher,
    reply_timeout: Option<Duration>,
}

impl LlmBackend {
    pub fn new(dispatcher: Dispatcher, reply_timeout: Option<Duration>) -> Self {
        Self {
            dispatcher,
            reply_timeout,
        }
    }

    /// Builds the HTTP transport and starts the dispatcher on the current runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.llm_base_url, config.request_timeout)?;
        info!("dispatching LLM requests to {}", transport.base_url());

        let dispatcher = Dispatcher::new(Arc::new(transport), config.dispatcher);
        dispatcher.start();

        Ok(Self::new(dispatcher, config.reply_timeout))
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout
    }
}

impl Deref for LlmBackend {
    type Target = Dispatcher;

    fn deref(&self) -> &Self::Target {
        &self.dispatcher
    }
}
