//! Build a dispatcher from validated configuration.

use crate::{
    BrokerSink, ChannelPublisher, Dispatcher, DocumentStoreSink, HttpBrokerPublisher,
    HttpDocumentStore, PublishedMessage, RetryPolicy, RetryingSink, SetupError, Sink,
};
use auditline_common_config::{validate, AuditConfig, AuthConfig, SinkConfig, SinkKind};
use auditline_common_http::{HttpAuth, HttpClient, HttpConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A dispatcher plus, for an in-process queue, the consumer end.
#[derive(Debug)]
pub struct DispatchSetup {
    pub dispatcher: Dispatcher,
    /// Present when records are queued in-process; hand it to
    /// [`index_queue`](crate::index_queue) or another consumer.
    pub queue: Option<mpsc::Receiver<PublishedMessage>>,
}

impl Dispatcher {
    /// Build from configuration, failing on anything invalid.
    ///
    /// `audit.enabled = false` or `audit.sink.kind = none` yields
    /// [`Dispatcher::disabled`].
    pub fn from_config(config: &AuditConfig) -> Result<DispatchSetup, SetupError> {
        validate(config)?;

        let kind = match config.sink.kind {
            Some(kind) if config.enabled && kind != SinkKind::None => kind,
            _ => {
                info!(enabled = config.enabled, "audit dispatch disabled by configuration");
                return Ok(DispatchSetup {
                    dispatcher: Dispatcher::disabled(),
                    queue: None,
                });
            }
        };

        let sink_config = &config.sink;
        let mut queue = None;
        let sink: Arc<dyn Sink> = match (kind, sink_config.endpoint.as_deref()) {
            (SinkKind::Direct, Some(endpoint)) => {
                let store = HttpDocumentStore::new(http_client(sink_config)?, endpoint)?;
                Arc::new(DocumentStoreSink::new(Arc::new(store), &sink_config.index))
            }
            (SinkKind::Queued, Some(endpoint)) => {
                let publisher = HttpBrokerPublisher::new(http_client(sink_config)?, endpoint)?;
                Arc::new(BrokerSink::new(Arc::new(publisher), &sink_config.topic))
            }
            (SinkKind::Queued, None) => {
                let (publisher, receiver) = ChannelPublisher::new(sink_config.queue_capacity);
                queue = Some(receiver);
                Arc::new(BrokerSink::new(Arc::new(publisher), &sink_config.topic))
            }
            // validate() requires an endpoint for direct sinks
            (SinkKind::Direct, None) | (SinkKind::None, _) => {
                return Err(SetupError::Config(auditline_common_config::ConfigError::ValidationError {
                    message: format!("audit.sink.kind {kind} has no usable backend"),
                }))
            }
        };

        let sink: Arc<dyn Sink> = match &sink_config.retry {
            Some(retry) => Arc::new(RetryingSink::new(sink, RetryPolicy::from(retry))),
            None => sink,
        };

        info!(
            sink = %sink.name(),
            kind = %kind,
            delivery = %sink_config.delivery,
            service = %config.service_name,
            "audit dispatch configured"
        );

        Ok(DispatchSetup {
            dispatcher: Dispatcher::with_sinks(vec![sink], sink_config.delivery),
            queue,
        })
    }
}

fn http_client(sink: &SinkConfig) -> Result<HttpClient, SetupError> {
    let config = HttpConfig {
        request_timeout: sink.timeout(),
        auth: sink.auth.as_ref().map(http_auth).unwrap_or_default(),
        ..HttpConfig::default()
    };
    Ok(HttpClient::with_config(config)?)
}

fn http_auth(auth: &AuthConfig) -> HttpAuth {
    if let (Some(username), Some(password)) = (&auth.username, &auth.password) {
        HttpAuth::Basic {
            username: username.clone(),
            password: password.clone(),
        }
    } else if let Some(key) = &auth.api_key {
        HttpAuth::ApiKey(key.clone())
    } else if let Some(token) = &auth.bearer_token {
        HttpAuth::Bearer(token.clone())
    } else {
        HttpAuth::None
    }
}
