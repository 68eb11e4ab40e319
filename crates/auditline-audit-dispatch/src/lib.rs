//! Audit record dispatch for Auditline.
//!
//! A [`Dispatcher`] holds zero or more [`Sink`]s and hands each built
//! record to all of them. Two sink families exist:
//!
//! - [`DocumentStoreSink`]: upserts into a [`DocumentStore`] keyed by record id.
//! - [`BrokerSink`]: publishes to a topic through a [`BrokerPublisher`].
//!
//! Failures are logged and counted, never returned to the caller.

mod batch;
mod broker;
mod dispatcher;
mod error;
mod factory;
mod retry;
mod sink;
mod store;

pub use batch::{index_queue, BatchCollector, IndexerConfig, IndexerStats, MessageBatch};
pub use broker::{BrokerPublisher, BrokerSink, ChannelPublisher, HttpBrokerPublisher, PublishedMessage};
pub use dispatcher::{DispatchStats, DispatchStatsSnapshot, Dispatcher};
pub use error::{SetupError, SinkError};
pub use factory::DispatchSetup;
pub use retry::{RetryPolicy, RetryingSink};
pub use sink::Sink;
pub use store::{DocumentStore, DocumentStoreSink, HttpDocumentStore, InMemoryDocumentStore};

pub use auditline_common_config::{DeliveryMode, SinkKind};
