// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event shipping: a per-event transformation pipeline feeding batched,
//! retrying HTTP delivery to log collectors (generic HTTP, Splunk HEC,
//! SumoLogic).
//!
//! ```rust,ignore
//! let settings = ShipperSettings::from_env()?;
//! logger::init(&settings.log_level)?;
//!
//! let pipeline = OperationPipeline::from_configs(&operation_configs)?;
//! let transport = TransportFactory::from_settings(destination, Arc::new(NoDecryptor)).await?;
//! let dispatcher = Dispatcher::from_settings(&settings, pipeline, vec![transport]);
//! let summary = dispatcher.run(events_rx).await?;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod credentials;
pub mod destinations;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod http;
pub mod logger;
pub mod operations;
pub mod serializer;
pub mod settings;
pub mod transport;

pub use batch::{Batch, BatchAccumulator};
pub use config::{DestinationKind, TransportConfig, TransportSettings};
pub use credentials::{CredentialFactory, NoDecryptor, SecretDecryptor};
pub use destinations::{RequestRouting, TransportFactory};
pub use dispatcher::{DestinationSummary, Dispatcher, RunSummary};
pub use errors::{
    ConfigError, DeliveryError, DispatchError, FailureReason, SerializeError, TransformError,
};
pub use event::{Event, Sequencer};
pub use operations::{
    Operation, OperationConfig, OperationPipeline, PipelineOutcome, TransformFailurePolicy,
};
pub use serializer::{Compression, EventFormat, Serializer};
pub use settings::ShipperSettings;
pub use transport::{DeliveryOutcome, Transport};
