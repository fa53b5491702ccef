//! This crate provides a transformer for ditau physics ntuples. It consumes transform requests
//! from a message queue, and for each requested file it selects events, adds top quark and W
//! boson reconstruction variables, and writes the result to an output file that is published
//! to an object store or left on a shared volume.
//!
//! Progress of each file is reported to the coordinating service over HTTP, and failed requests
//! are published to a failure exchange on the message broker. Each request message is
//! acknowledged exactly once, after its outcome has been reported.
//!
//! The transformer is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [lapin] is an AMQP client used to consume requests from RabbitMQ.
//! * [reqwest] sends status updates to the coordinating service.
//! * [Serde](serde) performs (de)serialisation of JSON messages and tree files.
//! * [AWS SDK for S3](aws-sdk-s3) is used to upload outputs to S3-compatible object stores.
//! * [Rayon](rayon) optionally parallelises the reconstruction across events.
//! * [Axum](axum) serves Prometheus metrics and a health check.

pub mod app;
pub mod cli;
pub mod compression;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod object_store;
pub mod reconstruction;
pub mod s3_client;
pub mod selection;
pub mod server;
pub mod status;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod transform;
pub mod tree_file;
pub mod types;
pub mod validated_json;
pub mod worker;
