//! Concurrent HTTP GET load generator.
//!
//! A [`controller::RunController`] fills a [`pool::RequestPool`] with
//! pregenerated requests, lets a [`dispatcher::Dispatcher`] issue them under a
//! concurrency cap, folds every [`statistics::RequestResult`] in a single
//! [`aggregator::Aggregator`], and hands the drained [`statistics::Stats`] to
//! [`report::Report`].

pub mod aggregator;
pub mod client;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod report;
pub mod signals;
pub mod statistics;
