#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # About SWR Query
//!
//!
//! SWR Query is a data-fetching and caching layer for [Leptos](https://github.com/leptos-rs/leptos) and other subscriber-based UIs.
//!
//! Queries are useful for data fetching, caching, and synchronization with server state.
//!
//! A Query provides:
//! - caching with per-value cache lifetimes
//! - stale-while-revalidate: cached data is served while a refetch runs
//! - de-duplication: one query per key, shared by every consumer
//! - invalidation, by key or by key prefix
//! - retries with a configurable back-off policy
//! - dependencies on other queries and on signals
//! - optimistic updates
//!
//!
//! ## The main entry points to using Queries are:
//! - [`use_query`](crate::use_query::use_query()) - Creates or reuses the query under a key, using the client in context.
//! - [`QueryClient`] - The registry itself, with [`invalidate`](QueryClient::invalidate), [`refetch`](QueryClient::refetch), [`update_data`](QueryClient::update_data) and friends.
//!
//! # Feature Flags
//! - `csr` Client-side rendering: timers and fetches run on the browser event loop.
//! - `ssr` Server-side rendering: timers and fetches run on a tokio `LocalSet`. Enabled by default.
//!
//! # A Simple Example
//!
//! In the root of your App, provide a query client with [provide_query_client].
//!
//! ```rust
//! use swr_query::*;
//! use leptos::*;
//!
//! #[component]
//! pub fn App() -> impl IntoView {
//!     // Provides Query Client for entire app.
//!     provide_query_client();
//!
//!     // Rest of App...
//! }
//! ```
//!
//! Then make a query function with [`use_query`](crate::use_query::use_query()).
//!
//! ```
//! use leptos::*;
//! use swr_query::*;
//! use std::time::Duration;
//!
//! // The result of the query fetcher.
//! #[derive(Debug, Clone, PartialEq)]
//! struct TrackData {
//!    name: String,
//! }
//!
//! // Query fetcher.
//! async fn get_track(id: u32) -> FetchResult<TrackData, String> {
//!     todo!()
//! }
//!
//! // Query for a track.
//! fn track_query(id: u32) -> Query<TrackData, String> {
//!     use_query(
//!         ("track", id),
//!         move || get_track(id),
//!         QueryOptions::default().set_stale_time(Duration::from_secs(30)),
//!     )
//! }
//! ```
//!
//! Subscribe to its result, or read it as a signal inside a component.
//!
//! ```
//! # use leptos::*;
//! # use swr_query::*;
//! #
//! # #[derive(Debug, Clone, PartialEq)]
//! # struct TrackData {
//! #    name: String,
//! # }
//! # fn track_query(id: u32) -> Query<TrackData, String> {
//! #     todo!()
//! # }
//! #
//! fn track_name(id: u32) -> Signal<String> {
//!     let result = track_query(id).signal();
//!     Signal::derive(move || match result.get() {
//!         QueryResult::Ok(track) => track.name,
//!         QueryResult::Err { err, .. } => err,
//!         QueryResult::Loading | QueryResult::Idle => "Loading...".to_string(),
//!     })
//! }
//! ```
//!

/// Subcriptions to registry events.
pub mod cache_observer;
mod dependency;
mod instant;
mod query;
mod query_cache;
mod query_client;
mod query_executor;
mod query_key;
mod query_observer;
mod query_options;
mod query_result;
mod query_state;
mod timeout;
mod use_query;

pub use dependency::{Dependency, DependencyAction, Observed, StaleAction};
pub use instant::*;
pub use query::Query;
pub use query_client::*;
pub use query_key::*;
pub use query_observer::Subscription;
pub use query_options::*;
pub use query_result::*;
pub use use_query::*;

/// Convenience trait for query value and error requirements.
pub trait QueryValue: std::fmt::Debug + Clone + PartialEq + 'static {}
impl<V> QueryValue for V where V: std::fmt::Debug + Clone + PartialEq + 'static {}
