//! Offline cache and background sync gateway for the parcel-delivery client.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod gateway;
pub mod http;
pub mod logging;
pub mod sync;
