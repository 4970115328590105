//! Protocol Module
//!
//! Typed client for the community's HTTP JSON API: reading the feed,
//! publishing posts and replies, liking, and requesting a credential.

pub mod client;

pub use client::ProtocolClient;
