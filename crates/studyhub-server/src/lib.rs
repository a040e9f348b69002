//! # StudyHub Server
//!
//! Realtime hub for StudyHub: users receive direct messages and read
//! receipts in their user room, and approved members join study group rooms.
//!
//! The binary wires these modules together; the library exists so the
//! integration tests can mount the same [`handlers::app`].

pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;
