//! backupd: point-in-time backup, download and restore of a self-hosted
//! application server's state.
//!
//! - [`auth`] - Session and file-access tokens
//! - [`config`] - TOML configuration
//! - [`daemon`] - Backup core, storage services and HTTP API
//! - [`commands`] - CLI entry points

#![deny(unsafe_code)]

pub mod auth;
pub mod commands;
pub mod config;
pub mod daemon;
