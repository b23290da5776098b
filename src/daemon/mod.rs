//! The backup daemon: services, backup core and HTTP surface.

pub mod backups;
pub mod http;
pub mod paths;
pub mod services;
pub mod startup;
