pub mod aggregate;
pub mod changes;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gps;
pub mod ingest;
pub mod metrics;
pub mod output;
pub mod qr_status;
pub mod reference;
pub mod session;
