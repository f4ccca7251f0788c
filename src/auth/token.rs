//! Token records persisted per user and the secret wrapper that keeps them out of logs.

pub mod record;
pub mod secret;
