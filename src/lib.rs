//! mangos turns free-text descriptions of expenses into rows of a Google Sheet ledger.
//!
//! - `auth` manages the OAuth token: redirect, fragment parsing, expiry and silent refresh
//! - `extract` asks a language model for the expense entries in a piece of text
//! - `ledger` decides which rows of the ledger the entries go to and writes them
//! - `api` is the spreadsheet transport, backed by Google or by memory

pub mod api;
pub mod args;
pub mod auth;
pub mod commands;
mod config;
mod error;
pub mod extract;
pub mod ledger;
pub mod model;
mod utils;

pub use api::Mode;
pub use config::Config;
pub use error::{Error, NoSpace, Result};
