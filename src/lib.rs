//! Consent-aware OAuth 2.0 gateway broker with signed approval cookies, self-describing state,
//! linked secondary providers, and single-flight token refresh behind one axum router.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod approval;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod identity;
pub mod oauth;
pub mod obs;
pub mod pending;
pub mod policy;
pub mod provider;
pub mod redirect;
pub mod server;
pub mod state;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _};
