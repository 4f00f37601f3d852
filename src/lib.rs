//! OAuth 2.0 / OpenID Connect client for native apps—PKCE-guarded authorization flows across an
//! external user-agent, single-flight token refresh, and ID Token validation in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod crypto;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod http;
pub mod id_token;
pub mod obs;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		exchange::TokenExchangeClient,
		http::ReqwestHttpTransport,
		provider::ServiceConfig,
		session::SessionCoordinator,
		store::{MemoryStore, StateStore},
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestHttpTransport {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpTransport::with_client(client)
	}

	/// Service configuration pointing every endpoint at a mock provider base URL.
	pub fn test_service_config(base_url: &str) -> ServiceConfig {
		let endpoint = |path: &str| {
			Url::parse(&format!("{base_url}{path}"))
				.expect("Failed to build mock provider endpoint URL.")
		};

		ServiceConfig::new(endpoint("/authorize"), endpoint("/token"))
			.with_issuer(endpoint("/"))
			.with_end_session_endpoint(endpoint("/logout"))
			.with_registration_endpoint(endpoint("/register"))
	}

	/// Constructs a [`SessionCoordinator`] backed by an in-memory store and the reqwest
	/// transport used across integration tests.
	pub fn build_reqwest_test_coordinator(
		config: ServiceConfig,
		client_id: &str,
	) -> (SessionCoordinator, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn StateStore> = store_backend.clone();
		let exchange = TokenExchangeClient::new(Arc::new(test_reqwest_transport()))
			.relax_issuer_https();
		let coordinator = SessionCoordinator::new(config, client_id, exchange).store(store);

		(coordinator, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {httpmock as _, oidc_session as _};
