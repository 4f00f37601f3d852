//! Immutable OAuth 2.0 / OpenID Connect request and response value objects.
//!
//! Every request type validates at construction time, rejects additional
//! parameters that collide with reserved parameter names, encodes to its
//! canonical wire form, and round-trips exactly through serde JSON.

pub mod authorization;
pub mod end_session;
pub mod registration;
pub mod token;

pub use authorization::*;
pub use end_session::*;
pub use registration::*;
pub use token::*;

// self
use crate::{_prelude::*, error::ClientConfigError};

pub(crate) fn require_non_empty(name: &str, value: &str) -> Result<(), ClientConfigError> {
	if value.trim().is_empty() {
		Err(ClientConfigError::MissingArgument { name: name.to_owned() })
	} else {
		Ok(())
	}
}

/// Redirect URIs must be absolute and free of embedded credentials, query,
/// and fragment, so the echoed callback is byte-comparable to what was sent.
pub(crate) fn validate_redirect_uri(uri: &Url) -> Result<(), ClientConfigError> {
	if uri.cannot_be_a_base() {
		return Err(ClientConfigError::InvalidRedirect {
			reason: "redirect URI must be an absolute hierarchical URI".into(),
		});
	}
	if !uri.username().is_empty() || uri.password().is_some() {
		return Err(ClientConfigError::InvalidRedirect {
			reason: "redirect URI must not embed credentials".into(),
		});
	}
	if uri.query().is_some() {
		return Err(ClientConfigError::InvalidRedirect {
			reason: "redirect URI must not carry a query component".into(),
		});
	}
	if uri.fragment().is_some() {
		return Err(ClientConfigError::InvalidRedirect {
			reason: "redirect URI must not carry a fragment".into(),
		});
	}

	Ok(())
}

pub(crate) fn ensure_no_reserved(
	additional: &BTreeMap<String, String>,
	reserved: &[&str],
) -> Result<(), ClientConfigError> {
	for name in additional.keys() {
		if reserved.contains(&name.as_str()) {
			return Err(ClientConfigError::ReservedParameter { name: name.clone() });
		}
	}

	Ok(())
}
