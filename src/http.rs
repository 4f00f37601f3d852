//! Transport primitives for token endpoint exchanges.
//!
//! The crate's only dependency on an HTTP stack is the [`HttpTransport`]
//! trait. Non-2xx responses travel back as ordinary [`HttpResponse`] values so
//! the exchange layer can attempt OAuth error-body parsing before classifying
//! the failure as a network problem. Transport-specific errors are reduced to
//! a message string at this boundary and never leak further up.

// self
use crate::_prelude::*;

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// HTTP methods the exchange layer issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
	/// GET request.
	Get,
	/// POST request.
	Post,
}

/// Outbound request handed to the transport.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// Request method.
	pub method: HttpMethod,
	/// Target URL.
	pub url: Url,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Request body bytes, when present.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Builds a POST request carrying an already-encoded body.
	pub fn post(url: Url, content_type: &str, body: Vec<u8>) -> Self {
		Self {
			method: HttpMethod::Post,
			url,
			headers: vec![
				("Content-Type".to_owned(), content_type.to_owned()),
				("Accept".to_owned(), "application/json".to_owned()),
			],
			body: Some(body),
		}
	}

	/// Appends a header pair.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}
}

/// Response returned by the transport, success or not.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Transport-level failure (DNS, TCP, TLS, timeout), reduced to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("{message}")]
pub struct TransportError {
	/// Human-readable transport failure summary.
	pub message: String,
}
impl TransportError {
	/// Wraps a transport-specific error value.
	pub fn new(source: impl Display) -> Self {
		Self { message: source.to_string() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::new(e)
	}
}

/// Abstraction over HTTP stacks capable of executing token endpoint requests.
///
/// Implementations must be `Send + Sync` so one transport can serve the
/// session coordinator and any number of concurrent refresh waiters. Timeout
/// policy belongs to the implementation; the coordinator imposes none of its
/// own beyond requiring that every call eventually resolves.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes the request, returning the response even for non-2xx statuses.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse>;
}

/// [`HttpTransport`] backed by reqwest.
///
/// Token requests must not follow redirects; token endpoints answer directly
/// instead of delegating to another URI, so the default constructor disables
/// redirect following. Callers supplying their own [`ReqwestClient`] through
/// [`ReqwestHttpTransport::with_client`] should configure the same policy.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpTransport {
	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestHttpTransport {
	fn default() -> Self {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Default reqwest client construction must not fail.");

		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = match request.method {
				HttpMethod::Get => client.get(request.url),
				HttpMethod::Post => client.post(request.url),
			};

			for (name, value) in request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, body })
		})
	}
}
