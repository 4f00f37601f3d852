//! Dynamic client registration request/response records (RFC 7591).

// self
use crate::{_prelude::*, error::ClientConfigError, protocol, provider::ServiceConfig};

const RESERVED: &[&str] = &[
	"redirect_uris",
	"response_types",
	"grant_types",
	"application_type",
	"subject_type",
	"token_endpoint_auth_method",
];

/// Immutable dynamic client registration request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
	/// Provider metadata the request targets.
	pub config: ServiceConfig,
	/// Redirect URIs the client registers.
	pub redirect_uris: Vec<Url>,
	/// Response types the client will use.
	pub response_types: Option<Vec<String>>,
	/// Grant types the client will use.
	pub grant_types: Option<Vec<String>>,
	/// Subject identifier type.
	pub subject_type: Option<String>,
	/// Requested token endpoint authentication method.
	pub token_endpoint_auth_method: Option<String>,
	/// Extra registration metadata fields.
	pub additional_parameters: BTreeMap<String, String>,
}
impl RegistrationRequest {
	/// Returns a builder carrying the mandatory redirect URIs.
	pub fn builder(config: ServiceConfig, redirect_uris: Vec<Url>) -> RegistrationRequestBuilder {
		RegistrationRequestBuilder {
			config,
			redirect_uris,
			response_types: None,
			grant_types: None,
			subject_type: None,
			token_endpoint_auth_method: None,
			additional_parameters: BTreeMap::new(),
		}
	}

	/// Encodes the registration metadata as the JSON request body.
	pub fn to_json_body(&self) -> String {
		let mut body = serde_json::Map::new();

		body.insert(
			"application_type".to_owned(),
			serde_json::Value::String("native".to_owned()),
		);
		body.insert(
			"redirect_uris".to_owned(),
			serde_json::Value::Array(
				self.redirect_uris
					.iter()
					.map(|uri| serde_json::Value::String(uri.to_string()))
					.collect(),
			),
		);

		if let Some(values) = &self.response_types {
			body.insert("response_types".to_owned(), string_array(values));
		}
		if let Some(values) = &self.grant_types {
			body.insert("grant_types".to_owned(), string_array(values));
		}
		if let Some(value) = &self.subject_type {
			body.insert("subject_type".to_owned(), serde_json::Value::String(value.clone()));
		}
		if let Some(value) = &self.token_endpoint_auth_method {
			body.insert(
				"token_endpoint_auth_method".to_owned(),
				serde_json::Value::String(value.clone()),
			);
		}
		for (key, value) in &self.additional_parameters {
			body.insert(key.clone(), serde_json::Value::String(value.clone()));
		}

		serde_json::Value::Object(body).to_string()
	}
}

fn string_array(values: &[String]) -> serde_json::Value {
	serde_json::Value::Array(
		values.iter().map(|value| serde_json::Value::String(value.clone())).collect(),
	)
}

/// Fixed-field builder for [`RegistrationRequest`]; validates then freezes.
#[derive(Clone, Debug)]
pub struct RegistrationRequestBuilder {
	config: ServiceConfig,
	redirect_uris: Vec<Url>,
	response_types: Option<Vec<String>>,
	grant_types: Option<Vec<String>>,
	subject_type: Option<String>,
	token_endpoint_auth_method: Option<String>,
	additional_parameters: BTreeMap<String, String>,
}
impl RegistrationRequestBuilder {
	/// Sets the response types to register.
	pub fn response_types(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.response_types = Some(values.into_iter().map(Into::into).collect());

		self
	}

	/// Sets the grant types to register.
	pub fn grant_types(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.grant_types = Some(values.into_iter().map(Into::into).collect());

		self
	}

	/// Sets the subject identifier type.
	pub fn subject_type(mut self, value: impl Into<String>) -> Self {
		self.subject_type = Some(value.into());

		self
	}

	/// Sets the requested token endpoint authentication method.
	pub fn token_endpoint_auth_method(mut self, value: impl Into<String>) -> Self {
		self.token_endpoint_auth_method = Some(value.into());

		self
	}

	/// Adds one additional registration metadata field.
	pub fn additional_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.additional_parameters.insert(key.into(), value.into());

		self
	}

	/// Validates the assembled fields and freezes the request.
	pub fn build(self) -> Result<RegistrationRequest, ClientConfigError> {
		if self.redirect_uris.is_empty() {
			return Err(ClientConfigError::MissingArgument { name: "redirect_uris".to_owned() });
		}
		for uri in &self.redirect_uris {
			protocol::validate_redirect_uri(uri)?;
		}

		protocol::ensure_no_reserved(&self.additional_parameters, RESERVED)?;

		Ok(RegistrationRequest {
			config: self.config,
			redirect_uris: self.redirect_uris,
			response_types: self.response_types,
			grant_types: self.grant_types,
			subject_type: self.subject_type,
			token_endpoint_auth_method: self.token_endpoint_auth_method,
			additional_parameters: self.additional_parameters,
		})
	}
}

/// Registration endpoint response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResponse {
	/// Issued client identifier.
	pub client_id: String,
	/// Issued client secret, for confidential clients.
	pub client_secret: Option<String>,
	/// Client secret expiry (epoch seconds; zero means never).
	pub client_secret_expires_at: Option<i64>,
	/// Token for managing the registration.
	pub registration_access_token: Option<String>,
	/// URI for managing the registration.
	pub registration_client_uri: Option<Url>,
	/// Authentication method the provider assigned.
	pub token_endpoint_auth_method: Option<String>,
	/// Unrecognized response fields.
	pub additional_parameters: BTreeMap<String, serde_json::Value>,
}
impl RegistrationResponse {
	/// Validates a decoded wire body against the RFC 7591 presence rules.
	///
	/// - `client_secret_expires_at` is required iff `client_secret` is present;
	/// - `registration_access_token` and `registration_client_uri` come
	///   both-or-neither.
	///
	/// Each violation is a [`ClientConfigError::MissingArgument`] naming the
	/// absent field, not a generic parse error.
	pub fn from_wire(wire: RegistrationResponseWire) -> Result<Self, ClientConfigError> {
		let RegistrationResponseWire {
			client_id,
			client_secret,
			client_secret_expires_at,
			registration_access_token,
			registration_client_uri,
			token_endpoint_auth_method,
			additional_parameters,
		} = wire;
		let client_id =
			client_id.ok_or(ClientConfigError::MissingArgument { name: "client_id".to_owned() })?;

		if client_secret.is_some() && client_secret_expires_at.is_none() {
			return Err(ClientConfigError::MissingArgument {
				name: "client_secret_expires_at".to_owned(),
			});
		}

		match (&registration_access_token, &registration_client_uri) {
			(Some(_), None) =>
				return Err(ClientConfigError::MissingArgument {
					name: "registration_client_uri".to_owned(),
				}),
			(None, Some(_)) =>
				return Err(ClientConfigError::MissingArgument {
					name: "registration_access_token".to_owned(),
				}),
			_ => {},
		}

		Ok(Self {
			client_id,
			client_secret,
			client_secret_expires_at,
			registration_access_token,
			registration_client_uri,
			token_endpoint_auth_method,
			additional_parameters,
		})
	}
}

/// Raw registration endpoint JSON body.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationResponseWire {
	/// `client_id` field.
	#[serde(default)]
	pub client_id: Option<String>,
	/// `client_secret` field.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// `client_secret_expires_at` field.
	#[serde(default)]
	pub client_secret_expires_at: Option<i64>,
	/// `registration_access_token` field.
	#[serde(default)]
	pub registration_access_token: Option<String>,
	/// `registration_client_uri` field.
	#[serde(default)]
	pub registration_client_uri: Option<Url>,
	/// `token_endpoint_auth_method` field.
	#[serde(default)]
	pub token_endpoint_auth_method: Option<String>,
	/// Everything else in the body.
	#[serde(flatten)]
	pub additional_parameters: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config() -> ServiceConfig {
		ServiceConfig::new(
			Url::parse("https://idp.example.com/authorize").expect("Authorize URL should parse."),
			Url::parse("https://idp.example.com/token").expect("Token URL should parse."),
		)
	}

	fn wire(body: &str) -> RegistrationResponseWire {
		serde_json::from_str(body).expect("Wire body fixture should decode.")
	}

	#[test]
	fn builder_requires_redirect_uris() {
		let err = RegistrationRequest::builder(config(), Vec::new())
			.build()
			.expect_err("Empty redirect URI list should be rejected.");

		assert!(
			matches!(err, ClientConfigError::MissingArgument { name } if name == "redirect_uris")
		);
	}

	#[test]
	fn json_body_includes_metadata_fields() {
		let request = RegistrationRequest::builder(
			config(),
			vec![Url::parse("https://app.example.com/cb").expect("Redirect URL should parse.")],
		)
		.response_types(["code"])
		.grant_types(["authorization_code", "refresh_token"])
		.token_endpoint_auth_method("none")
		.build()
		.expect("Registration request fixture should build.");
		let body: serde_json::Value = serde_json::from_str(&request.to_json_body())
			.expect("Encoded body should be valid JSON.");

		assert_eq!(body["application_type"], "native");
		assert_eq!(body["redirect_uris"][0], "https://app.example.com/cb");
		assert_eq!(body["grant_types"][1], "refresh_token");
		assert_eq!(body["token_endpoint_auth_method"], "none");
	}

	#[test]
	fn secret_without_expiry_is_a_missing_argument() {
		let err =
			RegistrationResponse::from_wire(wire(r#"{"client_id":"c1","client_secret":"s1"}"#))
				.expect_err("Secret without expiry should be rejected.");

		assert!(
			matches!(err, ClientConfigError::MissingArgument { name } if name == "client_secret_expires_at")
		);
	}

	#[test]
	fn registration_management_fields_come_both_or_neither() {
		let err = RegistrationResponse::from_wire(wire(
			r#"{"client_id":"c1","registration_access_token":"rat"}"#,
		))
		.expect_err("Dangling registration access token should be rejected.");

		assert!(
			matches!(err, ClientConfigError::MissingArgument { name } if name == "registration_client_uri")
		);

		let err = RegistrationResponse::from_wire(wire(
			r#"{"client_id":"c1","registration_client_uri":"https://idp.example.com/reg/c1"}"#,
		))
		.expect_err("Dangling registration client URI should be rejected.");

		assert!(
			matches!(err, ClientConfigError::MissingArgument { name } if name == "registration_access_token")
		);
	}

	#[test]
	fn valid_response_round_trips_through_json() {
		let response = RegistrationResponse::from_wire(wire(
			r#"{
				"client_id": "c1",
				"client_secret": "s1",
				"client_secret_expires_at": 0,
				"registration_access_token": "rat",
				"registration_client_uri": "https://idp.example.com/reg/c1",
				"custom": 7
			}"#,
		))
		.expect("Valid registration response should be accepted.");
		let blob = serde_json::to_string(&response).expect("Response should serialize.");
		let round_trip: RegistrationResponse =
			serde_json::from_str(&blob).expect("Serialized response should deserialize.");

		assert_eq!(response, round_trip);
	}
}
