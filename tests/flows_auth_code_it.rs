#![cfg(feature = "reqwest")]

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::prelude::*;
// self
use oidc_session::{
	_preludet::*,
	crypto::PkceChallenge,
	flow::{RecordingDispatcher, RenderingHints},
	protocol::AuthorizationRequest,
};

const CLIENT_ID: &str = "client-native";
const REDIRECT_URI: &str = "com.example.app:/oauth2redirect";

fn build_authorization_request(server: &MockServer) -> AuthorizationRequest {
	AuthorizationRequest::builder(
		test_service_config(&server.base_url()),
		CLIENT_ID,
		Url::parse(REDIRECT_URI).expect("Redirect URI should parse."),
	)
	.scope("openid profile")
	.code_challenge(PkceChallenge::generate())
	.build()
	.expect("Authorization request should build.")
}

fn mint_id_token(issuer: &str, nonce: &str, now: OffsetDateTime) -> String {
	let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(format!(
		r#"{{"iss":"{issuer}","sub":"user-1","aud":"{CLIENT_ID}","exp":{},"iat":{},"nonce":"{nonce}"}}"#,
		now.unix_timestamp() + 300,
		now.unix_timestamp(),
	));

	format!("{header}.{payload}.sig")
}

#[tokio::test]
async fn authorization_walk_exchanges_the_code_with_pkce() {
	let server = MockServer::start_async().await;
	let (coordinator, _store) =
		build_reqwest_test_coordinator(test_service_config(&server.base_url()), CLIENT_ID);
	let agent = RecordingDispatcher::default();
	let request = build_authorization_request(&server);
	let state = request.state.clone();
	let nonce = request.nonce.clone();
	let verifier = request
		.code_challenge
		.as_ref()
		.expect("Authorization request should carry a PKCE challenge.")
		.verifier()
		.to_owned();

	coordinator
		.begin_authorization_flow(request, &agent, &RenderingHints::default())
		.await
		.expect("Authorization flow should start.");

	let dispatched = agent.dispatched();

	assert_eq!(dispatched.len(), 1);
	assert!(
		dispatched[0].query_pairs().any(|(k, v)| k == "state" && v == state.as_str()),
		"Dispatched URI should carry the CSRF state."
	);
	assert!(
		dispatched[0].query_pairs().any(|(k, _)| k == "code_challenge"),
		"Dispatched URI should carry the PKCE challenge."
	);

	let callback = Url::parse(&format!("{REDIRECT_URI}?code=CODE-1&state={state}"))
		.expect("Callback URI should parse.");
	let response = coordinator
		.resolve_authorization_callback(&callback)
		.await
		.expect("Matching callback should resolve successfully.");

	assert_eq!(response.code.as_deref(), Some("CODE-1"));

	let id_token = mint_id_token(&server.base_url(), &nonce, OffsetDateTime::now_utc());
	let mock = server
		.mock_async(move |when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("grant_type=authorization_code")
				.body_includes("code=CODE-1")
				.body_includes(&format!("code_verifier={verifier}"));
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"access_token\":\"access-1\",\"token_type\":\"bearer\",\"expires_in\":3600,\"id_token\":\"{id_token}\"}}",
			));
		})
		.await;
	let token_response = coordinator
		.exchange_authorization_code()
		.await
		.expect("Code exchange with a valid ID token should succeed.");

	mock.assert_async().await;

	assert_eq!(token_response.access_token.as_deref(), Some("access-1"));
	assert!(coordinator.state().id_token().is_some());
}

#[tokio::test]
async fn forged_callback_state_never_reaches_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let (coordinator, _store) =
		build_reqwest_test_coordinator(test_service_config(&server.base_url()), CLIENT_ID);
	let agent = RecordingDispatcher::default();

	coordinator
		.begin_authorization_flow(
			build_authorization_request(&server),
			&agent,
			&RenderingHints::default(),
		)
		.await
		.expect("Authorization flow should start.");

	let callback = Url::parse(&format!("{REDIRECT_URI}?code=CODE-1&state=forged"))
		.expect("Callback URI should parse.");
	let err = coordinator
		.resolve_authorization_callback(&callback)
		.await
		.expect_err("A forged state should fail the callback.");

	assert_eq!(err, Error::StateMismatch);

	let err = coordinator
		.exchange_authorization_code()
		.await
		.expect_err("No authorization response should be available after a forged callback.");

	assert!(matches!(err, Error::ClientConfiguration(_)));
}

#[tokio::test]
async fn tampered_id_token_nonce_discards_the_exchange() {
	let server = MockServer::start_async().await;
	let (coordinator, _store) =
		build_reqwest_test_coordinator(test_service_config(&server.base_url()), CLIENT_ID);
	let agent = RecordingDispatcher::default();
	let request = build_authorization_request(&server);
	let state = request.state.clone();

	coordinator
		.begin_authorization_flow(request, &agent, &RenderingHints::default())
		.await
		.expect("Authorization flow should start.");
	coordinator
		.resolve_authorization_callback(
			&Url::parse(&format!("{REDIRECT_URI}?code=CODE-1&state={state}"))
				.expect("Callback URI should parse."),
		)
		.await
		.expect("Matching callback should resolve successfully.");

	let id_token = mint_id_token(&server.base_url(), "injected-nonce", OffsetDateTime::now_utc());

	server
		.mock_async(move |when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"access_token\":\"access-1\",\"token_type\":\"bearer\",\"id_token\":\"{id_token}\"}}",
			));
		})
		.await;

	let err = coordinator
		.exchange_authorization_code()
		.await
		.expect_err("A nonce mismatch should discard the exchange.");

	assert!(matches!(err, Error::IdTokenValidation(_)));
	assert_eq!(coordinator.state().access_token(), None);
}
