//! Single-flight refresh coordination and pending-flow ownership.
//!
//! The coordinator owns the [`AuthorizationState`], at most one pending flow
//! per flow kind, and the refresh gate. Concurrent callers that need a fresh
//! access token trigger at most one token endpoint exchange: the first caller
//! through the gate performs it, queued callers adopt its recorded outcome.
//! The exchange itself runs outside the state lock, so unrelated state reads
//! never block on the network.

// self
use crate::{
	_prelude::*,
	error::ClientConfigError,
	exchange::{ClientAuthentication, TokenExchangeClient},
	flow::{
		FlowRequest, FlowResolution, FlowResponse, FlowType, PendingFlow, RenderingHints,
		UserAgentDispatcher,
	},
	obs::{self, FlowKind, FlowOutcome},
	protocol::{
		AuthorizationRequest, AuthorizationResponse, EndSessionRequest, EndSessionResponse,
		RegistrationRequest, RegistrationResponse, TokenRequest, TokenResponse,
	},
	provider::ServiceConfig,
	session::AuthorizationState,
	store::{StateStore, StoreError},
};

/// Token material handed to callers of [`SessionCoordinator::fresh_access_token`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
	/// Bearer access token.
	pub access_token: String,
	/// Expiry, if the provider reported one.
	pub access_token_expiry: Option<OffsetDateTime>,
	/// Raw ID token accompanying the access token, if any.
	pub id_token: Option<String>,
}

#[derive(Default)]
struct RefreshCell {
	epoch: u64,
	last_outcome: Option<Result<TokenSnapshot>>,
}

/// On-disk session image: the authorization state plus any flow still waiting
/// for its callback, so a dispatched flow survives process recreation.
///
/// The state is flattened, which keeps blobs written before flow persistence
/// existed loadable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
	#[serde(flatten)]
	state: AuthorizationState,
	#[serde(default)]
	pending_authorization: Option<PendingFlow>,
	#[serde(default)]
	pending_end_session: Option<PendingFlow>,
}

/// Coordinates one authorization session against one provider.
pub struct SessionCoordinator {
	config: ServiceConfig,
	client_id: String,
	client_auth: ClientAuthentication,
	exchange: TokenExchangeClient,
	store: Option<Arc<dyn StateStore>>,
	state: RwLock<AuthorizationState>,
	refresh_gate: AsyncMutex<()>,
	refresh_cell: Mutex<RefreshCell>,
	force_refresh: Mutex<bool>,
	pending_authorization: Mutex<Option<PendingFlow>>,
	pending_end_session: Mutex<Option<PendingFlow>>,
}
impl SessionCoordinator {
	/// Creates a coordinator bound to the provider's endpoints.
	pub fn new(
		config: ServiceConfig,
		client_id: impl Into<String>,
		exchange: TokenExchangeClient,
	) -> Self {
		Self {
			config,
			client_id: client_id.into(),
			client_auth: ClientAuthentication::None,
			exchange,
			store: None,
			state: RwLock::new(AuthorizationState::default()),
			refresh_gate: AsyncMutex::new(()),
			refresh_cell: Mutex::new(RefreshCell::default()),
			force_refresh: Mutex::new(false),
			pending_authorization: Mutex::new(None),
			pending_end_session: Mutex::new(None),
		}
	}

	/// Sets the client authentication used on token endpoint exchanges.
	pub fn client_authentication(mut self, client_auth: ClientAuthentication) -> Self {
		self.client_auth = client_auth;

		self
	}

	/// Attaches a durable store; persistence is best-effort and never blocks
	/// protocol work.
	pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Loads previously persisted state from the attached store, re-attaching
	/// any flow that was still waiting for its callback.
	///
	/// A missing or corrupt blob restores an empty session.
	pub async fn restore(&self) -> Result<()> {
		let Some(store) = &self.store else { return Ok(()) };
		let blob = store.load().await.map_err(Error::Storage)?;

		if let Some(blob) = blob {
			let session: PersistedSession = serde_json::from_str(&blob).unwrap_or_default();

			*self.state.write() = session.state;
			*self.pending_authorization.lock() = session.pending_authorization;
			*self.pending_end_session.lock() = session.pending_end_session;
		}

		Ok(())
	}

	/// Snapshot of the current session state.
	pub fn state(&self) -> AuthorizationState {
		self.state.read().clone()
	}

	/// Provider configuration this session is bound to.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Marks the stored access token as needing a refresh before next use.
	pub fn set_needs_token_refresh(&self) {
		*self.force_refresh.lock() = true;
	}

	/// Starts an authorization flow by handing its URI to the user-agent.
	///
	/// The dispatched flow is persisted so a process restart can still resolve
	/// the callback.
	pub async fn begin_authorization_flow(
		&self,
		request: AuthorizationRequest,
		agent: &dyn UserAgentDispatcher,
		hints: &RenderingHints,
	) -> Result<()> {
		Self::begin_flow(
			&self.pending_authorization,
			FlowRequest::Authorization(request),
			agent,
			hints,
		)?;
		self.persist().await;

		Ok(())
	}

	/// Starts an end-session flow by handing its URI to the user-agent.
	pub async fn begin_end_session_flow(
		&self,
		request: EndSessionRequest,
		agent: &dyn UserAgentDispatcher,
		hints: &RenderingHints,
	) -> Result<()> {
		Self::begin_flow(&self.pending_end_session, FlowRequest::EndSession(request), agent, hints)?;
		self.persist().await;

		Ok(())
	}

	fn begin_flow(
		slot: &Mutex<Option<PendingFlow>>,
		request: FlowRequest,
		agent: &dyn UserAgentDispatcher,
		hints: &RenderingHints,
	) -> Result<()> {
		let flow_type = request.flow_type();
		let mut guard = slot.lock();

		if guard.as_ref().is_some_and(|flow| !flow.is_resolved()) {
			return Err(ClientConfigError::FlowAlreadyActive { kind: flow_type.to_string() }.into());
		}

		obs::record_flow_outcome(FlowKind::from(flow_type), FlowOutcome::Attempt);

		let mut flow = PendingFlow::new(request);

		match flow.dispatch(agent, hints) {
			Ok(()) => {
				*guard = Some(flow);

				Ok(())
			},
			Err(e) => {
				obs::record_flow_outcome(FlowKind::from(flow_type), FlowOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Resolves the pending authorization flow from a redirect callback.
	///
	/// A protocol error or state mismatch is recorded into the session state;
	/// cancellations are returned to the caller without being recorded.
	pub async fn resolve_authorization_callback(
		&self,
		callback: &Url,
	) -> Result<AuthorizationResponse> {
		let resolution = Self::resolve_flow(&self.pending_authorization, FlowType::Authorization, |flow| {
			flow.resolve_callback(callback)
		})?;
		let outcome = match resolution {
			FlowResolution::Success(FlowResponse::Authorization(response)) => Ok(response),
			FlowResolution::Canceled => return Err(Error::UserCanceled),
			FlowResolution::Error(e) => Err(e),
			FlowResolution::Success(_) => {
				return Err(ClientConfigError::NoActiveFlow {
					kind: FlowType::Authorization.to_string(),
				}
				.into());
			},
		};

		self.state.write().update_authorization(outcome.clone());
		self.persist().await;
		self.record_flow_resolution(FlowType::Authorization, &outcome);

		outcome
	}

	/// Resolves the pending end-session flow from a redirect callback.
	pub async fn resolve_end_session_callback(&self, callback: &Url) -> Result<EndSessionResponse> {
		let resolution = Self::resolve_flow(&self.pending_end_session, FlowType::EndSession, |flow| {
			flow.resolve_callback(callback)
		})?;
		let outcome = match resolution {
			FlowResolution::Success(FlowResponse::EndSession(response)) => Ok(response),
			FlowResolution::Canceled => return Err(Error::UserCanceled),
			FlowResolution::Error(e) => Err(e),
			FlowResolution::Success(_) => {
				return Err(ClientConfigError::NoActiveFlow {
					kind: FlowType::EndSession.to_string(),
				}
				.into());
			},
		};

		self.persist().await;
		self.record_flow_resolution(FlowType::EndSession, &outcome);

		outcome
	}

	/// Reports that the user-agent terminated without delivering a callback.
	///
	/// The abandoned flow resolves as canceled; nothing is recorded into the
	/// session state.
	pub async fn notify_flow_canceled(&self, flow_type: FlowType) -> Result<()> {
		Self::resolve_flow(self.slot(flow_type), flow_type, |flow| flow.resolve_canceled())?;
		obs::record_flow_outcome(FlowKind::from(flow_type), FlowOutcome::Failure);
		self.persist().await;

		Ok(())
	}

	/// Cancels a flow that has not yet been dispatched.
	pub fn cancel_flow(&self, flow_type: FlowType) -> Result<()> {
		let mut guard = self.slot(flow_type).lock();
		let flow = guard
			.as_mut()
			.ok_or_else(|| ClientConfigError::NoActiveFlow { kind: flow_type.to_string() })?;

		flow.cancel()?;
		*guard = None;

		Ok(())
	}

	fn slot(&self, flow_type: FlowType) -> &Mutex<Option<PendingFlow>> {
		match flow_type {
			FlowType::Authorization => &self.pending_authorization,
			FlowType::EndSession => &self.pending_end_session,
		}
	}

	fn resolve_flow(
		slot: &Mutex<Option<PendingFlow>>,
		flow_type: FlowType,
		resolve: impl FnOnce(&mut PendingFlow) -> Result<FlowResolution>,
	) -> Result<FlowResolution> {
		let mut guard = slot.lock();
		let mut flow = guard
			.take()
			.ok_or_else(|| ClientConfigError::NoActiveFlow { kind: flow_type.to_string() })?;

		resolve(&mut flow)
	}

	fn record_flow_resolution<T>(&self, flow_type: FlowType, outcome: &Result<T>) {
		let flow_outcome =
			if outcome.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

		obs::record_flow_outcome(FlowKind::from(flow_type), flow_outcome);
	}

	/// Exchanges the code from the last successful authorization response.
	pub async fn exchange_authorization_code(&self) -> Result<TokenResponse> {
		let request = {
			let state = self.state.read();
			let response = state.last_authorization_response.as_ref().ok_or(
				ClientConfigError::MissingArgument {
					name: "last_authorization_response".to_owned(),
				},
			)?;

			response.create_token_exchange_request()?
		};

		self.perform_token_exchange(&request).await
	}

	/// Registers the client dynamically and resets the session to the new
	/// client identity.
	pub async fn register_client(
		&self,
		request: &RegistrationRequest,
	) -> Result<RegistrationResponse> {
		let outcome = self.exchange.register(request).await;

		self.state.write().update_registration(outcome.clone());
		self.persist().await;

		outcome
	}

	/// Returns a fresh access token, refreshing at most once across all
	/// concurrent callers.
	///
	/// The first caller through the refresh gate performs the exchange; every
	/// caller queued behind it adopts that exchange's recorded outcome instead
	/// of issuing another one.
	pub async fn fresh_access_token(&self) -> Result<TokenSnapshot> {
		let now = OffsetDateTime::now_utc();

		if let Some(snapshot) = self.current_snapshot_if_fresh(now) {
			return Ok(snapshot);
		}

		let entry_epoch = self.refresh_cell.lock().epoch;
		let _gate = self.refresh_gate.lock().await;

		{
			let cell = self.refresh_cell.lock();

			if cell.epoch != entry_epoch
				&& let Some(outcome) = &cell.last_outcome
			{
				return outcome.clone();
			}
		}

		// The gate holder ahead of us may have refreshed before we recorded
		// our entry epoch.
		if let Some(snapshot) = self.current_snapshot_if_fresh(OffsetDateTime::now_utc()) {
			return Ok(snapshot);
		}

		let outcome = self.refresh_once().await;

		{
			let mut cell = self.refresh_cell.lock();

			cell.epoch += 1;
			cell.last_outcome = Some(outcome.clone());
		}

		outcome
	}

	/// Runs `action` with a fresh access token.
	pub async fn with_fresh_token<T, F, Fut>(&self, action: F) -> Result<T>
	where
		F: FnOnce(TokenSnapshot) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let snapshot = self.fresh_access_token().await?;

		action(snapshot).await
	}

	fn current_snapshot_if_fresh(&self, now: OffsetDateTime) -> Option<TokenSnapshot> {
		if *self.force_refresh.lock() {
			return None;
		}

		let state = self.state.read();

		if !state.is_access_token_fresh(now) {
			return None;
		}

		Some(TokenSnapshot {
			access_token: state.access_token()?.to_owned(),
			access_token_expiry: state.access_token_expiry(),
			id_token: state.id_token().map(ToOwned::to_owned),
		})
	}

	async fn refresh_once(&self) -> Result<TokenSnapshot> {
		let request = {
			let state = self.state.read();
			let refresh_token = state
				.refresh_token()
				.ok_or(ClientConfigError::MissingRefreshToken)?
				.to_owned();
			let mut builder = TokenRequest::builder(
				self.config.clone(),
				self.client_id.clone(),
				crate::protocol::GrantType::RefreshToken,
			)
			.refresh_token(refresh_token);

			if let Some(scope) = &state.scope {
				builder = builder.scope(scope.clone());
			}

			builder.build()?
		};
		let response = self.perform_token_exchange(&request).await?;
		let access_token = response.access_token.clone().ok_or(Error::MalformedResponse {
			message: "Token response carried no access token.".to_owned(),
			path: Some("access_token".to_owned()),
		})?;

		*self.force_refresh.lock() = false;

		Ok(TokenSnapshot {
			access_token,
			access_token_expiry: response.access_token_expiry,
			id_token: response.id_token.clone(),
		})
	}

	async fn perform_token_exchange(&self, request: &TokenRequest) -> Result<TokenResponse> {
		let outcome = self.exchange.exchange(request, &self.client_auth).await;

		self.state.write().update_token(outcome.clone());
		self.persist().await;

		outcome
	}

	async fn persist(&self) {
		let Some(store) = &self.store else { return };
		let session = PersistedSession {
			state: self.state.read().clone(),
			pending_authorization: self.pending_authorization.lock().clone(),
			pending_end_session: self.pending_end_session.lock().clone(),
		};
		let blob = match serde_json::to_string(&session) {
			Ok(blob) => blob,
			Err(e) => {
				obs::warn_persistence_failure(&StoreError::Serialization {
					message: e.to_string(),
				});

				return;
			},
		};

		if let Err(e) = store.save(blob).await {
			obs::warn_persistence_failure(&e);
		}
	}
}
impl Debug for SessionCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCoordinator")
			.field("client_id", &self.client_id)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}
impl From<FlowType> for FlowKind {
	fn from(flow_type: FlowType) -> Self {
		match flow_type {
			FlowType::Authorization => FlowKind::Authorization,
			FlowType::EndSession => FlowKind::EndSession,
		}
	}
}
