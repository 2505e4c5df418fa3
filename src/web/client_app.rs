//! Client (bank) app: login, signup and the pages that hand off to the
//! verification app.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{any, get, post},
    Form, Router,
};
use chrono::Utc;
use tracing::{error, info, warn};

use super::forms::{
    is_checked, ConsentForm, ConsultForm, CreateAccountForm, IdentityForm, LoginForm,
    MessageQuery, RegisterForm,
};
use super::pages::{self, CreateAccountStep, RegisterView};
use super::session::{BrowserSession, CLIENT_COOKIE};
use crate::api::bank::Registration;
use crate::api::types::{ConsentStatus, ConsentType, TermsAgreement, OPTIONAL_TERMS, REQUIRED_TERMS};
use crate::api::{BankApi, TrusteeApi};
use crate::config::{rewrite_trustee_path, AppConfig};
use crate::error::FlowError;
use crate::flows::{
    check_profile_match, handle_callback, initiate_verification, BridgeNotice, BridgeQuery,
    ReturnTarget,
};
use crate::protocol::{ProtocolQuery, VerificationResult};
use crate::state::{ClientContext, RegisterDraft, SharedHandoffStore};

/// Product offered through the consultation event
pub const EVENT_PRODUCT: &str = "Continue 카드";
/// Consent recorded for the partner call center
pub const EVENT_CONSENT_TYPE: &str = "3RD_PARTY_TM";

type Session = BrowserSession<ClientContext>;

/// Shared state for client app handlers
#[derive(Clone)]
pub struct ClientState {
    pub config: Arc<AppConfig>,
    pub bank: BankApi,
    pub trustee: TrusteeApi,
    pub store: SharedHandoffStore<ClientContext>,
}

impl ClientState {
    pub fn new(config: Arc<AppConfig>, http: reqwest::Client, store: SharedHandoffStore<ClientContext>) -> Self {
        Self {
            bank: BankApi::new(http.clone(), config.bank_api_url.clone()),
            trustee: TrusteeApi::new(http, config.trustee_api_url.clone()),
            config,
            store,
        }
    }

    fn session(&self, headers: &HeaderMap) -> Session {
        BrowserSession::resolve(&self.store, headers, CLIENT_COOKIE)
    }
}

/// Create client app router
pub fn client_router(state: ClientState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .route("/login", get(login).post(login_submit))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .route("/signup", get(signup).post(signup_submit))
        .route("/register", get(register).post(register_submit))
        .route("/register/verify", post(register_verify))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/bridge", get(bridge))
        .route(
            "/account-verification",
            get(account_verification).post(account_verification_submit),
        )
        .route("/create-account", get(create_account).post(create_account_submit))
        .route("/create-account/verify", post(create_account_verify))
        .route("/find-id", get(find_id).post(find_id_submit))
        .route("/mypage", get(mypage))
        .route("/mypage/consent", post(mypage_consent))
        .route("/events/consult", post(consult))
        .route("/trustee-api/*rest", any(trustee_proxy))
        .with_state(state)
}

/// Logged-in username, or a redirect to the login page.
fn require_login(session: &Session) -> Result<String, Response> {
    session
        .ctx
        .logged_in_user
        .clone()
        .ok_or_else(|| session.respond(Redirect::to("/login")))
}

fn with_message(path: &str, message: &str) -> String {
    format!("{}?message={}", path, urlencoding::encode(message))
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

async fn login(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<MessageQuery>,
) -> Response {
    let session = state.session(&headers);
    if session.ctx.is_logged_in() {
        return session.respond(Redirect::to("/dashboard"));
    }
    session.respond(Html(pages::login_page(query.message.as_deref())))
}

async fn login_submit(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let mut session = state.session(&headers);
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return session.respond(Html(pages::login_page(Some(
            "Please enter your username and password.",
        ))));
    }

    match state.bank.login(username, &form.password).await {
        Ok(profile) => {
            info!("{} logged in", username);
            session.ctx.logged_in_user = Some(username.to_string());
            session.ctx.user_profile = Some(profile);
            session.save(&state.store);
            session.respond(Redirect::to("/dashboard"))
        }
        Err(e) => {
            warn!("Login failed for {}: {}", username, e);
            let message = format!("Login failed: {}", e.user_message());
            session.respond(Html(pages::login_page(Some(&message))))
        }
    }
}

async fn logout(State(state): State<ClientState>, headers: HeaderMap) -> Response {
    let session = state.session(&headers);
    if let Some(user) = &session.ctx.logged_in_user {
        info!("{} logged out", user);
    }
    let store = state.store.clone();
    session.end(&store, Redirect::to("/login"))
}

async fn dashboard(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<MessageQuery>,
) -> Response {
    let session = state.session(&headers);
    let username = match require_login(&session) {
        Ok(username) => username,
        Err(redirect) => return redirect,
    };
    session.respond(Html(pages::dashboard_page(
        &username,
        session.ctx.user_profile.as_ref(),
        query.message.as_deref(),
    )))
}

// ---------------------------------------------------------------------------
// Signup and registration
// ---------------------------------------------------------------------------

async fn signup(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<MessageQuery>,
) -> Response {
    let session = state.session(&headers);
    session.respond(Html(pages::signup_page(query.message.as_deref())))
}

async fn signup_submit(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let mut session = state.session(&headers);
    let agree_all = is_checked(fields.get("agreeAll").map(String::as_str));
    let checked = REQUIRED_TERMS
        .iter()
        .chain(OPTIONAL_TERMS)
        .copied()
        .filter(|key| agree_all || is_checked(fields.get(*key).map(String::as_str)));
    let agreement = TermsAgreement::from_checked(checked, Utc::now());

    if !agreement.all_required_agreed() {
        return session.respond(Html(pages::signup_page(Some(
            "Please agree to all required terms.",
        ))));
    }

    session.ctx.terms_agreement = Some(agreement);
    session.save(&state.store);
    session.respond(Redirect::to("/register"))
}

async fn register(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
) -> Response {
    let session = state.session(&headers);
    if session.ctx.terms_agreement.is_none() {
        return session.respond(Redirect::to("/signup"));
    }

    let draft = session.ctx.register_form.clone().unwrap_or_default();
    let verified = query.is_verified() && query.token_id.is_some();
    let (name, phone, token_id) = if verified {
        (
            query.name.clone().unwrap_or_default(),
            query.phone_number.clone().unwrap_or_default(),
            query.token_id.clone().unwrap_or_default(),
        )
    } else {
        (draft.name.clone(), draft.phone_number.clone(), String::new())
    };

    session.respond(Html(pages::register_page(&RegisterView {
        name: &name,
        username: &draft.username,
        phone_number: &phone,
        token_id: &token_id,
        verified,
        message: None,
    })))
}

fn register_form_page(form: &RegisterForm, message: &str) -> Html<String> {
    Html(pages::register_page(&RegisterView {
        name: &form.name,
        username: &form.username,
        phone_number: &form.phone_number,
        token_id: &form.token_id,
        verified: form.verified == "true",
        message: Some(message),
    }))
}

/// Keep the draft and send the browser to the verification app.
async fn register_verify(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Response {
    let mut session = state.session(&headers);
    if session.ctx.terms_agreement.is_none() {
        return session.respond(Redirect::to("/signup"));
    }

    session.ctx.register_form = Some(RegisterDraft {
        name: form.name.trim().to_string(),
        username: form.username.trim().to_string(),
        phone_number: form.phone_number.trim().to_string(),
    });
    session.save(&state.store);

    match initiate_verification(
        &state.trustee,
        &state.config,
        &form.name,
        &form.phone_number,
        ReturnTarget::Registration,
    )
    .await
    {
        Ok(location) => session.respond(Redirect::to(location.as_str())),
        Err(e) => {
            let message = format!("Could not start identity verification: {}", e.user_message());
            session.respond(register_form_page(&form, &message))
        }
    }
}

async fn register_submit(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Response {
    let mut session = state.session(&headers);
    let terms = match session.ctx.terms_agreement.clone() {
        Some(terms) => terms,
        None => return session.respond(Redirect::to("/signup")),
    };

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(e) => return session.respond(register_form_page(&form, &e.user_message())),
    };

    let result = state
        .bank
        .register(Registration {
            name: &valid.name,
            username: form.username.trim(),
            password: &form.password,
            phone: &valid.phone,
            token_id: &valid.token_id,
            terms,
        })
        .await;

    match result {
        Ok(_) => {
            session.ctx.register_form = None;
            session.ctx.terms_agreement = None;
            session.save(&state.store);
            let notice = BridgeNotice::success(
                "Welcome aboard",
                "Your membership is ready. Please log in.",
                "/login",
            );
            session.respond(Redirect::to(&notice.to_path()))
        }
        Err(e) => {
            let message = format!("Registration failed: {}", e.user_message());
            session.respond(register_form_page(&form, &message))
        }
    }
}

// ---------------------------------------------------------------------------
// Verification return points
// ---------------------------------------------------------------------------

async fn auth_callback(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
) -> Response {
    let session = state.session(&headers);
    let registering = session.ctx.register_form.is_some();

    match handle_callback(&state.bank, &query, registering).await {
        Ok(outcome) => session.respond(Redirect::to(outcome.path())),
        Err(e) => {
            let (back, label) = if registering {
                ("/register", "Back to registration")
            } else {
                ("/dashboard", "Back to dashboard")
            };
            session.respond(Html(pages::callback_failed_page(&e.user_message(), back, label)))
        }
    }
}

async fn bridge(Query(query): Query<BridgeQuery>) -> Html<String> {
    Html(pages::bridge_page(&BridgeNotice::from_query(&query)))
}

async fn account_verification(State(state): State<ClientState>, headers: HeaderMap) -> Response {
    let session = state.session(&headers);
    if let Err(redirect) = require_login(&session) {
        return redirect;
    }
    session.respond(Html(pages::account_verification_page(None)))
}

async fn account_verification_submit(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<IdentityForm>,
) -> Response {
    let session = state.session(&headers);
    if let Err(redirect) = require_login(&session) {
        return redirect;
    }
    let profile = match session.ctx.user_profile.clone() {
        Some(profile) => profile,
        None => return session.respond(Redirect::to("/login")),
    };

    match check_profile_match(&profile, &form.name, &form.phone_number) {
        Ok(()) => {}
        Err(FlowError::ProfileMismatch) => {
            let notice = BridgeNotice::error(
                "Identity check failed",
                &FlowError::ProfileMismatch.user_message(),
                "/dashboard",
            );
            return session.respond(Redirect::to(&notice.to_path()));
        }
        Err(e) => {
            return session.respond(Html(pages::account_verification_page(Some(&e.user_message()))))
        }
    }

    match initiate_verification(
        &state.trustee,
        &state.config,
        &form.name,
        &form.phone_number,
        ReturnTarget::AccountOpening,
    )
    .await
    {
        Ok(location) => session.respond(Redirect::to(location.as_str())),
        Err(e) => session.respond(Html(pages::account_verification_page(Some(&e.user_message())))),
    }
}

// ---------------------------------------------------------------------------
// Account opening
// ---------------------------------------------------------------------------

async fn create_account(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
) -> Response {
    let session = state.session(&headers);
    if let Err(redirect) = require_login(&session) {
        return redirect;
    }

    let html = match query.token_id.as_deref() {
        Some(token_id) if query.is_verified() => {
            pages::create_account_page(&CreateAccountStep::Details { token_id }, None)
        }
        _ => pages::create_account_page(&CreateAccountStep::Verify, None),
    };
    session.respond(Html(html))
}

async fn create_account_verify(State(state): State<ClientState>, headers: HeaderMap) -> Response {
    let session = state.session(&headers);
    if let Err(redirect) = require_login(&session) {
        return redirect;
    }
    let profile = match &session.ctx.user_profile {
        Some(profile) => profile,
        None => return session.respond(Redirect::to("/login")),
    };

    match initiate_verification(
        &state.trustee,
        &state.config,
        &profile.name,
        &profile.phone_number,
        ReturnTarget::AccountOpening,
    )
    .await
    {
        Ok(location) => session.respond(Redirect::to(location.as_str())),
        Err(e) => session.respond(Html(pages::create_account_page(
            &CreateAccountStep::Verify,
            Some(&e.user_message()),
        ))),
    }
}

async fn create_account_submit(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<CreateAccountForm>,
) -> Response {
    let session = state.session(&headers);
    let username = match require_login(&session) {
        Ok(username) => username,
        Err(redirect) => return redirect,
    };

    let details = || CreateAccountStep::Details {
        token_id: &form.token_id,
    };
    let token_id = match form.validate() {
        Ok(token_id) => token_id,
        Err(e) => {
            let step = if form.token_id.trim().is_empty() {
                CreateAccountStep::Verify
            } else {
                details()
            };
            return session.respond(Html(pages::create_account_page(&step, Some(&e.user_message()))));
        }
    };

    let account_name = form.account_name.trim();
    match state
        .bank
        .create_account(&username, account_name, &form.pin, &token_id)
        .await
    {
        Ok(created) => session.respond(Html(pages::create_account_page(
            &CreateAccountStep::Done {
                account_name,
                bonus_applied: created.bonus_applied,
                message: created.message.as_deref(),
            },
            None,
        ))),
        Err(e) => {
            error!("Account opening failed for {}: {}", username, e);
            let message = format!("Could not open the account: {}", e.user_message());
            session.respond(Html(pages::create_account_page(&details(), Some(&message))))
        }
    }
}

// ---------------------------------------------------------------------------
// Username lookup
// ---------------------------------------------------------------------------

async fn find_id(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
) -> Response {
    let session = state.session(&headers);
    if !query.is_verified() {
        return session.respond(Html(pages::find_id_page(None, None)));
    }

    let lookup = match VerificationResult::from_query(&query) {
        Ok(result) => state.bank.find_id(&result.phone, result.name.as_str()).await,
        Err(e) => Err(e),
    };

    match lookup {
        Ok(id) if !id.is_empty() => {
            session.respond(Html(pages::find_id_page(Some(&pages::mask_username(&id)), None)))
        }
        other => {
            if let Err(e) = other {
                warn!("Member lookup failed: {}", e);
            }
            let notice = BridgeNotice::error(
                "No member info",
                "No membership matches the verified information.",
                "/login",
            );
            session.respond(Redirect::to(&notice.to_path()))
        }
    }
}

async fn find_id_submit(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<IdentityForm>,
) -> Response {
    let session = state.session(&headers);
    match initiate_verification(
        &state.trustee,
        &state.config,
        &form.name,
        &form.phone_number,
        ReturnTarget::FindId,
    )
    .await
    {
        Ok(location) => session.respond(Redirect::to(location.as_str())),
        Err(e) => session.respond(Html(pages::find_id_page(None, Some(&e.user_message())))),
    }
}

// ---------------------------------------------------------------------------
// My page and the consultation event
// ---------------------------------------------------------------------------

async fn mypage(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Query(query): Query<MessageQuery>,
) -> Response {
    let session = state.session(&headers);
    let username = match require_login(&session) {
        Ok(username) => username,
        Err(redirect) => return redirect,
    };

    let (consent, message) = match state.bank.my_consent(&username).await {
        Ok(consent) => (consent, query.message),
        Err(e) => {
            warn!("Could not load consent for {}: {}", username, e);
            (ConsentStatus::default(), Some(e.user_message()))
        }
    };
    session.respond(Html(pages::mypage(
        session.ctx.user_profile.as_ref(),
        &username,
        &consent,
        message.as_deref(),
    )))
}

async fn mypage_consent(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> Response {
    let session = state.session(&headers);
    let username = match require_login(&session) {
        Ok(username) => username,
        Err(redirect) => return redirect,
    };

    let consent_type = match ConsentType::parse(&form.consent_type) {
        Some(consent_type) => consent_type,
        None => {
            return session.respond(Redirect::to(&with_message("/mypage", "Unknown consent item.")))
        }
    };
    let agreed = form.agreed == "true";

    let message = match state.bank.update_consent(&username, consent_type, agreed).await {
        Ok(()) if agreed => format!("{}: agreed.", consent_type.label()),
        Ok(()) => format!("{}: withdrawn.", consent_type.label()),
        Err(e) => format!("Could not update consent: {}", e.user_message()),
    };
    session.respond(Redirect::to(&with_message("/mypage", &message)))
}

async fn consult(
    State(state): State<ClientState>,
    headers: HeaderMap,
    Form(form): Form<ConsultForm>,
) -> Response {
    let session = state.session(&headers);
    let username = match require_login(&session) {
        Ok(username) => username,
        Err(redirect) => return redirect,
    };
    let profile = match &session.ctx.user_profile {
        Some(profile) => profile,
        None => return session.respond(Redirect::to("/login")),
    };

    if !is_checked(form.essential.as_deref()) {
        return session.respond(Redirect::to(&with_message(
            "/dashboard",
            "Please agree to the required item.",
        )));
    }
    if !is_checked(form.optional.as_deref()) {
        return session.respond(Redirect::to(&with_message(
            "/dashboard",
            "Marketing consent is needed to join the event.",
        )));
    }

    let result = async {
        state
            .bank
            .marketing_consent(&username, EVENT_PRODUCT, EVENT_CONSENT_TYPE)
            .await?;
        state.bank.create_lead(&username, profile, EVENT_PRODUCT).await
    }
    .await;

    let message = match result {
        Ok(()) => "Your consultation request was received. We will contact you soon.".to_string(),
        Err(e) => {
            error!("Consultation request failed for {}: {}", username, e);
            format!("Consultation request failed: {}", e.user_message())
        }
    };
    session.respond(Redirect::to(&with_message("/dashboard", &message)))
}

// ---------------------------------------------------------------------------
// Verification backend proxy
// ---------------------------------------------------------------------------

/// Forward `/trustee-api/*` to the verification backend's `/api/*`.
async fn trustee_proxy(
    State(state): State<ClientState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = match rewrite_trustee_path(uri.path()) {
        Some(path) => path,
        None => return StatusCode::NOT_FOUND.into_response(),
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    let method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    match state
        .trustee
        .forward(method, &path_and_query, content_type, body.to_vec())
        .await
    {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = (status, reply.body).into_response();
            match reply
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
            {
                Some(value) => {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                None => {
                    response.headers_mut().remove(header::CONTENT_TYPE);
                }
            }
            response
        }
        Err(e) => {
            error!("Proxy to verification backend failed: {}", e);
            (StatusCode::BAD_GATEWAY, e.user_message()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::bank::{
        CALLBACK_PATH, CREATE_ACCOUNT_PATH, FIND_ID_PATH, LEADS_PATH, LOGIN_PATH,
        MARKETING_CONSENT_PATH, MY_CONSENT_PATH, REGISTER_PATH, UPDATE_CONSENT_PATH,
    };
    use crate::api::trustee::INIT_PATH;
    use crate::state::HandoffStore;
    use crate::test_utils::MockBackend;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        bank: MockBackend,
        trustee: MockBackend,
        cookie: Option<String>,
    }

    impl Harness {
        async fn start(bank: MockBackend, trustee: MockBackend) -> Self {
            let config = AppConfig {
                bank_api_url: bank.base_url(),
                trustee_api_url: trustee.base_url(),
                ..AppConfig::default()
            };
            let state = ClientState::new(Arc::new(config), reqwest::Client::new(), HandoffStore::shared());
            Self {
                app: client_router(state),
                bank,
                trustee,
                cookie: None,
            }
        }

        async fn send(&mut self, mut request: Request<Body>) -> Response {
            if let Some(cookie) = &self.cookie {
                request
                    .headers_mut()
                    .insert(header::COOKIE, cookie.parse().unwrap());
            }
            let response = self.app.clone().oneshot(request).await.unwrap();
            if let Some(set) = response.headers().get(header::SET_COOKIE) {
                let pair = set.to_str().unwrap().split(';').next().unwrap().to_string();
                self.cookie = Some(pair);
            }
            response
        }

        async fn get(&mut self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response {
            let body = fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            self.send(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
        }

        async fn login(&mut self) {
            let response = self
                .post_form("/login", &[("username", "hong1234"), ("password", "abc123!")])
                .await;
            assert_eq!(location(&response), "/dashboard");
        }
    }

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn bank_with_login() -> MockBackend {
        MockBackend::start().await.respond(
            LOGIN_PATH,
            StatusCode::OK,
            json!({ "username": "hong1234", "name": "홍길동", "phoneNumber": "010-1234-5678" }),
        )
    }

    #[tokio::test]
    async fn test_dashboard_requires_login() {
        let mut h = Harness::start(MockBackend::start().await, MockBackend::start().await).await;
        let response = h.get("/dashboard").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
        assert!(h.cookie.as_deref().unwrap().starts_with("bank_session="));
    }

    #[tokio::test]
    async fn test_login_then_dashboard() {
        let mut h = Harness::start(bank_with_login().await, MockBackend::start().await).await;
        h.login().await;

        let response = h.get("/dashboard").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Hello, 홍길동"));

        let response = h.get("/logout").await;
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_failed_login_stays_on_page() {
        let bank = MockBackend::start().await.respond(
            LOGIN_PATH,
            StatusCode::UNAUTHORIZED,
            json!({ "message": "Invalid credentials" }),
        );
        let mut h = Harness::start(bank, MockBackend::start().await).await;
        let response = h
            .post_form("/login", &[("username", "hong1234"), ("password", "nope")])
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Invalid credentials (401)"));
    }

    #[tokio::test]
    async fn test_signup_requires_every_mandatory_term() {
        let mut h = Harness::start(MockBackend::start().await, MockBackend::start().await).await;
        let response = h.post_form("/signup", &[("age", "on"), ("terms", "on")]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Please agree to all required terms."));

        let response = h.get("/register").await;
        assert_eq!(location(&response), "/signup");
    }

    #[tokio::test]
    async fn test_registration_round_trip_through_verifier() {
        let bank = MockBackend::start()
            .await
            .respond(
                CALLBACK_PATH,
                StatusCode::OK,
                json!({ "status": "success", "name": "홍길동" }),
            )
            .respond_text(REGISTER_PATH, StatusCode::OK, "registered");
        let trustee = MockBackend::start()
            .await
            .respond(INIT_PATH, StatusCode::OK, json!({ "tokenId": "tok_123" }));
        let mut h = Harness::start(bank, trustee).await;

        let response = h.post_form("/signup", &[("agreeAll", "on")]).await;
        assert_eq!(location(&response), "/register");

        let response = h
            .post_form(
                "/register/verify",
                &[("name", "홍길동"), ("username", "hong1234"), ("phoneNumber", "010-1234-5678")],
            )
            .await;
        let verifier = url::Url::parse(&location(&response)).unwrap();
        assert_eq!(verifier.path(), "/verify");
        let query = ProtocolQuery::from_url(&verifier);
        assert_eq!(query.token_id.as_deref(), Some("tok_123"));
        assert_eq!(
            query.redirect_url.as_deref(),
            Some("http://localhost:5175/auth/callback")
        );

        let response = h
            .get("/auth/callback?tokenId=tok_123&phoneNumber=01012345678&name=%ED%99%8D%EA%B8%B8%EB%8F%99&verified=true")
            .await;
        let next = location(&response);
        assert!(next.starts_with("/register?verified=true&phoneNumber=01012345678&tokenId=tok_123"));
        assert_eq!(h.bank.calls(CALLBACK_PATH)[0]["phoneNumber"], "01012345678");

        // the draft username comes back pre-filled
        let html = body_text(h.get(&next).await).await;
        assert!(html.contains(r#"value="hong1234""#));
        assert!(html.contains(r#"value="tok_123""#));

        let response = h
            .post_form(
                "/register",
                &[
                    ("name", "홍길동"),
                    ("username", "hong1234"),
                    ("password", "abc123!"),
                    ("confirmPassword", "abc123!"),
                    ("phoneNumber", "010-1234-5678"),
                    ("tokenId", "tok_123"),
                    ("verified", "true"),
                ],
            )
            .await;
        assert!(location(&response).starts_with("/auth/bridge?type=success"));

        let sent = &h.bank.calls(REGISTER_PATH)[0];
        assert_eq!(sent["phoneNumber"], "01012345678");
        assert_eq!(sent["termsAgreement"]["agreements"]["carrierAuth"], true);
        assert_eq!(sent["termsAgreement"]["marketingChannels"]["sms"], true);
    }

    #[tokio::test]
    async fn test_failed_callback_offers_a_way_back() {
        let bank = MockBackend::start().await.respond(
            CALLBACK_PATH,
            StatusCode::BAD_REQUEST,
            json!({ "message": "Token expired" }),
        );
        let mut h = Harness::start(bank, MockBackend::start().await).await;

        let response = h.get("/auth/callback?tokenId=tok_1&phoneNumber=01012345678").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Verification failed: Token expired"));
        assert!(html.contains(r#"href="/dashboard""#));
    }

    #[tokio::test]
    async fn test_account_verification_mismatch_never_calls_init() {
        let trustee = MockBackend::start()
            .await
            .respond(INIT_PATH, StatusCode::OK, json!({ "tokenId": "tok_9" }));
        let mut h = Harness::start(bank_with_login().await, trustee).await;
        h.login().await;

        let response = h
            .post_form(
                "/account-verification",
                &[("name", "김철수"), ("phoneNumber", "01012345678")],
            )
            .await;
        let next = location(&response);
        assert!(next.starts_with("/auth/bridge?type=error"));
        assert!(next.contains("next=%2Fdashboard"));
        assert_eq!(h.trustee.call_count(INIT_PATH), 0);

        let response = h
            .post_form(
                "/account-verification",
                &[("name", "홍길동"), ("phoneNumber", "010-1234-5678")],
            )
            .await;
        let next = url::Url::parse(&location(&response)).unwrap();
        assert_eq!(next.origin().ascii_serialization(), "http://localhost:5176");
        assert_eq!(next.path(), "/verify");
        let query = ProtocolQuery::from_url(&next);
        assert_eq!(query.token_id.as_deref(), Some("tok_9"));
        assert_eq!(
            query.redirect_url.as_deref(),
            Some("http://localhost:5175/create-account?verified=true")
        );

        // the verifier appends the result; the details step opens
        let html = body_text(
            h.get("/create-account?verified=true&tokenId=tok_9&phoneNumber=01012345678&name=%ED%99%8D%EA%B8%B8%EB%8F%99")
                .await,
        )
        .await;
        assert!(html.contains(r#"name="pin""#));
        assert!(html.contains(r#"value="tok_9""#));
    }

    #[tokio::test]
    async fn test_create_account_after_verification() {
        let bank = bank_with_login().await.respond(
            CREATE_ACCOUNT_PATH,
            StatusCode::OK,
            json!({ "bonusApplied": true }),
        );
        let mut h = Harness::start(bank, MockBackend::start().await).await;
        h.login().await;

        let html = body_text(h.get("/create-account?verified=true&tokenId=tok_5").await).await;
        assert!(html.contains(r#"name="pin""#));

        let response = h
            .post_form(
                "/create-account",
                &[("accountName", "Savings"), ("pin", "12a4"), ("tokenId", "tok_5")],
            )
            .await;
        assert!(body_text(response).await.contains("The PIN must be 4 digits."));
        assert_eq!(h.bank.call_count(CREATE_ACCOUNT_PATH), 0);

        let response = h
            .post_form(
                "/create-account",
                &[("accountName", "Savings"), ("pin", "1234"), ("tokenId", "tok_5")],
            )
            .await;
        let html = body_text(response).await;
        assert!(html.contains("welcome bonus"));
        assert_eq!(h.bank.calls(CREATE_ACCOUNT_PATH)[0]["username"], "hong1234");
    }

    #[tokio::test]
    async fn test_find_id_masks_result_and_reports_misses() {
        let bank = MockBackend::start()
            .await
            .respond_text(FIND_ID_PATH, StatusCode::OK, "hong1234");
        let mut h = Harness::start(bank, MockBackend::start().await).await;

        let html = body_text(
            h.get("/find-id?verified=true&tokenId=t&phoneNumber=01012345678&name=hong")
                .await,
        )
        .await;
        assert!(html.contains("ho******"));

        let bank = MockBackend::start().await.respond(
            FIND_ID_PATH,
            StatusCode::NOT_FOUND,
            json!({ "message": "not found" }),
        );
        let mut h = Harness::start(bank, MockBackend::start().await).await;
        let response = h
            .get("/find-id?verified=true&tokenId=t&phoneNumber=01012345678&name=hong")
            .await;
        let next = location(&response);
        assert!(next.starts_with("/auth/bridge?type=error"));
        assert!(next.contains("next=%2Flogin"));
    }

    #[tokio::test]
    async fn test_consult_needs_both_consents() {
        let bank = bank_with_login()
            .await
            .respond(MARKETING_CONSENT_PATH, StatusCode::OK, json!({ "success": true }))
            .respond(LEADS_PATH, StatusCode::OK, json!({}));
        let mut h = Harness::start(bank, MockBackend::start().await).await;
        h.login().await;

        let response = h.post_form("/events/consult", &[("essential", "on")]).await;
        assert!(location(&response).starts_with("/dashboard?message="));
        assert_eq!(h.bank.call_count(LEADS_PATH), 0);

        h.post_form("/events/consult", &[("essential", "on"), ("optional", "on")])
            .await;
        let consent = &h.bank.calls(MARKETING_CONSENT_PATH)[0];
        assert_eq!(consent["consentType"], "3RD_PARTY_TM");
        assert_eq!(consent["productName"], "Continue 카드");
        let lead = &h.bank.calls(LEADS_PATH)[0];
        assert_eq!(lead["customerRef"], "hong1234");
        assert_eq!(lead["phone"], "010-1234-5678");
    }

    #[tokio::test]
    async fn test_mypage_consent_toggle() {
        let bank = bank_with_login()
            .await
            .respond(
                MY_CONSENT_PATH,
                StatusCode::OK,
                json!({ "marketingAgreed": true, "ssapProvisionAgreed": false }),
            )
            .respond(UPDATE_CONSENT_PATH, StatusCode::OK, json!({}));
        let mut h = Harness::start(bank, MockBackend::start().await).await;
        h.login().await;

        let html = body_text(h.get("/mypage").await).await;
        assert!(html.contains("Benefit and event notifications: <strong>Agreed</strong>"));
        assert_eq!(
            h.bank.recorded(MY_CONSENT_PATH)[0].query.as_deref(),
            Some("username=hong1234")
        );

        let response = h
            .post_form(
                "/mypage/consent",
                &[("consentType", "SSAP_PROVISION"), ("agreed", "true")],
            )
            .await;
        assert!(location(&response).starts_with("/mypage?message="));
        let update = &h.bank.calls(UPDATE_CONSENT_PATH)[0];
        assert_eq!(update["consentType"], "SSAP_PROVISION");
        assert_eq!(update["agreed"], true);
    }

    #[tokio::test]
    async fn test_proxy_rewrites_prefix_and_passes_status() {
        let trustee = MockBackend::start().await.respond(
            INIT_PATH,
            StatusCode::BAD_REQUEST,
            json!({ "message": "name required" }),
        );
        let mut h = Harness::start(MockBackend::start().await, trustee).await;

        let response = h
            .send(
                Request::post("/trustee-api/v1/auth/init?src=web")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"clientData":"01012345678"}"#))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("name required"));

        let calls = h.trustee.recorded(INIT_PATH);
        assert_eq!(calls[0].query.as_deref(), Some("src=web"));
        assert_eq!(calls[0].body["clientData"], "01012345678");
    }

    #[tokio::test]
    async fn test_proxy_keeps_body_bytes_and_content_type() {
        let payload = vec![0x89, b'P', b'N', b'G', 0xff, 0x00, 0xfe];
        let trustee = MockBackend::start().await.respond_raw(
            "/api/v1/auth/badge",
            StatusCode::OK,
            "image/png",
            payload.clone(),
        );
        let mut h = Harness::start(MockBackend::start().await, trustee).await;

        let response = h
            .send(Request::get("/trustee-api/v1/auth/badge").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.to_vec(), payload);
    }
}
