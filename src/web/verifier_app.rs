//! Verification app: the OTP page reached through the redirect protocol.

use std::sync::Arc;

use axum::{
    extract::{Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use tracing::{info, warn};

use super::forms::OtpConfirmForm;
use super::pages::{self, VerifyView};
use super::session::{BrowserSession, VERIFIER_COOKIE};
use crate::api::TrusteeApi;
use crate::config::AppConfig;
use crate::error::{FlowError, Result};
use crate::flows::{confirm_otp, request_otp, AccessGuard, ConfirmOutcome, OtpEntry, OtpForm, ValidAccess};
use crate::logging::mask_token;
use crate::protocol::ProtocolQuery;
use crate::state::{SharedHandoffStore, VerifierContext};

type Session = BrowserSession<VerifierContext>;

/// Shared state for verification app handlers
#[derive(Clone)]
pub struct VerifierState {
    pub config: Arc<AppConfig>,
    pub trustee: TrusteeApi,
    pub store: SharedHandoffStore<VerifierContext>,
}

impl VerifierState {
    pub fn new(config: Arc<AppConfig>, http: reqwest::Client, store: SharedHandoffStore<VerifierContext>) -> Self {
        Self {
            trustee: TrusteeApi::new(http, config.trustee_api_url.clone()),
            config,
            store,
        }
    }
}

/// Create verification app router
pub fn verifier_router(state: VerifierState) -> Router {
    Router::new()
        .route("/", get(verify_page))
        .route("/verify", get(verify_page))
        .route("/verify/request-otp", post(request_otp_submit))
        .route("/verify/confirm", post(confirm_submit))
        .with_state(state)
}

fn denied() -> Response {
    (StatusCode::FORBIDDEN, Html(pages::verify_denied_page())).into_response()
}

/// Run `f` on this token's form under the store lock, creating it on first visit.
fn with_form<R>(
    state: &VerifierState,
    session: &Session,
    access: &ValidAccess,
    f: impl FnOnce(&mut OtpForm) -> R,
) -> R {
    state.store.update(&session.token, |ctx| {
        let form = ctx
            .forms
            .entry(access.token_id.clone())
            .or_insert_with(|| OtpForm::new(access));
        f(form)
    })
}

fn back_to_page(raw_query: &str) -> Redirect {
    Redirect::to(&format!("/verify?{}", raw_query))
}

/// GET /verify - Show the identity form, or the denial page without a token
async fn verify_page(
    State(state): State<VerifierState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let access = match AccessGuard::evaluate(&query) {
        AccessGuard::Valid(access) => access,
        AccessGuard::Invalid => {
            warn!("Verification page opened without a token");
            return denied();
        }
    };

    let session = BrowserSession::resolve(&state.store, &headers, VERIFIER_COOKIE);
    // Messages are shown once
    let (form, message) = with_form(&state, &session, &access, |form| {
        let message = form.message.take();
        (form.clone(), message)
    });

    let now = Utc::now();
    let back = access.back_target().map(|url| url.to_string());
    let raw_query = raw_query.unwrap_or_default();
    session.respond(Html(pages::verify_page(&VerifyView {
        form: &form,
        remaining: form.remaining(now),
        resend_locked: form.resend_locked(now),
        submitting: form.is_submitting(now),
        back_target: back.as_deref(),
        query: &raw_query,
        message: message.as_deref(),
    })))
}

/// POST /verify/request-otp - Validate the entry and ask for a code
async fn request_otp_submit(
    State(state): State<VerifierState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
    RawQuery(raw_query): RawQuery,
    Form(entry): Form<OtpEntry>,
) -> Response {
    let access = match AccessGuard::evaluate(&query) {
        AccessGuard::Valid(access) => access,
        AccessGuard::Invalid => return denied(),
    };
    let raw_query = raw_query.unwrap_or_default();

    let session = BrowserSession::resolve(&state.store, &headers, VERIFIER_COOKIE);
    let now = Utc::now();
    let claimed = with_form(&state, &session, &access, |form| -> Result<OtpForm> {
        form.begin_submit(now)?;
        form.apply_entry(&entry);
        Ok(form.clone())
    });
    let mut form = match claimed {
        Ok(form) => form,
        Err(e) => {
            warn!(
                "Code request for token {} refused while another is in flight",
                mask_token(access.token_id.as_str())
            );
            with_form(&state, &session, &access, |form| form.message = Some(e.user_message()));
            return session.respond(back_to_page(&raw_query));
        }
    };

    form.message = match request_otp(&state.trustee, &state.config, &mut form, now).await {
        Ok(issued) => {
            info!("Code requested for token {}", mask_token(access.token_id.as_str()));
            Some(issued.message)
        }
        Err(e) => Some(e.user_message()),
    };
    form.finish_submit();

    with_form(&state, &session, &access, |stored| *stored = form);
    session.respond(back_to_page(&raw_query))
}

/// POST /verify/confirm - Check the code and send the browser back
async fn confirm_submit(
    State(state): State<VerifierState>,
    headers: HeaderMap,
    Query(query): Query<ProtocolQuery>,
    RawQuery(raw_query): RawQuery,
    Form(submitted): Form<OtpConfirmForm>,
) -> Response {
    let access = match AccessGuard::evaluate(&query) {
        AccessGuard::Valid(access) => access,
        AccessGuard::Invalid => return denied(),
    };
    let raw_query = raw_query.unwrap_or_default();

    let session = BrowserSession::resolve(&state.store, &headers, VERIFIER_COOKIE);
    let claimed = with_form(&state, &session, &access, |form| -> Result<OtpForm> {
        if !form.otp_sent() {
            return Err(FlowError::validation("Please request a verification code first."));
        }
        form.begin_submit(Utc::now())?;
        Ok(form.clone())
    });
    let mut form = match claimed {
        Ok(form) => form,
        Err(e) => {
            with_form(&state, &session, &access, |form| form.message = Some(e.user_message()));
            return session.respond(back_to_page(&raw_query));
        }
    };

    match confirm_otp(&state.trustee, &mut form, &submitted.otp).await {
        Ok(outcome) => {
            state.store.update(&session.token, |ctx| ctx.forms.remove(&access.token_id));
            match outcome {
                ConfirmOutcome::Redirect(url) => session.respond(Redirect::to(url.as_str())),
                ConfirmOutcome::Completed(message) => {
                    session.respond(Html(pages::verify_complete_page(&message)))
                }
            }
        }
        Err(e) => {
            let gone = e.status().is_some() && form.session.as_ref().is_some_and(|s| s.is_terminal());
            form.message = Some(if gone {
                format!(
                    "{} This verification request is no longer valid. Please start again from the partner service.",
                    e.user_message()
                )
            } else {
                e.user_message()
            });
            form.finish_submit();
            with_form(&state, &session, &access, |stored| *stored = form);
            session.respond(back_to_page(&raw_query))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::trustee::{CONFIRM_PATH, REQUEST_OTP_PATH};
    use crate::protocol::SessionStatus;
    use crate::state::HandoffStore;
    use crate::test_utils::MockBackend;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::json;
    use tower::ServiceExt;

    const ENTRY: &str = "/verify?tokenId=tok_123&name=%ED%99%8D%EA%B8%B8%EB%8F%99&phoneNumber=01012345678&redirectUrl=http%3A%2F%2Flocalhost%3A5175%2Fauth%2Fcallback";
    const QUERY: &str = "tokenId=tok_123&name=%ED%99%8D%EA%B8%B8%EB%8F%99&phoneNumber=01012345678&redirectUrl=http%3A%2F%2Flocalhost%3A5175%2Fauth%2Fcallback";

    struct Harness {
        app: Router,
        store: SharedHandoffStore<VerifierContext>,
        cookie: Option<String>,
    }

    impl Harness {
        fn new(trustee: &MockBackend, test_mode: bool) -> Self {
            let config = AppConfig {
                trustee_api_url: trustee.base_url(),
                test_mode,
                ..AppConfig::default()
            };
            let store = HandoffStore::shared();
            let state = VerifierState::new(Arc::new(config), reqwest::Client::new(), store.clone());
            Self {
                app: verifier_router(state),
                store,
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
                self.cookie = Some(set.to_str().unwrap().split(';').next().unwrap().to_string());
            }
            response
        }

        async fn get(&mut self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_form(&mut self, uri: &str, body: &str) -> Response {
            self.send(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        fn edit_form(&self, f: impl FnOnce(&mut OtpForm)) {
            let token = self.cookie.as_deref().unwrap().trim_start_matches("ssap_session=");
            self.store.update(token, |ctx| {
                f(ctx
                    .forms
                    .get_mut(&crate::protocol::TokenId::parse("tok_123").unwrap())
                    .unwrap())
            });
        }

        fn form(&self) -> OtpForm {
            let token = self.cookie.as_deref().unwrap().trim_start_matches("ssap_session=");
            let ctx = self.store.get(token).unwrap();
            ctx.forms
                .get(&crate::protocol::TokenId::parse("tok_123").unwrap())
                .cloned()
                .unwrap()
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_direct_access_is_denied() {
        let trustee = MockBackend::start().await;
        let mut h = Harness::new(&trustee, false);

        for uri in ["/verify", "/", "/verify?name=x&phoneNumber=01012345678"] {
            let response = h.get(uri).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            let html = body_text(response).await;
            assert!(html.contains("UNAUTHORIZED_DIRECT_ACCESS"));
            assert!(!html.contains("residentFront"));
        }

        let response = h.post_form("/verify/request-otp", "name=x").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(trustee.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_locked_fields_render_read_only() {
        let trustee = MockBackend::start().await;
        let mut h = Harness::new(&trustee, false);

        let html = body_text(h.get(ENTRY).await).await;
        assert!(html.contains(r#"value="홍길동" readonly"#));
        assert!(html.contains(r#"value="010-1234-5678" inputmode="numeric" readonly"#));
        assert!(html.contains(r#"href="http://localhost:5175/login""#));
    }

    #[tokio::test]
    async fn test_missing_consent_never_reaches_backend() {
        let trustee = MockBackend::start()
            .await
            .respond(REQUEST_OTP_PATH, StatusCode::OK, json!({ "message": "sent" }));
        let mut h = Harness::new(&trustee, false);
        h.get(ENTRY).await;

        let response = h
            .post_form(
                &format!("/verify/request-otp?{}", QUERY),
                "residentFront=900101&carrier=SKT",
            )
            .await;
        assert_eq!(location(&response), format!("/verify?{}", QUERY));
        assert_eq!(trustee.total_calls(), 0);

        let html = body_text(h.get(ENTRY).await).await;
        assert!(html.contains("Please agree to the identity verification terms."));
        // shown once
        let html = body_text(h.get(ENTRY).await).await;
        assert!(!html.contains("Please agree to the identity verification terms."));
    }

    #[tokio::test]
    async fn test_end_to_end_in_test_mode() {
        let trustee = MockBackend::start()
            .await
            .respond(
                REQUEST_OTP_PATH,
                StatusCode::OK,
                json!({ "otp": "482913", "message": "sent" }),
            )
            .respond(CONFIRM_PATH, StatusCode::OK, json!({ "message": "confirmed" }));
        let mut h = Harness::new(&trustee, true);
        h.get(ENTRY).await;

        // a tampered name is ignored in favour of the locked one
        h.post_form(
            &format!("/verify/request-otp?{}", QUERY),
            "name=%EA%B9%80%EC%B2%A0%EC%88%98&residentFront=900101&carrier=SKT&phoneNumber=01099998888&agreed=on",
        )
        .await;
        let sent = &trustee.calls(REQUEST_OTP_PATH)[0];
        assert_eq!(sent["name"], "홍길동");
        assert_eq!(sent["phoneNumber"], "01012345678");
        assert_eq!(sent["tokenId"], "tok_123");
        assert_eq!(sent["carrier"], "SKT");

        let html = body_text(h.get(ENTRY).await).await;
        assert!(html.contains(r#"value="482913""#));
        assert!(html.contains("test mode: 482913"));
        assert!(html.contains("id=\"resend\" disabled"));

        let response = h
            .post_form(&format!("/verify/confirm?{}", QUERY), "otp=482913")
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let back = url::Url::parse(&location(&response)).unwrap();
        assert_eq!(back.path(), "/auth/callback");
        let returned = ProtocolQuery::from_url(&back);
        assert_eq!(returned.token_id.as_deref(), Some("tok_123"));
        assert_eq!(returned.phone_number.as_deref(), Some("01012345678"));
        assert_eq!(returned.name.as_deref(), Some("홍길동"));
        assert!(returned.is_verified());

        assert_eq!(trustee.calls(CONFIRM_PATH)[0]["otp"], "482913");
    }

    #[tokio::test]
    async fn test_rejected_code_stays_on_page() {
        let trustee = MockBackend::start()
            .await
            .respond(REQUEST_OTP_PATH, StatusCode::OK, json!({ "message": "sent" }))
            .respond(
                CONFIRM_PATH,
                StatusCode::GONE,
                json!({ "message": "Token already used" }),
            );
        let mut h = Harness::new(&trustee, false);
        h.get(ENTRY).await;
        h.post_form(
            &format!("/verify/request-otp?{}", QUERY),
            "residentFront=900101&carrier=KT&agreed=on",
        )
        .await;

        let response = h
            .post_form(&format!("/verify/confirm?{}", QUERY), "otp=111111")
            .await;
        assert_eq!(location(&response), format!("/verify?{}", QUERY));

        let form = h.form();
        assert_eq!(form.session.unwrap().status, SessionStatus::Expired);

        let html = body_text(h.get(ENTRY).await).await;
        assert!(html.contains("Token already used (410)"));
        assert!(html.contains("no longer valid"));
        assert!(!html.contains(r#"value="111111""#));
        assert!(!html.contains("id=\"confirm\" disabled"));

        // the backend stays the judge of a resubmitted token
        let response = h
            .post_form(&format!("/verify/confirm?{}", QUERY), "otp=222222")
            .await;
        assert_eq!(location(&response), format!("/verify?{}", QUERY));
        assert_eq!(trustee.call_count(CONFIRM_PATH), 2);
        assert_eq!(trustee.calls(CONFIRM_PATH)[1]["otp"], "222222");
        assert!(h.form().message.unwrap().contains("Token already used (410)"));
    }

    #[tokio::test]
    async fn test_rate_limited_confirm_can_be_retried() {
        let trustee = MockBackend::start()
            .await
            .respond(REQUEST_OTP_PATH, StatusCode::OK, json!({ "message": "sent" }))
            .respond(
                CONFIRM_PATH,
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "message": "Too many attempts" }),
            )
            .respond(CONFIRM_PATH, StatusCode::OK, json!({ "message": "confirmed" }));
        let mut h = Harness::new(&trustee, false);
        h.get(ENTRY).await;
        h.post_form(
            &format!("/verify/request-otp?{}", QUERY),
            "residentFront=900101&carrier=SKT&agreed=on",
        )
        .await;

        h.post_form(&format!("/verify/confirm?{}", QUERY), "otp=482913")
            .await;
        assert_eq!(h.form().session.unwrap().status, SessionStatus::Expired);

        let response = h
            .post_form(&format!("/verify/confirm?{}", QUERY), "otp=482913")
            .await;
        assert_eq!(trustee.call_count(CONFIRM_PATH), 2);
        let back = url::Url::parse(&location(&response)).unwrap();
        assert_eq!(back.path(), "/auth/callback");
    }

    #[tokio::test]
    async fn test_submission_in_flight_blocks_a_second_one() {
        let trustee = MockBackend::start()
            .await
            .respond(REQUEST_OTP_PATH, StatusCode::OK, json!({ "message": "sent" }))
            .respond(CONFIRM_PATH, StatusCode::OK, json!({ "message": "confirmed" }));
        let mut h = Harness::new(&trustee, false);
        h.get(ENTRY).await;
        h.post_form(
            &format!("/verify/request-otp?{}", QUERY),
            "residentFront=900101&carrier=SKT&agreed=on",
        )
        .await;
        assert!(h.form().in_flight_since.is_none());

        // another tab is still waiting on the backend
        h.edit_form(|form| form.in_flight_since = Some(Utc::now()));

        let html = body_text(h.get(ENTRY).await).await;
        assert!(html.contains("id=\"resend\" disabled data-busy"));
        assert!(html.contains("id=\"confirm\" disabled"));

        h.post_form(
            &format!("/verify/request-otp?{}", QUERY),
            "residentFront=900101&carrier=SKT&agreed=on",
        )
        .await;
        h.post_form(&format!("/verify/confirm?{}", QUERY), "otp=482913")
            .await;

        assert_eq!(trustee.call_count(REQUEST_OTP_PATH), 1);
        assert_eq!(trustee.call_count(CONFIRM_PATH), 0);
        let form = h.form();
        assert!(form.message.unwrap().contains("still being processed"));
        assert!(form.in_flight_since.is_some());
    }

    #[tokio::test]
    async fn test_confirm_before_request_is_refused() {
        let trustee = MockBackend::start().await;
        let mut h = Harness::new(&trustee, false);
        h.get(ENTRY).await;

        h.post_form(&format!("/verify/confirm?{}", QUERY), "otp=482913")
            .await;
        assert_eq!(trustee.total_calls(), 0);
        assert_eq!(
            h.form().message.as_deref(),
            Some("Please request a verification code first.")
        );
    }
}
