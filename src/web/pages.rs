//! Server-rendered HTML for both front ends.

use crate::api::types::{ConsentStatus, ConsentType, UserProfile, OPTIONAL_TERMS, REQUIRED_TERMS};
use crate::flows::bridge::{BridgeNotice, NoticeKind, BRIDGE_DELAY_SECS};
use crate::flows::otp::{Carrier, OtpForm, OTP_VALIDITY_SECS, RESEND_LOCK_ABOVE_SECS};
use crate::logging::mask_phone;

/// Minimal HTML escaping for text and attribute values
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    {head_extra}
    <style>
        * {{ box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #F5F6F8;
            margin: 0;
            color: #191f28;
        }}
        main {{
            max-width: 480px;
            min-height: 100vh;
            margin: 0 auto;
            background: white;
            padding: 32px 24px;
        }}
        h1 {{ font-size: 1.5rem; margin: 0 0 16px; }}
        label {{ display: block; font-weight: 600; margin: 16px 0 6px; }}
        input, select {{
            width: 100%;
            padding: 12px;
            border: 1px solid #d1d6db;
            border-radius: 8px;
            font-size: 1rem;
        }}
        input[readonly] {{ background: #f2f4f6; color: #6b7684; }}
        input[type=checkbox] {{ width: auto; margin-right: 8px; }}
        button, .btn {{
            display: inline-block;
            width: 100%;
            margin-top: 20px;
            padding: 14px;
            border: none;
            border-radius: 8px;
            background: #1A73E8;
            color: white;
            font-size: 1rem;
            font-weight: 600;
            text-align: center;
            text-decoration: none;
            cursor: pointer;
        }}
        button:disabled {{ background: #b0b8c1; cursor: not-allowed; }}
        .secondary {{ background: #f2f4f6; color: #333d4b; }}
        .message {{ margin: 16px 0; padding: 12px; border-radius: 8px; background: #fff4e5; }}
        .error {{ background: #fdecea; color: #b3261e; }}
        .success {{ background: #e8f5e9; color: #1b5e20; }}
        .muted {{ color: #8b95a1; font-size: 0.9rem; }}
        .row {{ display: flex; gap: 8px; align-items: center; }}
        .timer {{ color: #E50914; font-weight: 700; }}
    </style>
</head>
<body>
<main>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
        head_extra = head_extra,
        body = body
    )
}

fn message_block(message: Option<&str>, class: &str) -> String {
    match message {
        Some(m) if !m.trim().is_empty() => {
            format!(r#"<div class="message {}">{}</div>"#, class, escape(m))
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Client app
// ---------------------------------------------------------------------------

pub fn login_page(message: Option<&str>) -> String {
    let body = format!(
        r#"<h1>Continue Bank</h1>
{message}
<form method="post" action="/login">
    <label for="username">Username</label>
    <input id="username" name="username" autocomplete="username" required>
    <label for="password">Password</label>
    <input id="password" name="password" type="password" autocomplete="current-password" required>
    <button type="submit">Log in</button>
</form>
<a class="btn secondary" href="/signup">Sign up</a>
<a class="btn secondary" href="/find-id">Find my username</a>"#,
        message = message_block(message, "error")
    );
    layout("Log in - Continue Bank", "", &body)
}

pub fn dashboard_page(username: &str, profile: Option<&UserProfile>, message: Option<&str>) -> String {
    let display_name = profile.map(|p| p.name.as_str()).unwrap_or(username);
    let body = format!(
        r#"<h1>Hello, {name}</h1>
{message}
<a class="btn" href="/create-account">Open a new account</a>
<a class="btn secondary" href="/account-verification">Verify my identity</a>
<a class="btn secondary" href="/mypage">My page</a>
<form method="post" action="/events/consult">
    <h2>Continue Card consultation</h2>
    <p class="muted">A partner call center will contact you about the card.</p>
    <label><input type="checkbox" name="essential"> I agree to the collection of my contact details (required)</label>
    <label><input type="checkbox" name="optional"> I agree to marketing use and provision to the partner TM center</label>
    <button type="submit">Request a consultation</button>
</form>
<a class="btn secondary" href="/logout">Log out</a>"#,
        name = escape(display_name),
        message = message_block(message, "")
    );
    layout("Dashboard - Continue Bank", "", &body)
}

fn term_title(key: &str) -> &'static str {
    match key {
        "age" => "I am 14 or older and the account is in my name",
        "terms" => "Continue Bank terms of service",
        "privacy" => "Collection and use of personal information",
        "uniqueId" => "Processing of unique identifiers",
        "creditInfo" => "Credit information inquiry and provision",
        "electronicFinance" => "Electronic financial transaction terms",
        "monitoring" => "Transaction monitoring and record keeping",
        "thirdPartyProvision" => "[Optional] Provision to third parties",
        "ssapProvision" => "[Optional] Contact provision to partner TM center",
        "marketingPersonal" => "[Optional] Personalized product recommendations",
        "marketing" => "[Optional] Benefit and event notifications (call, SMS)",
        _ => "Agreement",
    }
}

pub fn signup_page(message: Option<&str>) -> String {
    let items: String = REQUIRED_TERMS
        .iter()
        .chain(OPTIONAL_TERMS)
        .map(|key| {
            format!(
                r#"    <label><input type="checkbox" name="{key}"{required}> {title}</label>
"#,
                key = key,
                required = if REQUIRED_TERMS.contains(key) { " required" } else { "" },
                title = escape(term_title(key))
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Terms of service</h1>
{message}
<form method="post" action="/signup">
    <label><input type="checkbox" name="agreeAll"> Agree to all, including optional items</label>
    <hr>
{items}    <button type="submit">Continue</button>
</form>"#,
        message = message_block(message, "error"),
        items = items
    );
    layout("Sign up - Continue Bank", "", &body)
}

/// Values shown on the registration form
#[derive(Debug, Default)]
pub struct RegisterView<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub phone_number: &'a str,
    pub token_id: &'a str,
    pub verified: bool,
    pub message: Option<&'a str>,
}

pub fn register_page(view: &RegisterView<'_>) -> String {
    let readonly = if view.verified { " readonly" } else { "" };
    let verification = if view.verified {
        r#"<div class="message success">Identity verification complete</div>"#.to_string()
    } else {
        r#"<button type="submit" formaction="/register/verify" formnovalidate class="secondary">Verify identity</button>"#
            .to_string()
    };

    let body = format!(
        r#"<h1>Create your membership</h1>
{message}
<form method="post" action="/register">
    <input type="hidden" name="tokenId" value="{token_id}">
    <input type="hidden" name="verified" value="{verified}">
    <label for="name">Name</label>
    <input id="name" name="name" value="{name}"{readonly}>
    <label for="phoneNumber">Phone number</label>
    <input id="phoneNumber" name="phoneNumber" value="{phone}" inputmode="numeric"{readonly}>
    {verification}
    <label for="username">Username (6-12 letters or digits)</label>
    <input id="username" name="username" value="{username}">
    <label for="password">Password</label>
    <input id="password" name="password" type="password">
    <label for="confirmPassword">Confirm password</label>
    <input id="confirmPassword" name="confirmPassword" type="password">
    <button type="submit"{disabled}>Register</button>
</form>
<a class="btn secondary" href="/login">Back to login</a>"#,
        message = message_block(view.message, "error"),
        token_id = escape(view.token_id),
        verified = if view.verified { "true" } else { "" },
        name = escape(view.name),
        phone = escape(&crate::protocol::types::hyphenate(view.phone_number)),
        readonly = readonly,
        verification = verification,
        username = escape(view.username),
        disabled = if view.verified { "" } else { " disabled" },
    );
    layout("Register - Continue Bank", "", &body)
}

pub fn callback_failed_page(message: &str, back_path: &str, back_label: &str) -> String {
    let body = format!(
        r#"<h1>{message}</h1>
<p class="muted">Something went wrong while checking the verification. Please enter your details again.</p>
<a class="btn" href="{back_path}">{back_label}</a>"#,
        message = escape(message),
        back_path = escape(back_path),
        back_label = escape(back_label)
    );
    layout("Verification result - Continue Bank", "", &body)
}

pub fn bridge_page(notice: &BridgeNotice) -> String {
    let refresh = format!(
        r#"<meta http-equiv="refresh" content="{}; url={}">"#,
        BRIDGE_DELAY_SECS,
        escape(&notice.next)
    );
    let class = match notice.kind {
        NoticeKind::Success => "success",
        NoticeKind::Error => "error",
        NoticeKind::Loading => "",
    };
    let body = format!(
        r#"<h1>{title}</h1>
<div class="message {class}">{message}</div>
<p class="muted">You will be moved on shortly.</p>
<a class="btn secondary" href="{next}">Continue now</a>"#,
        title = escape(&notice.title),
        class = class,
        message = escape(&notice.message),
        next = escape(&notice.next)
    );
    layout(&notice.title, &refresh, &body)
}

pub fn account_verification_page(message: Option<&str>) -> String {
    let body = format!(
        r#"<h1>Verify my identity</h1>
<p class="muted">Enter the name and phone number registered to your membership.</p>
{message}
<form method="post" action="/account-verification">
    <label for="name">Name</label>
    <input id="name" name="name" required>
    <label for="phoneNumber">Phone number</label>
    <input id="phoneNumber" name="phoneNumber" inputmode="numeric" required>
    <button type="submit">Continue to verification</button>
</form>
<a class="btn secondary" href="/dashboard">Back</a>"#,
        message = message_block(message, "error")
    );
    layout("Identity check - Continue Bank", "", &body)
}

/// Step of the account opening page
#[derive(Debug)]
pub enum CreateAccountStep<'a> {
    Verify,
    Details { token_id: &'a str },
    Done { account_name: &'a str, bonus_applied: bool, message: Option<&'a str> },
}

pub fn create_account_page(step: &CreateAccountStep<'_>, message: Option<&str>) -> String {
    let content = match step {
        CreateAccountStep::Verify => r#"<p class="muted">Step 1 of 2. Confirm your identity with your phone.</p>
<form method="post" action="/create-account/verify">
    <button type="submit">Verify identity</button>
</form>"#
            .to_string(),
        CreateAccountStep::Details { token_id } => format!(
            r#"<p class="muted">Step 2 of 2. Name the account and choose a PIN.</p>
<form method="post" action="/create-account">
    <input type="hidden" name="tokenId" value="{token_id}">
    <label for="accountName">Account name</label>
    <input id="accountName" name="accountName" required>
    <label for="pin">PIN (4 digits)</label>
    <input id="pin" name="pin" type="password" inputmode="numeric" maxlength="4" required>
    <button type="submit">Open account</button>
</form>"#,
            token_id = escape(token_id)
        ),
        CreateAccountStep::Done {
            account_name,
            bonus_applied,
            message,
        } => format!(
            r#"<div class="message success">Your account '{account_name}' is ready.</div>
{bonus}
{detail}"#,
            account_name = escape(account_name),
            bonus = if *bonus_applied {
                r#"<p>A welcome bonus has been credited to your account.</p>"#
            } else {
                ""
            },
            detail = message.map(|m| format!(r#"<p class="muted">{}</p>"#, escape(m))).unwrap_or_default()
        ),
    };

    let body = format!(
        r#"<h1>Open an account</h1>
{message}
{content}
<a class="btn secondary" href="/dashboard">Back to dashboard</a>"#,
        message = message_block(message, "error"),
        content = content
    );
    layout("Open an account - Continue Bank", "", &body)
}

pub fn find_id_page(found: Option<&str>, message: Option<&str>) -> String {
    let content = match found {
        Some(masked) => format!(
            r#"<p>The username registered to you is</p>
<h2>{}</h2>
<a class="btn" href="/login">Log in</a>"#,
            escape(masked)
        ),
        None => r#"<form method="post" action="/find-id">
    <label for="name">Name</label>
    <input id="name" name="name" required>
    <label for="phoneNumber">Phone number</label>
    <input id="phoneNumber" name="phoneNumber" inputmode="numeric" required>
    <button type="submit">Verify identity</button>
</form>
<a class="btn secondary" href="/login">Back to login</a>"#
            .to_string(),
    };
    let body = format!(
        "<h1>Find my username</h1>\n{}\n{}",
        message_block(message, "error"),
        content
    );
    layout("Find username - Continue Bank", "", &body)
}

/// Username with everything after the second character masked
pub fn mask_username(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 2 {
        return id.to_string();
    }
    let mut masked: String = chars[..2].iter().collect();
    masked.push_str(&"*".repeat(chars.len() - 2));
    masked
}

pub fn mypage(profile: Option<&UserProfile>, username: &str, consent: &ConsentStatus, message: Option<&str>) -> String {
    let toggles: String = ConsentType::ALL
        .iter()
        .map(|consent_type| {
            let agreed = consent.get(*consent_type);
            format!(
                r#"<form method="post" action="/mypage/consent" class="row">
    <input type="hidden" name="consentType" value="{value}">
    <input type="hidden" name="agreed" value="{next}">
    <span style="flex:1">{label}: <strong>{state}</strong></span>
    <button type="submit" class="secondary" style="width:auto;margin:0">{action}</button>
</form>
"#,
                value = consent_type.as_str(),
                next = !agreed,
                label = escape(consent_type.label()),
                state = if agreed { "Agreed" } else { "Not agreed" },
                action = if agreed { "Withdraw" } else { "Agree" }
            )
        })
        .collect();

    let (name, phone) = match profile {
        Some(p) => (p.name.clone(), mask_phone(&p.phone_number)),
        None => (username.to_string(), String::new()),
    };
    let body = format!(
        r#"<h1>My page</h1>
{message}
<p><strong>{name}</strong> ({username})<br><span class="muted">{phone}</span></p>
<h2>Consent settings</h2>
{toggles}
<a class="btn secondary" href="/dashboard">Back to dashboard</a>"#,
        message = message_block(message, ""),
        name = escape(&name),
        username = escape(username),
        phone = escape(&phone),
        toggles = toggles
    );
    layout("My page - Continue Bank", "", &body)
}

// ---------------------------------------------------------------------------
// Verification app
// ---------------------------------------------------------------------------

pub fn verify_denied_page() -> String {
    let body = r#"<h1>Abnormal access</h1>
<p>Direct access by typing the address is blocked by security policy.</p>
<p><strong>Please start from the partner service.</strong></p>
<p class="muted">Access Denied<br>Security ID: UNAUTHORIZED_DIRECT_ACCESS</p>
<button type="button" onclick="window.close()">OK</button>"#;
    layout("Identity verification - SSAP", "", body)
}

/// Everything the verification page needs to render
#[derive(Debug)]
pub struct VerifyView<'a> {
    pub form: &'a OtpForm,
    pub remaining: i64,
    pub resend_locked: bool,
    /// A backend call for this token is still running
    pub submitting: bool,
    pub back_target: Option<&'a str>,
    /// Query string to keep on form actions
    pub query: &'a str,
    pub message: Option<&'a str>,
}

pub fn verify_page(view: &VerifyView<'_>) -> String {
    let form = view.form;
    let carriers: String = Carrier::ALL
        .iter()
        .map(|c| {
            format!(
                r#"<option value="{value}"{selected}>{label}</option>"#,
                value = escape(c.as_str()),
                selected = if form.carrier == Some(*c) { " selected" } else { "" },
                label = escape(c.label())
            )
        })
        .collect();

    let sent = form.otp_sent();
    let frozen = if sent { " readonly" } else { "" };
    let name_ro = if form.name_locked || sent { " readonly" } else { "" };
    let phone_ro = if form.phone_locked || sent { " readonly" } else { "" };
    let back = match view.back_target {
        Some(url) => format!(r#"<a href="{}">&larr; Back</a>"#, escape(url)),
        None => r#"<a href="javascript:history.back()">&larr; Back</a>"#.to_string(),
    };

    let otp_section = if sent {
        format!(
            r#"<form method="post" action="/verify/confirm?{query}">
    <label for="otp">Verification code <span class="timer" id="timer" data-remaining="{remaining}">{clock}</span></label>
    <input id="otp" name="otp" inputmode="numeric" maxlength="6" pattern="[0-9]{{6}}" value="{prefill}" autocomplete="one-time-code">
    <button type="submit" id="confirm"{confirm_disabled}>Confirm</button>
</form>"#,
            confirm_disabled = if view.submitting { " disabled" } else { "" },
            query = escape(view.query),
            remaining = view.remaining,
            clock = format_clock(view.remaining),
            prefill = escape(form.test_otp.as_deref().unwrap_or_default())
        )
    } else {
        String::new()
    };

    let script = format!(
        r#"<script>
(function () {{
    var el = document.getElementById('timer');
    var resend = document.getElementById('resend');
    if (!el) return;
    var left = parseInt(el.dataset.remaining, 10);
    var tick = function () {{
        var m = Math.floor(left / 60), s = left % 60;
        el.textContent = m + ':' + (s < 10 ? '0' : '') + s;
        if (resend && !resend.hasAttribute('data-busy') && left <= {lock}) resend.disabled = false;
        if (left > 0) {{ left -= 1; setTimeout(tick, 1000); }}
    }};
    tick();
}})();
</script>"#,
        lock = RESEND_LOCK_ABOVE_SECS
    );

    let body = format!(
        r#"{back}
<h1>Identity verification</h1>
{message}
<form method="post" action="/verify/request-otp?{query}">
    <label for="name">Name</label>
    <input id="name" name="name" value="{name}"{name_ro}>
    <label for="residentFront">Date of birth (first 6 digits of resident number)</label>
    <input id="residentFront" name="residentFront" value="{resident}" inputmode="numeric" maxlength="6"{frozen}>
    <label for="carrier">Carrier</label>
    <select id="carrier" name="carrier">
        <option value="" disabled{placeholder}>Select your carrier</option>
        {carriers}
    </select>
    <label for="phoneNumber">Phone number</label>
    <input id="phoneNumber" name="phoneNumber" value="{phone}" inputmode="numeric"{phone_ro}>
    <label><input type="checkbox" name="agreed"{consent}> I agree to the identity verification terms (required)</label>
    <button type="submit" id="resend"{resend_disabled}>{request_label}</button>
</form>
{otp_section}
<p class="muted">The code is valid for {validity} minutes.</p>
{script}"#,
        back = back,
        message = message_block(view.message, ""),
        query = escape(view.query),
        name = escape(&form.name),
        name_ro = name_ro,
        resident = escape(&form.resident_front),
        frozen = frozen,
        placeholder = if form.carrier.is_none() { " selected" } else { "" },
        carriers = carriers,
        phone = escape(&form.phone),
        phone_ro = phone_ro,
        consent = if form.consent { " checked" } else { "" },
        resend_disabled = if view.submitting {
            " disabled data-busy"
        } else if view.resend_locked {
            " disabled"
        } else {
            ""
        },
        request_label = if sent { "Resend code" } else { "Request code" },
        otp_section = otp_section,
        validity = OTP_VALIDITY_SECS / 60,
        script = if sent { script } else { String::new() },
    );
    layout("Identity verification - SSAP", "", &body)
}

pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn verify_complete_page(message: &str) -> String {
    let body = format!(
        r#"<h1>Verification complete</h1>
<div class="message success">{}</div>
<button type="button" onclick="window.close()">Close</button>"#,
        escape(message)
    );
    layout("Identity verification - SSAP", "", &body)
}
