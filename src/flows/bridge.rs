use serde::Deserialize;

/// Seconds before the bridge page moves on
pub const BRIDGE_DELAY_SECS: f32 = 2.5;
pub const DEFAULT_NEXT: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Loading,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Loading => "loading",
        }
    }
}

/// Query string of `/auth/bridge`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub title: Option<String>,
    pub next: Option<String>,
}

/// Transient status page shown before an automatic redirect
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeNotice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    pub next: String,
}

impl BridgeNotice {
    pub fn from_query(query: &BridgeQuery) -> Self {
        let kind = match query.kind.as_deref() {
            Some("success") => NoticeKind::Success,
            Some("error") => NoticeKind::Error,
            _ => NoticeKind::Loading,
        };
        let (default_title, default_message) = match kind {
            NoticeKind::Success => ("Confirmed", "Your request was processed successfully."),
            NoticeKind::Error => ("Check failed", "Your request could not be processed."),
            NoticeKind::Loading => ("Checking your information", "Please wait a moment."),
        };
        // Loading keeps the defaults whatever the query says
        let pick = |value: &Option<String>, default: &str| match (kind, value.as_deref()) {
            (NoticeKind::Loading, _) | (_, None) => default.to_string(),
            (_, Some(v)) if v.trim().is_empty() => default.to_string(),
            (_, Some(v)) => v.to_string(),
        };

        Self {
            kind,
            title: pick(&query.title, default_title),
            message: pick(&query.message, default_message),
            next: safe_next(query.next.as_deref()),
        }
    }

    pub fn error(title: &str, message: &str, next: &str) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: title.to_string(),
            message: message.to_string(),
            next: safe_next(Some(next)),
        }
    }

    pub fn success(title: &str, message: &str, next: &str) -> Self {
        Self {
            kind: NoticeKind::Success,
            title: title.to_string(),
            message: message.to_string(),
            next: safe_next(Some(next)),
        }
    }

    /// `/auth/bridge?...` path carrying this notice.
    pub fn to_path(&self) -> String {
        format!(
            "/auth/bridge?type={}&message={}&next={}&title={}",
            self.kind.as_str(),
            urlencoding::encode(&self.message),
            urlencoding::encode(&self.next),
            urlencoding::encode(&self.title)
        )
    }
}

/// Only same-site absolute paths are followed.
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => DEFAULT_NEXT.to_string(),
    }
}
