//! HTTP transport for session cookies
//!
//! Pulls the session cookie out of `Cookie` headers, renders `Set-Cookie` values,
//! and wraps a request handler so it sees a decrypted session and returns session
//! updates instead of touching headers itself.

use std::sync::Arc;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie as HttpCookie};
use actix_web::HttpRequest;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

use crate::cookie::EncryptedSession;
use crate::error::CookieError;
use crate::keys::ServerKeySet;
use crate::random::RandomSource;
use crate::session::{decrypt_session, encrypt_session, reissue_session, ExtendedPayloadWrapper};
use crate::settings::{is_valid_format, AuthCookieSettings, CookieFlag, DEFAULT_EXPIRATION_FORMAT};

pub const SET_COOKIE: &str = "Set-Cookie";

/// What a wrapped handler wants done with the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate<T> {
    /// Leave the cookie as it is (re-issued only if it needs renewal)
    Keep,
    /// Issue a cookie carrying this session
    Set(T),
    /// Tell the client to delete the cookie
    Clear,
}

/// Find the session cookie value in a list of request headers
///
/// Only `Cookie` headers are considered; an empty value counts as absent.
#[must_use]
pub fn find_session_cookie(
    settings: &AuthCookieSettings,
    headers: &[(String, String)],
) -> Option<String> {
    headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
        .flat_map(|(_, value)| value.split(';'))
        .filter_map(|pair| HttpCookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == settings.session_field)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Decrypt the session carried by `headers`, if any
///
/// # Errors
///
/// Returns an error if a session cookie is present but fails verification
pub fn session_from_headers<T, K>(
    settings: &AuthCookieSettings,
    keys: &K,
    headers: &[(String, String)],
) -> Result<Option<ExtendedPayloadWrapper<T>>, CookieError>
where
    T: DeserializeOwned,
    K: ServerKeySet + ?Sized,
{
    find_session_cookie(settings, headers)
        .map(|value| decrypt_session(settings, keys, &value))
        .transpose()
}

/// Decrypt the session carried by an actix request, if any
///
/// # Errors
///
/// Returns an error if a session cookie is present but fails verification
pub fn session_from_request<T, K>(
    settings: &AuthCookieSettings,
    keys: &K,
    req: &HttpRequest,
) -> Result<Option<ExtendedPayloadWrapper<T>>, CookieError>
where
    T: DeserializeOwned,
    K: ServerKeySet + ?Sized,
{
    match req.cookie(&settings.session_field) {
        Some(cookie) if !cookie.value().is_empty() => {
            decrypt_session(settings, keys, cookie.value()).map(Some)
        }
        _ => Ok(None),
    }
}

/// Build the cookie that carries an encrypted session
#[must_use]
pub fn session_cookie(
    settings: &AuthCookieSettings,
    session: &EncryptedSession,
) -> HttpCookie<'static> {
    HttpCookie::build(settings.session_field.clone(), session.as_str().to_owned())
        .path(settings.path.clone())
        .max_age(CookieDuration::seconds(settings.max_age_seconds))
        .http_only(settings.has_flag(CookieFlag::HttpOnly))
        .secure(settings.has_flag(CookieFlag::Secure))
        .finish()
}

/// `Set-Cookie` header carrying an encrypted session
#[must_use]
pub fn set_cookie_header(
    settings: &AuthCookieSettings,
    session: &EncryptedSession,
) -> (String, String) {
    (
        SET_COOKIE.to_string(),
        session_cookie(settings, session).to_string(),
    )
}

/// `Set-Cookie` value deleting the session cookie
///
/// The value is empty and `Expires` is the Unix epoch rendered with the configured
/// expiration format.
#[must_use]
pub fn expired_cookie(settings: &AuthCookieSettings) -> String {
    let format = if is_valid_format(&settings.expiration_format) {
        settings.expiration_format.as_str()
    } else {
        DEFAULT_EXPIRATION_FORMAT
    };
    format!(
        "{}=; Path={}; Expires={}",
        settings.session_field,
        settings.path,
        DateTime::<Utc>::UNIX_EPOCH.format(format)
    )
}

/// Wrap a handler so it receives the decrypted session and returns session updates
///
/// The returned function takes request headers and yields the handler's response
/// plus any `Set-Cookie` headers. A missing cookie reaches the handler as `None`;
/// a cookie that fails verification is returned as an error without calling the
/// handler. When the cookie was verified with a rotated key and the handler keeps
/// the session, it is re-issued under the current key.
pub fn with_auth_cookie<T, Res, R, K, H>(
    settings: Arc<AuthCookieSettings>,
    random: Arc<RandomSource<R>>,
    keys: Arc<K>,
    handler: H,
) -> impl Fn(&[(String, String)]) -> Result<(Res, Vec<(String, String)>), CookieError>
where
    T: Serialize + DeserializeOwned,
    R: RngCore,
    K: ServerKeySet + ?Sized,
    H: Fn(Option<&T>) -> (Res, SessionUpdate<T>),
{
    move |headers: &[(String, String)]| {
        let presented: Option<ExtendedPayloadWrapper<T>> =
            session_from_headers(&settings, keys.as_ref(), headers)?;
        let (response, update) = handler(presented.as_ref().map(|p| &p.session));

        let mut set_cookies = Vec::new();
        match update {
            SessionUpdate::Set(session) => {
                let encrypted = encrypt_session(&settings, random.as_ref(), keys.as_ref(), &session)?;
                debug!("Issuing session cookie '{}'", settings.session_field);
                set_cookies.push(set_cookie_header(&settings, &encrypted));
            }
            SessionUpdate::Clear => {
                debug!("Clearing session cookie '{}'", settings.session_field);
                set_cookies.push((SET_COOKIE.to_string(), expired_cookie(&settings)));
            }
            SessionUpdate::Keep => {
                if let Some(presented) = presented.filter(|p| p.renew) {
                    info!("Re-issuing session cookie verified with a rotated key");
                    let encrypted =
                        reissue_session(&settings, random.as_ref(), keys.as_ref(), &presented)?;
                    set_cookies.push(set_cookie_header(&settings, &encrypted));
                }
            }
        }

        Ok((response, set_cookies))
    }
}
