// AlpineBits transport envelope: headers, Basic credentials and the multipart action/request fields

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::config::ProtocolAuthConfig;

pub const PROTOCOL_VERSION_HEADER: &str = "X-AlpineBits-ClientProtocolVersion";
pub const CLIENT_ID_HEADER: &str = "X-AlpineBits-ClientID";
pub const BASIC_CHALLENGE: &str = r#"Basic realm="AlpineBits""#;

/// The protocol actions this service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Handshake,
    Read,
    Acknowledge,
}

// Both historical spellings of every action.
const SPELLINGS: &[(&str, Action)] = &[
    ("OTA_Ping:Handshaking", Action::Handshake),
    ("action_OTA_Ping", Action::Handshake),
    ("OTA_Read:GuestRequests", Action::Read),
    ("action_OTA_Read", Action::Read),
    ("OTA_NotifReport:GuestRequests", Action::Acknowledge),
    ("action_OTA_NotifReport", Action::Acknowledge),
];

impl Action {
    pub fn from_wire(value: &str) -> Option<Action> {
        SPELLINGS
            .iter()
            .find(|(spelling, _)| *spelling == value)
            .map(|(_, action)| *action)
    }

    /// OTA message family, as used in error texts.
    pub fn message_name(&self) -> &'static str {
        match self {
            Action::Handshake => "OTA_Ping",
            Action::Read => "OTA_Read",
            Action::Acknowledge => "OTA_NotifReport",
        }
    }

    /// Root element of the XML response for this action.
    pub fn response_root(&self) -> &'static str {
        match self {
            Action::Handshake => "OTA_PingRS",
            Action::Read => "OTA_ResRetrieveRS",
            Action::Acknowledge => "OTA_NotifReportRS",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("missing X-AlpineBits-ClientProtocolVersion header")]
    MissingProtocolVersion,

    #[error("authentication not configured")]
    AuthNotConfigured,

    #[error("invalid or missing username/password")]
    InvalidCredentials,

    #[error("no valid client id provided")]
    MissingClientId,

    #[error("invalid content type, multipart/form-data required")]
    InvalidContentType,

    #[error("invalid multipart body")]
    MalformedBody,

    #[error("missing or invalid action parameter")]
    MissingAction,

    #[error("invalid action '{0}'")]
    UnsupportedAction(String),

    #[error("missing request parameter for {}", .0.message_name())]
    MissingRequest(Action),
}

impl EnvelopeError {
    pub fn status(&self) -> u16 {
        match self {
            EnvelopeError::AuthNotConfigured => 500,
            EnvelopeError::InvalidCredentials => 401,
            _ => 400,
        }
    }

    pub fn wire_message(&self) -> String {
        format!("ERROR:{self}")
    }

    /// Whether the response must carry a `WWW-Authenticate` challenge.
    pub fn needs_challenge(&self) -> bool {
        matches!(self, EnvelopeError::InvalidCredentials)
    }
}

/// Validated client identity, available to the action handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub protocol_version: String,
    pub client_id: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Decodes `Basic <base64(user:pass)>`. The password may contain `:`.
pub fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Header checks in the order the PMS expects them reported: protocol
/// version, server credentials, client credentials, client id.
pub fn authorize(
    headers: &HeaderMap,
    auth: &ProtocolAuthConfig,
) -> Result<ClientContext, EnvelopeError> {
    let protocol_version =
        header_str(headers, PROTOCOL_VERSION_HEADER).ok_or(EnvelopeError::MissingProtocolVersion)?;

    let (expected_user, expected_pass) =
        auth.credentials().ok_or(EnvelopeError::AuthNotConfigured)?;

    let (user, pass) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic)
        .ok_or(EnvelopeError::InvalidCredentials)?;
    if user != expected_user || pass != expected_pass {
        return Err(EnvelopeError::InvalidCredentials);
    }

    let client_id = header_str(headers, CLIENT_ID_HEADER).map(str::to_string);
    if auth.require_client_id && client_id.is_none() {
        return Err(EnvelopeError::MissingClientId);
    }

    Ok(ClientContext {
        protocol_version: protocol_version.to_string(),
        client_id,
    })
}

pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("multipart/form-data"))
        .unwrap_or(false)
}

/// The two form fields, each already normalized to text whether it arrived
/// inline or as a file part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolForm {
    pub action: Option<String>,
    pub request: Option<String>,
}

impl ProtocolForm {
    /// Stores a part. Parts that are not valid UTF-8 count as absent.
    pub fn set_part(&mut self, name: &str, bytes: &[u8]) {
        let slot = match name {
            "action" => &mut self.action,
            "request" => &mut self.request,
            _ => return,
        };
        if slot.is_some() {
            return;
        }
        *slot = std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    /// Resolves the action and its XML payload.
    pub fn resolve(self) -> Result<(Action, String), EnvelopeError> {
        let action_name = self
            .action
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or(EnvelopeError::MissingAction)?;
        let action = Action::from_wire(&action_name)
            .ok_or_else(|| EnvelopeError::UnsupportedAction(action_name.clone()))?;
        let request = self
            .request
            .filter(|r| !r.trim().is_empty())
            .ok_or(EnvelopeError::MissingRequest(action))?;
        Ok((action, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use test_case::test_case;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn auth() -> ProtocolAuthConfig {
        ProtocolAuthConfig::new("pms", "s3:cret")
    }

    #[test_case("OTA_Ping:Handshaking", Some(Action::Handshake))]
    #[test_case("action_OTA_Ping", Some(Action::Handshake))]
    #[test_case("OTA_Read:GuestRequests", Some(Action::Read))]
    #[test_case("action_OTA_Read", Some(Action::Read))]
    #[test_case("OTA_NotifReport:GuestRequests", Some(Action::Acknowledge))]
    #[test_case("action_OTA_NotifReport", Some(Action::Acknowledge))]
    #[test_case("action_ota_read", None)]
    #[test_case("OTA_HotelInvCountNotif:FreeRooms", None)]
    fn test_action_spellings(wire: &str, expected: Option<Action>) {
        assert_eq!(Action::from_wire(wire), expected);
    }

    #[test]
    fn test_authorize_success_exposes_context() {
        let h = headers(&[
            ("x-alpinebits-clientprotocolversion", "2024-10"),
            ("authorization", basic("pms", "s3:cret").as_str()),
            ("x-alpinebits-clientid", "asa-1"),
        ]);
        assert_eq!(
            authorize(&h, &auth()),
            Ok(ClientContext {
                protocol_version: "2024-10".into(),
                client_id: Some("asa-1".into()),
            })
        );
    }

    #[test]
    fn test_protocol_version_checked_before_credentials() {
        let h = headers(&[("authorization", "garbage")]);
        let err = authorize(&h, &ProtocolAuthConfig::default()).unwrap_err();
        assert_eq!(err, EnvelopeError::MissingProtocolVersion);
        assert_eq!(err.status(), 400);
        assert_eq!(
            err.wire_message(),
            "ERROR:missing X-AlpineBits-ClientProtocolVersion header"
        );
    }

    #[test]
    fn test_unconfigured_credentials_is_server_error() {
        let h = headers(&[("x-alpinebits-clientprotocolversion", "2024-10")]);
        let err = authorize(&h, &ProtocolAuthConfig::default()).unwrap_err();
        assert_eq!(err, EnvelopeError::AuthNotConfigured);
        assert_eq!(err.status(), 500);
    }

    #[test_case(None ; "missing header")]
    #[test_case(Some("Bearer abc") ; "wrong scheme")]
    #[test_case(Some("Basic !!!not-base64") ; "undecodable")]
    #[test_case(Some("Basic cG1z") ; "no colon")]
    #[test_case(Some("Basic cG1zOndyb25n") ; "wrong password")]
    fn test_bad_credentials_challenge(authorization: Option<&str>) {
        let mut pairs = vec![("x-alpinebits-clientprotocolversion", "2024-10")];
        if let Some(value) = authorization {
            pairs.push(("authorization", value));
        }
        let err = authorize(&headers(&pairs), &auth()).unwrap_err();
        assert_eq!(err, EnvelopeError::InvalidCredentials);
        assert_eq!(err.status(), 401);
        assert!(err.needs_challenge());
    }

    #[test]
    fn test_required_client_id() {
        let h = headers(&[
            ("x-alpinebits-clientprotocolversion", "2024-10"),
            ("authorization", basic("pms", "s3:cret").as_str()),
        ]);
        let strict = auth().with_require_client_id(true);
        assert_eq!(authorize(&h, &strict), Err(EnvelopeError::MissingClientId));
        assert_eq!(authorize(&h, &auth()).unwrap().client_id, None);
    }

    #[test]
    fn test_multipart_detection() {
        assert!(is_multipart(&headers(&[(
            "content-type",
            "multipart/form-data; boundary=xyz"
        )])));
        assert!(!is_multipart(&headers(&[("content-type", "application/xml")])));
        assert!(!is_multipart(&HeaderMap::new()));
    }

    #[test]
    fn test_form_resolution_errors() {
        assert_eq!(
            ProtocolForm::default().resolve(),
            Err(EnvelopeError::MissingAction)
        );

        let unknown = ProtocolForm {
            action: Some("action_OTA_Foo".into()),
            request: Some("<x/>".into()),
        };
        assert_eq!(
            unknown.resolve().unwrap_err().wire_message(),
            "ERROR:invalid action 'action_OTA_Foo'"
        );

        let missing = ProtocolForm {
            action: Some("OTA_Read:GuestRequests".into()),
            request: None,
        };
        assert_eq!(
            missing.resolve().unwrap_err().wire_message(),
            "ERROR:missing request parameter for OTA_Read"
        );
    }

    #[test]
    fn test_form_parts_normalized_to_text() {
        let mut form = ProtocolForm::default();
        form.set_part("action", b"action_OTA_NotifReport");
        form.set_part("request", "<OTA_NotifReportRQ/>".as_bytes());
        form.set_part("request", b"<ignored/>");
        form.set_part("other", b"x");

        assert_eq!(
            form.resolve(),
            Ok((Action::Acknowledge, "<OTA_NotifReportRQ/>".to_string()))
        );

        let mut binary = ProtocolForm::default();
        binary.set_part("action", b"action_OTA_Ping");
        binary.set_part("request", &[0xff, 0xfe]);
        assert_eq!(
            binary.resolve(),
            Err(EnvelopeError::MissingRequest(Action::Handshake))
        );
    }
}
