// AlpineBits XML codec: lenient scraping of inbound requests and writers for the responses
use std::borrow::Cow;
use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::{partial_escape, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::se::{QuoteLevel, Serializer};
use quick_xml::Writer;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::model::{GuestRequest, Hotel};
use crate::xml_response::{
    XmlErrorResponse, XmlHotelReservation, XmlNotifReportResponse, XmlResRetrieveResponse,
    OTA_NAMESPACE,
};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// Sample protocol requests (the actual files are stored in the samples directory)
pub const SAMPLE_PING_REQUEST_PATH: &str = "samples/ping_request.xml";
pub const SAMPLE_READ_REQUEST_PATH: &str = "samples/read_request.xml";
pub const SAMPLE_NOTIF_REPORT_REQUEST_PATH: &str = "samples/notif_report_request.xml";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("XML write error: {0}")]
    Write(String),

    #[error("XML serialization error: {0}")]
    Serialize(String),
}

fn write_err(e: impl Display) -> CodecError {
    CodecError::Write(e.to_string())
}

fn serialize_err(e: impl Display) -> CodecError {
    CodecError::Serialize(e.to_string())
}

/// Handshake request as scraped from an `OTA_PingRQ`.
#[derive(Debug, Clone, PartialEq)]
pub struct PingRequest {
    /// Exactly the bytes found between `<EchoData>` and `</EchoData>`.
    pub echo_data: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub hotel_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgeRequest {
    pub request_ids: Vec<String>,
}

fn attribute_value(attr: &Attribute<'_>) -> Option<String> {
    let raw = std::str::from_utf8(&attr.value).ok()?;
    let value = unescape(raw).unwrap_or(Cow::Borrowed(raw));
    Some(value.into_owned())
}

fn find_attribute(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local)
        .and_then(|attr| attribute_value(&attr))
        .filter(|value| !value.is_empty())
}

/// Raw content of the first `EchoData` element, untouched.
pub fn extract_echo_data(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"EchoData" => {
                let text = reader.read_text(e.name()).ok()?;
                return Some(text.to_string());
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                debug!(position = reader.error_position(), error = %e, "Unreadable ping request");
                return None;
            }
            _ => (),
        }
    }
}

/// Extracts the echo payload and the client capability document. The JSON
/// is parsed from a trimmed, entity-decoded copy; `echo_data` keeps the
/// text as received.
pub fn parse_ping(xml: &str) -> Option<PingRequest> {
    let echo_data = extract_echo_data(xml)?;
    let trimmed = echo_data.trim();
    let decoded = unescape(trimmed).unwrap_or(Cow::Borrowed(trimmed));

    match serde_json::from_str::<Capabilities>(&decoded) {
        Ok(capabilities) => Some(PingRequest {
            echo_data,
            capabilities,
        }),
        Err(e) => {
            debug!(error = %e, "EchoData is not a capability document");
            None
        }
    }
}

/// Finds the hotel code of an `OTA_ReadRQ`. Any element may carry the
/// `HotelCode` attribute; the first non-empty one wins.
pub fn parse_read(xml: &str) -> Option<ReadRequest> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut saw_read_rq = false;
    let mut hotel_code: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"OTA_ReadRQ" {
                    saw_read_rq = true;
                }
                if hotel_code.is_none() {
                    hotel_code = find_attribute(&e, b"HotelCode");
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(position = reader.error_position(), error = %e, "Stopped scanning read request");
                break;
            }
            _ => (),
        }
    }

    match (saw_read_rq, hotel_code) {
        (true, Some(hotel_code)) => Some(ReadRequest { hotel_code }),
        _ => None,
    }
}

/// Collects the `ID` attribute of every `UniqueID` element in document order.
pub fn parse_acknowledge(xml: &str) -> Option<AcknowledgeRequest> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut request_ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"UniqueID" =>
            {
                if let Some(id) = find_attribute(&e, b"ID") {
                    request_ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(position = reader.error_position(), error = %e, "Stopped scanning notif report");
                break;
            }
            _ => (),
        }
    }

    (!request_ids.is_empty()).then_some(AcknowledgeRequest { request_ids })
}

/// `OTA_PingRS` with the negotiated capabilities as a handshake warning and
/// the client's `EchoData` written back verbatim.
pub fn write_ping_response(
    intersection: &Capabilities,
    echo_data: &str,
) -> Result<String, CodecError> {
    let capabilities_json = serde_json::to_string_pretty(intersection).map_err(serialize_err)?;

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;

    let mut root = BytesStart::new("OTA_PingRS");
    root.push_attribute(("xmlns", OTA_NAMESPACE));
    root.push_attribute(("Version", "1.0"));
    writer.write_event(Event::Start(root)).map_err(write_err)?;
    writer
        .write_event(Event::Empty(BytesStart::new("Success")))
        .map_err(write_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("Warnings")))
        .map_err(write_err)?;
    let mut warning = BytesStart::new("Warning");
    warning.push_attribute(("Type", "11"));
    warning.push_attribute(("Status", "ALPINEBITS_HANDSHAKE"));
    writer.write_event(Event::Start(warning)).map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::from_escaped(partial_escape(
            &capabilities_json,
        ))))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("Warning")))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("Warnings")))
        .map_err(write_err)?;

    // Already-escaped input: written as is so the bytes survive unchanged.
    writer
        .write_event(Event::Start(BytesStart::new("EchoData")))
        .map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::from_escaped(echo_data)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("EchoData")))
        .map_err(write_err)?;

    writer
        .write_event(Event::End(BytesEnd::new("OTA_PingRS")))
        .map_err(write_err)?;

    String::from_utf8(writer.into_inner()).map_err(write_err)
}

fn to_document<T: Serialize>(value: &T, root: Option<&str>) -> Result<String, CodecError> {
    let mut body = String::new();
    let mut serializer = match root {
        Some(root) => Serializer::with_root(&mut body, Some(root)).map_err(serialize_err)?,
        None => Serializer::new(&mut body),
    };
    serializer.indent(' ', 2);
    serializer.set_quote_level(QuoteLevel::Full);
    value.serialize(serializer).map_err(serialize_err)?;

    Ok(format!("{XML_DECLARATION}\n{body}"))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `OTA_ResRetrieveRS` listing the given requests, all owned by `hotel`.
pub fn write_read_response(requests: &[GuestRequest], hotel: &Hotel) -> Result<String, CodecError> {
    let reservations = requests
        .iter()
        .map(|request| XmlHotelReservation::from_request(request, hotel))
        .collect();
    to_document(&XmlResRetrieveResponse::new(reservations), None)
}

pub fn write_notif_report_response(at: DateTime<Utc>) -> Result<String, CodecError> {
    to_document(&XmlNotifReportResponse::new(timestamp(at)), None)
}

/// Minimal `<Errors>` envelope under the response root of the failing action.
pub fn write_error_response(
    root: &str,
    message: &str,
    at: DateTime<Utc>,
) -> Result<String, CodecError> {
    to_document(&XmlErrorResponse::new(message, timestamp(at)), Some(root))
}
