// Guest request domain types shared by ingestion, persistence and the protocol layer
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A property that guest requests can be addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub hotel_code: String,
    pub hotel_name: String,
}

impl Hotel {
    pub fn new(hotel_code: impl Into<String>, hotel_name: impl Into<String>) -> Self {
        Self {
            hotel_code: hotel_code.into(),
            hotel_name: hotel_name.into(),
        }
    }
}

/// Lifecycle of a guest request. Transitions only move forward:
/// `Pending -> Sent -> Acknowledged`, with `Pending -> Acknowledged`
/// allowed when the PMS acknowledges an ID it obtained out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Sent,
    Acknowledged,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Sent => "sent",
            RequestStatus::Acknowledged => "acknowledged",
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Sent)
                | (RequestStatus::Pending, RequestStatus::Acknowledged)
                | (RequestStatus::Sent, RequestStatus::Acknowledged)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Acknowledged)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "sent" => Ok(RequestStatus::Sent),
            "acknowledged" => Ok(RequestStatus::Acknowledged),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}

/// Guest salutation. Never guessed: an absent value stays `Unspecified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Unspecified => "",
        }
    }

    /// Parses the wire value. Empty input maps to `Unspecified`, anything
    /// other than the two enumerated values is rejected.
    pub fn parse(value: &str) -> Option<Gender> {
        match value.trim() {
            "" => Some(Gender::Unspecified),
            "Male" => Some(Gender::Male),
            "Female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// A room or offer picked on the marketing site, split from `CODE|Name`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub raw: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.code.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestRequest {
    pub request_id: String,
    pub hotel_code: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub adult_count: u32,
    pub children_count: u32,
    pub child_ages: Vec<u32>,
    pub room: Selection,
    pub offer: Selection,
    pub gender: Gender,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub language: String,
    pub comments: Option<String>,
    pub origin: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Audit event kinds written to the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEvent {
    Submitted,
    Sent,
    Acknowledged,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::Submitted => "submitted",
            LogEvent::Sent => "sent",
            LogEvent::Acknowledged => "acknowledged",
        }
    }

    pub fn default_details(&self) -> &'static str {
        match self {
            LogEvent::Submitted => "Guest request submitted",
            LogEvent::Sent => "Request sent to PMS",
            LogEvent::Acknowledged => "Request acknowledged by PMS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub event_type: LogEvent,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestLogEntry {
    pub fn new(request_id: impl Into<String>, event_type: LogEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            request_id: request_id.into(),
            event_type,
            details: event_type.default_details().to_string(),
            timestamp,
        }
    }

    /// Names the protocol client that caused the event in the details.
    pub fn by_client(mut self, client_id: Option<&str>) -> Self {
        if let Some(client_id) = client_id {
            self.details = format!("{} (client {client_id})", self.details);
        }
        self
    }
}

/// Booking form payload as posted by the marketing site adapter.
/// All fields are optional at the type level so that validation can report
/// every violated rule at once instead of failing on the first missing key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Submission {
    pub language: Option<String>,
    pub period: Option<String>,
    pub adults: Option<Value>,
    pub children: Option<Value>,
    pub child_age1: Option<Value>,
    pub child_age2: Option<Value>,
    pub child_age3: Option<Value>,
    pub child_age4: Option<Value>,
    pub child_age5: Option<Value>,
    pub selected_room: Option<String>,
    pub selected_offer: Option<String>,
    #[serde(alias = "salutation")]
    pub gender: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub comments: Option<String>,
    pub privacy_consent: Option<Value>,
    pub origin: Option<String>,
}

// Numeric form fields stay raw JSON so a wrongly typed value becomes a
// validation message instead of a rejected body.
impl Submission {
    /// Child age slots in form order, absent slots dropped.
    pub fn child_age_slots(&self) -> Vec<&Value> {
        [
            &self.child_age1,
            &self.child_age2,
            &self.child_age3,
            &self.child_age4,
            &self.child_age5,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Integral value of a JSON number, `None` for strings, fractions and other types.
pub fn whole_number(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}
