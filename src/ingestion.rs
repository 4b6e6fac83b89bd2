// Validates booking form submissions and persists them as pending guest requests

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{whole_number, Gender, GuestRequest, RequestStatus, Selection, Submission};
use crate::store::{GuestRequestStore, StoreError};

pub const DEFAULT_LANGUAGE: &str = "de";
pub const MAX_REQUEST_ID_LEN: usize = 32;

const MIN_PHONE_DIGITS: usize = 10;
const REQUEST_ID_SUFFIX_LEN: usize = 5;
const INSERT_ATTEMPTS: usize = 3;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// Placeholder values the booking form uses for "no selection".
const NOT_SPECIFIED: &[&str] = &["", "keine angabe", "not specified", "na", "n/a"];

const CALLING_CODES: &[(&str, &str)] = &[
    ("de", "49"),
    ("it", "39"),
    ("en", "44"),
    ("fr", "33"),
    ("nl", "31"),
    ("es", "34"),
    ("pl", "48"),
    ("cs", "420"),
    ("sk", "421"),
    ("sl", "386"),
    ("hr", "385"),
    ("hu", "36"),
    ("da", "45"),
];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Hotel with code '{0}' not found")]
    UnknownHotel(String),

    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Stable error code of the JSON API.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnknownHotel(_) => "INVALID_HOTEL",
            IngestError::Validation(_) => "VALIDATION_ERROR",
            IngestError::Storage(_) => "DATABASE_ERROR",
            IngestError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            IngestError::UnknownHotel(_) => 404,
            IngestError::Validation(_) => 400,
            IngestError::Storage(_) | IngestError::Internal(_) => 500,
        }
    }

    /// Message safe to return to the submitting client.
    pub fn public_message(&self) -> String {
        match self {
            IngestError::Storage(_) => "Failed to store guest request".to_string(),
            other => other.to_string(),
        }
    }
}

/// A submission that passed validation, with its typed values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubmission {
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub adult_count: u32,
    pub children_count: u32,
    pub child_ages: Vec<u32>,
    pub gender: Gender,
    pub email: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// Non-negative whole number; strings and fractions do not count.
fn count(value: &Value) -> Option<u32> {
    whole_number(value).and_then(|n| u32::try_from(n).ok())
}

/// Checks every rule and reports all violations together.
pub fn validate(submission: &Submission) -> Result<ValidSubmission, Vec<String>> {
    let mut errors = Vec::new();

    let email = match present(&submission.email) {
        None => {
            errors.push("Email is required".to_string());
            None
        }
        Some(email) if !is_valid_email(email) => {
            errors.push("Invalid email format".to_string());
            None
        }
        Some(email) => Some(email.to_string()),
    };

    if let Some(phone) = present(&submission.phone) {
        if phone.chars().filter(char::is_ascii_digit).count() < MIN_PHONE_DIGITS {
            errors.push("Invalid phone number format".to_string());
        }
    }

    let period = match present(&submission.period) {
        None => {
            errors.push("Period is required".to_string());
            None
        }
        Some(period) => {
            let parsed = split_period(period);
            if parsed.is_none() {
                errors.push("Invalid date range format".to_string());
            }
            parsed
        }
    };

    let adult_count = match submission.adults.as_ref().map(count) {
        Some(Some(adults)) if adults >= 1 => Some(adults),
        _ => {
            errors.push("At least 1 adult is required".to_string());
            None
        }
    };

    let children_count = match submission.children.as_ref().map(count) {
        None => Some(0),
        Some(Some(children)) => Some(children),
        Some(None) => {
            errors.push("Invalid children count".to_string());
            None
        }
    };

    let mut child_ages = Vec::new();
    for age in submission.child_age_slots() {
        match count(age) {
            Some(age) => child_ages.push(age),
            None => {
                errors.push("Invalid child age".to_string());
                break;
            }
        }
    }

    let gender = match submission.gender.as_deref().map(Gender::parse) {
        None => Some(Gender::Unspecified),
        Some(Some(gender)) => Some(gender),
        Some(None) => {
            errors.push("Invalid salutation value".to_string());
            None
        }
    };

    match (email, period, adult_count, children_count, gender) {
        (
            Some(email),
            Some((check_in_date, check_out_date)),
            Some(adult_count),
            Some(children_count),
            Some(gender),
        ) if errors.is_empty() => Ok(ValidSubmission {
            check_in_date,
            check_out_date,
            adult_count,
            children_count,
            child_ages,
            gender,
            email,
        }),
        _ => Err(errors),
    }
}

/// `local@domain.tld` shape: no whitespace, one `@`, a dot inside the domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn is_date_shape(value: &str) -> bool {
    value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if !is_date_shape(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Splits `YYYY-MM-DD - YYYY-MM-DD` (spaces around the separator optional)
/// into check-in and check-out. Both must be real calendar dates.
pub fn split_period(period: &str) -> Option<(NaiveDate, NaiveDate)> {
    let period = period.trim();
    let check_in = parse_date(period.get(..10)?)?;
    let rest = period.get(10..)?.trim_start().strip_prefix('-')?.trim_start();
    let check_out = parse_date(rest)?;
    Some((check_in, check_out))
}

pub fn calling_code(language: &str) -> Option<&'static str> {
    let language = language.trim().to_ascii_lowercase();
    CALLING_CODES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, code)| *code)
}

/// Rewrites a national number into international form using the calling
/// code of `language`. Numbers for unknown languages, and numbers that
/// already carry a calling code, are returned unmodified.
pub fn normalize_phone(phone: &str, language: Option<&str>) -> String {
    let phone = phone.trim();
    let Some(code) = language.and_then(calling_code) else {
        return phone.to_string();
    };
    if phone.starts_with('+') || phone.starts_with("00") {
        return phone.to_string();
    }

    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(national) => format!("+{code}{national}"),
        None if digits.starts_with(code) => phone.to_string(),
        None => format!("+{code}{digits}"),
    }
}

fn is_not_specified(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    NOT_SPECIFIED.contains(&normalized.as_str())
}

fn specified(value: &str) -> Option<String> {
    (!is_not_specified(value)).then(|| value.trim().to_string())
}

/// Splits a `CODE|Name` selection. Without a separator the whole value is the
/// name; placeholder values collapse to an empty selection.
pub fn parse_selection(raw: Option<&str>) -> Selection {
    let Some(raw) = raw.map(str::trim).filter(|r| !is_not_specified(r)) else {
        return Selection::default();
    };

    let (code, name) = match raw.split_once('|') {
        Some((code, name)) => (specified(code), specified(name)),
        None => (None, Some(raw.to_string())),
    };

    Selection {
        raw: Some(raw.to_string()),
        code,
        name,
    }
}

/// `GR_<10 timestamp digits>_<hotel fragment>_<5 random base36>`, never
/// longer than [`MAX_REQUEST_ID_LEN`] bytes. The hotel fragment is cut to 8
/// characters, then 5, then further until the bound holds.
pub fn generate_request_id<R: Rng>(
    hotel_code: &str,
    now: DateTime<Utc>,
    rng: &mut R,
) -> String {
    let millis = now.timestamp_millis().unsigned_abs().to_string();
    let timestamp = &millis[millis.len().saturating_sub(10)..];
    let suffix: String = (0..REQUEST_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    let compose = |fragment: &str| format!("GR_{timestamp}_{fragment}_{suffix}");

    for take in [8, 5] {
        let fragment: String = hotel_code.chars().take(take).collect();
        let id = compose(&fragment);
        if id.len() <= MAX_REQUEST_ID_LEN {
            return id;
        }
    }

    let mut fragment: String = hotel_code.chars().take(5).collect();
    while compose(&fragment).len() > MAX_REQUEST_ID_LEN {
        fragment.pop();
    }
    compose(&fragment)
}

pub struct Ingestion {
    store: Arc<dyn GuestRequestStore>,
    default_language: String,
}

impl Ingestion {
    pub fn new(store: Arc<dyn GuestRequestStore>, default_language: impl Into<String>) -> Self {
        Self {
            store,
            default_language: default_language.into(),
        }
    }

    /// Builds the `pending` record for an already validated submission.
    pub fn build_request(
        &self,
        hotel_code: &str,
        submission: &Submission,
        valid: ValidSubmission,
        request_id: String,
        now: DateTime<Utc>,
    ) -> GuestRequest {
        let own_language = present(&submission.language);
        let phone_number = present(&submission.phone)
            .map(|phone| normalize_phone(phone, own_language))
            .unwrap_or_default();

        GuestRequest {
            request_id,
            hotel_code: hotel_code.to_string(),
            check_in_date: valid.check_in_date,
            check_out_date: valid.check_out_date,
            adult_count: valid.adult_count,
            children_count: valid.children_count,
            child_ages: valid.child_ages,
            room: parse_selection(submission.selected_room.as_deref()),
            offer: parse_selection(submission.selected_offer.as_deref()),
            gender: valid.gender,
            first_name: present(&submission.first_name).unwrap_or_default().to_string(),
            last_name: present(&submission.last_name).unwrap_or_default().to_string(),
            phone_number,
            email: valid.email,
            language: own_language
                .map(str::to_string)
                .unwrap_or_else(|| self.default_language.clone()),
            comments: present(&submission.comments).map(str::to_string),
            origin: present(&submission.origin).map(str::to_string),
            status: RequestStatus::Pending,
            created_at: now,
            sent_at: None,
            acknowledged_at: None,
        }
    }

    /// Validates, normalizes and stores a submission for `hotel_code`.
    /// Returns the new request id; on any error nothing is visible to readers.
    pub async fn submit(
        &self,
        hotel_code: &str,
        submission: &Submission,
    ) -> Result<String, IngestError> {
        if self.store.hotel_by_code(hotel_code).await?.is_none() {
            info!(hotel_code, "Rejected submission for unknown hotel");
            return Err(IngestError::UnknownHotel(hotel_code.to_string()));
        }

        let valid = validate(submission).map_err(|errors| {
            info!(hotel_code, errors = ?errors, "Submission failed validation");
            IngestError::Validation(errors)
        })?;

        for _ in 0..INSERT_ATTEMPTS {
            let now = Utc::now();
            let request_id = generate_request_id(hotel_code, now, &mut rand::thread_rng());
            let request =
                self.build_request(hotel_code, submission, valid.clone(), request_id, now);

            match self.store.insert_request(&request).await {
                Ok(()) => {
                    info!(
                        hotel_code,
                        request_id = %request.request_id,
                        adults = request.adult_count,
                        children = request.children_count,
                        "Guest request stored"
                    );
                    return Ok(request.request_id);
                }
                Err(StoreError::DuplicateRequest(id)) => {
                    warn!(request_id = %id, "Request id collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IngestError::Internal(
            "could not allocate a unique request id".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hotel;
    use crate::store::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use test_case::test_case;

    fn submission() -> Submission {
        Submission {
            email: Some("a@b.com".to_string()),
            period: Some("2025-06-01 - 2025-06-05".to_string()),
            adults: Some(2.into()),
            children: Some(1.into()),
            child_age1: Some(7.into()),
            ..Default::default()
        }
    }

    fn ingestion() -> (Arc<MemoryStore>, Ingestion) {
        let store = Arc::new(MemoryStore::with_hotels([Hotel::new("h1", "Hotel One")]));
        let ingestion = Ingestion::new(store.clone(), DEFAULT_LANGUAGE);
        (store, ingestion)
    }

    #[test]
    fn test_validate_collects_every_error() {
        let bad = Submission {
            email: Some("not-an-email".into()),
            phone: Some("12 34".into()),
            period: Some("not-a-date".into()),
            adults: Some(0.into()),
            gender: Some("Herr".into()),
            ..Default::default()
        };

        assert_eq!(
            validate(&bad).unwrap_err(),
            vec![
                "Invalid email format",
                "Invalid phone number format",
                "Invalid date range format",
                "At least 1 adult is required",
                "Invalid salutation value",
            ]
        );
    }

    #[test]
    fn test_validate_missing_required_fields() {
        assert_eq!(
            validate(&Submission::default()).unwrap_err(),
            vec![
                "Email is required",
                "Period is required",
                "At least 1 adult is required",
            ]
        );
    }

    #[test]
    fn test_validate_negative_counts_and_ages() {
        let mut s = submission();
        s.children = Some((-1).into());
        s.child_age2 = Some((-3).into());
        assert_eq!(
            validate(&s).unwrap_err(),
            vec!["Invalid children count", "Invalid child age"]
        );
    }

    #[test]
    fn test_validate_reports_wrongly_typed_numbers() {
        let body = r#"{"email":"bad","adults":"2","period":"x"}"#;
        let s: Submission = serde_json::from_str(body).unwrap();
        assert_eq!(
            validate(&s).unwrap_err(),
            vec![
                "Invalid email format",
                "Invalid date range format",
                "At least 1 adult is required",
            ]
        );

        let mut s = submission();
        s.children = Some("1".into());
        s.child_age1 = Some(7.5.into());
        assert_eq!(
            validate(&s).unwrap_err(),
            vec!["Invalid children count", "Invalid child age"]
        );

        let mut s = submission();
        s.adults = Some(2.0.into());
        assert_eq!(validate(&s).unwrap().adult_count, 2);
    }

    #[test]
    fn test_validate_keeps_sparse_child_slots_and_zero_age() {
        let mut s = submission();
        s.children = Some(3.into());
        s.child_age1 = Some(0.into());
        s.child_age3 = Some(11.into());

        let valid = validate(&s).unwrap();
        assert_eq!(valid.children_count, 3);
        assert_eq!(valid.child_ages, vec![0, 11]);
    }

    #[test_case("2025-06-01 - 2025-06-05", Some(("2025-06-01", "2025-06-05")))]
    #[test_case("2025-06-01-2025-06-05", Some(("2025-06-01", "2025-06-05")))]
    #[test_case("  2025-12-30 -   2026-01-02 ", Some(("2025-12-30", "2026-01-02")))]
    #[test_case("not-a-date", None)]
    #[test_case("2025-02-30 - 2025-03-02", None ; "impossible calendar date")]
    #[test_case("2025-6-1 - 2025-6-5", None ; "unpadded")]
    #[test_case("2025-06-01 / 2025-06-05", None ; "wrong separator")]
    #[test_case("2025-06-01 - 2025-06-05x", None ; "trailing garbage")]
    #[test_case("2025-06-01", None ; "single date")]
    #[test_case("ääääääääää", None ; "multibyte input")]
    fn test_split_period(period: &str, expected: Option<(&str, &str)>) {
        let expected = expected.map(|(a, b)| {
            (
                NaiveDate::parse_from_str(a, "%Y-%m-%d").unwrap(),
                NaiveDate::parse_from_str(b, "%Y-%m-%d").unwrap(),
            )
        });
        assert_eq!(split_period(period), expected);
    }

    #[test_case("0891234567", Some("de"), "+49891234567")]
    #[test_case("0891234567", None, "0891234567")]
    #[test_case("089 123-4567", Some("DE"), "+49891234567")]
    #[test_case("0612345678", Some("it"), "+39612345678")]
    #[test_case("0891234567", Some("xx"), "0891234567" ; "unknown language")]
    #[test_case("+43 664 1234567", Some("de"), "+43 664 1234567" ; "already international")]
    #[test_case("0043 664 1234567", Some("de"), "0043 664 1234567" ; "international prefix")]
    #[test_case("49891234567", Some("de"), "49891234567" ; "carries own calling code")]
    #[test_case("7911123456", Some("en"), "+447911123456" ; "no trunk prefix")]
    fn test_normalize_phone(phone: &str, language: Option<&str>, expected: &str) {
        assert_eq!(normalize_phone(phone, language), expected);
    }

    #[test_case("a@b.com", true)]
    #[test_case("first.last+tag@mail.example.org", true)]
    #[test_case("a@b", false)]
    #[test_case("a@.com", false)]
    #[test_case("a@b.", false)]
    #[test_case("@b.com", false)]
    #[test_case("a b@c.com", false)]
    #[test_case("a@b@c.com", false)]
    fn test_email_shape(email: &str, valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection(Some("DBL|Double Room")),
            Selection {
                raw: Some("DBL|Double Room".into()),
                code: Some("DBL".into()),
                name: Some("Double Room".into()),
            }
        );
        assert_eq!(
            parse_selection(Some(" Suite ")),
            Selection {
                raw: Some("Suite".into()),
                code: None,
                name: Some("Suite".into()),
            }
        );
        for placeholder in ["Keine Angabe", "not specified", "N/A", "na", "  "] {
            assert!(parse_selection(Some(placeholder)).is_empty());
        }
        assert_eq!(parse_selection(None), Selection::default());
    }

    #[test]
    fn test_request_id_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = DateTime::parse_from_rfc3339("2025-06-01T10:00:00.123Z")
            .unwrap()
            .with_timezone(&Utc);

        let id = generate_request_id("hotel-alpenrose", now, &mut rng);
        let parts: Vec<_> = id.split('_').collect();
        assert_eq!(parts[0], "GR");
        assert_eq!(parts[1], "8772000123");
        assert_eq!(parts[2], "hotel-al");
        assert_eq!(parts[3].len(), 5);
        assert!(parts[3].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test_case("" ; "empty")]
    #[test_case("h1" ; "short")]
    #[test_case("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789" ; "long ascii")]
    #[test_case("ÄÖÜäöüßÄÖÜäöüß" ; "two byte chars")]
    #[test_case("🏔🏔🏔🏔🏔🏔🏔🏔🏔" ; "four byte chars")]
    fn test_request_id_never_exceeds_limit(hotel_code: &str) {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let id = generate_request_id(hotel_code, Utc::now(), &mut rng);
            assert!(id.len() <= MAX_REQUEST_ID_LEN, "{id} is {} bytes", id.len());
            assert!(id.starts_with("GR_"));
        }
    }

    #[tokio::test]
    async fn test_submit_stores_pending_request() {
        let (store, ingestion) = ingestion();
        let mut s = submission();
        s.phone = Some("0891234567".into());
        s.language = Some("de".into());
        s.first_name = Some("  Anna ".into());
        s.selected_room = Some("DBL|Double".into());
        s.comments = Some("   ".into());

        let request_id = ingestion.submit("h1", &s).await.unwrap();
        let stored = store.request_by_id(&request_id).await.unwrap().unwrap();

        assert_eq!(stored.status, RequestStatus::Pending);
        assert_eq!(stored.hotel_code, "h1");
        assert_eq!(stored.child_ages, vec![7]);
        assert_eq!(stored.phone_number, "+49891234567");
        assert_eq!(stored.first_name, "Anna");
        assert_eq!(stored.room.code.as_deref(), Some("DBL"));
        assert_eq!(stored.comments, None);
        assert_eq!(stored.gender, Gender::Unspecified);
        assert_eq!(store.logs_for_request(&request_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_defaults_language_but_not_phone_prefix() {
        let (store, ingestion) = ingestion();
        let mut s = submission();
        s.phone = Some("0891234567".into());

        let request_id = ingestion.submit("h1", &s).await.unwrap();
        let stored = store.request_by_id(&request_id).await.unwrap().unwrap();

        assert_eq!(stored.language, "de");
        assert_eq!(stored.phone_number, "0891234567");
    }

    #[tokio::test]
    async fn test_submit_unknown_hotel_creates_nothing() {
        let (store, ingestion) = ingestion();
        let err = ingestion.submit("nope", &submission()).await.unwrap_err();

        assert!(matches!(err, IngestError::UnknownHotel(ref code) if code == "nope"));
        assert_eq!(err.code(), "INVALID_HOTEL");
        assert_eq!(err.status(), 404);
        assert_eq!(store.request_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_validation_message_joins_errors() {
        let (store, ingestion) = ingestion();
        let mut s = submission();
        s.email = None;
        s.period = Some("not-a-date".into());

        let err = ingestion.submit("h1", &s).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(
            err.public_message(),
            "Email is required, Invalid date range format"
        );
        assert_eq!(store.request_count(), 0);
    }
}
