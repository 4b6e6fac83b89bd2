use chrono::SecondsFormat;
use serde::Serialize;

use crate::model::{GuestRequest, Hotel, Selection};

pub const OTA_NAMESPACE: &str = "http://www.opentravel.org/OTA/2003/05";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const OTA_VERSION: &str = "7.000";

const UNIQUE_ID_TYPE_RESERVATION: &str = "14";
const PHONE_TECH_TYPE_VOICE: &str = "1";
const UNKNOWN_GENDER: &str = "Unknown";

// Structures for XML serialization of the Read response
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename = "OTA_ResRetrieveRS", rename_all = "PascalCase")]
pub struct XmlResRetrieveResponse {
    #[serde(rename = "@xmlns:xsi")]
    pub xmlns_xsi: &'static str,
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@xsi:schemaLocation")]
    pub schema_location: String,
    #[serde(rename = "@Version")]
    pub version: &'static str,
    pub success: (),
    pub reservations_list: XmlReservationsList,
}

impl XmlResRetrieveResponse {
    pub fn new(reservations: Vec<XmlHotelReservation>) -> Self {
        Self {
            xmlns_xsi: XSI_NAMESPACE,
            xmlns: OTA_NAMESPACE,
            schema_location: format!("{OTA_NAMESPACE} OTA_ResRetrieveRS.xsd"),
            version: OTA_VERSION,
            success: (),
            reservations_list: XmlReservationsList {
                reservations,
            },
        }
    }
}

#[derive(Debug, PartialEq, Default, Serialize)]
pub struct XmlReservationsList {
    #[serde(rename = "HotelReservation")]
    pub reservations: Vec<XmlHotelReservation>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlHotelReservation {
    #[serde(rename = "@CreateDateTime")]
    pub create_date_time: String,
    #[serde(rename = "@ResStatus")]
    pub res_status: &'static str,
    #[serde(rename = "UniqueID")]
    pub unique_id: XmlUniqueId,
    pub room_stays: XmlRoomStays,
    pub res_guests: XmlResGuests,
    pub res_global_info: XmlResGlobalInfo,
}

impl XmlHotelReservation {
    pub fn from_request(request: &GuestRequest, hotel: &Hotel) -> Self {
        let customer = XmlCustomer {
            language: Some(request.language.clone()).filter(|l| !l.is_empty()),
            gender: match request.gender.as_str() {
                "" => UNKNOWN_GENDER.to_string(),
                other => other.to_string(),
            },
            person_name: XmlPersonName {
                given_name: non_empty(&request.first_name),
                surname: non_empty(&request.last_name),
            },
            telephone: non_empty(&request.phone_number).map(|number| XmlTelephone {
                phone_tech_type: PHONE_TECH_TYPE_VOICE,
                phone_number: number,
            }),
            email: non_empty(&request.email),
        };

        let mut comments = Vec::new();
        if let Some(text) = selection_text("Room Selection", &request.room) {
            comments.push(XmlComment::new("additional info", text));
        }
        if let Some(text) = selection_text("Offer Selection", &request.offer) {
            comments.push(XmlComment::new("additional info", text));
        }
        if let Some(message) = request.comments.as_deref().and_then(non_empty) {
            comments.push(XmlComment::new("customer message", message));
        }

        XmlHotelReservation {
            create_date_time: request
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            res_status: "Requested",
            unique_id: XmlUniqueId {
                id_type: UNIQUE_ID_TYPE_RESERVATION,
                id: request.request_id.clone(),
            },
            room_stays: XmlRoomStays {
                room_stay: XmlRoomStay {
                    room_types: XmlRoomTypes {
                        room_type: XmlRoomType {
                            room_type_code: request.room.code.clone(),
                        },
                    },
                    guest_counts: XmlGuestCounts::for_request(request),
                    time_span: XmlTimeSpan {
                        start: request.check_in_date.format("%Y-%m-%d").to_string(),
                        end: request.check_out_date.format("%Y-%m-%d").to_string(),
                    },
                },
            },
            res_guests: XmlResGuests {
                res_guest: XmlResGuest {
                    profiles: XmlProfiles {
                        profile_info: XmlProfileInfo {
                            profile: XmlProfile { customer },
                        },
                    },
                },
            },
            res_global_info: XmlResGlobalInfo {
                comments: (!comments.is_empty()).then_some(XmlComments { comments }),
                basic_property_info: XmlBasicPropertyInfo {
                    hotel_code: hotel.hotel_code.clone(),
                    hotel_name: hotel.hotel_name.clone(),
                },
            },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn selection_text(label: &str, selection: &Selection) -> Option<String> {
    let name = selection.name.as_deref()?;
    Some(match selection.code.as_deref() {
        Some(code) => format!("{label}: {name} ({code})"),
        None => format!("{label}: {name}"),
    })
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlUniqueId {
    #[serde(rename = "@Type")]
    pub id_type: &'static str,
    #[serde(rename = "@ID")]
    pub id: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlRoomStays {
    pub room_stay: XmlRoomStay,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlRoomStay {
    pub room_types: XmlRoomTypes,
    pub guest_counts: XmlGuestCounts,
    pub time_span: XmlTimeSpan,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlRoomTypes {
    pub room_type: XmlRoomType,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlRoomType {
    #[serde(rename = "@RoomTypeCode", skip_serializing_if = "Option::is_none")]
    pub room_type_code: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlGuestCounts {
    #[serde(rename = "GuestCount")]
    pub guest_counts: Vec<XmlGuestCount>,
}

impl XmlGuestCounts {
    /// One combined count without children, otherwise the adults plus one
    /// entry per recorded child age.
    pub fn for_request(request: &GuestRequest) -> Self {
        let guest_counts = if request.children_count == 0 {
            vec![XmlGuestCount {
                count: request.adult_count,
                age: None,
            }]
        } else {
            std::iter::once(XmlGuestCount {
                count: request.adult_count,
                age: None,
            })
            .chain(request.child_ages.iter().map(|&age| XmlGuestCount {
                count: 1,
                age: Some(age),
            }))
            .collect()
        };
        Self { guest_counts }
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlGuestCount {
    #[serde(rename = "@Count")]
    pub count: u32,
    #[serde(rename = "@Age", skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlTimeSpan {
    #[serde(rename = "@Start")]
    pub start: String,
    #[serde(rename = "@End")]
    pub end: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlResGuests {
    pub res_guest: XmlResGuest,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlResGuest {
    pub profiles: XmlProfiles,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlProfiles {
    pub profile_info: XmlProfileInfo,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlProfileInfo {
    pub profile: XmlProfile,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlProfile {
    pub customer: XmlCustomer,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlCustomer {
    #[serde(rename = "@Language", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "@Gender")]
    pub gender: String,
    pub person_name: XmlPersonName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<XmlTelephone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlPersonName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlTelephone {
    #[serde(rename = "@PhoneTechType")]
    pub phone_tech_type: &'static str,
    #[serde(rename = "@PhoneNumber")]
    pub phone_number: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlResGlobalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<XmlComments>,
    pub basic_property_info: XmlBasicPropertyInfo,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlComments {
    #[serde(rename = "Comment")]
    pub comments: Vec<XmlComment>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlComment {
    #[serde(rename = "@Name")]
    pub name: &'static str,
    pub text: String,
}

impl XmlComment {
    fn new(name: &'static str, text: String) -> Self {
        Self { name, text }
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlBasicPropertyInfo {
    #[serde(rename = "@HotelCode")]
    pub hotel_code: String,
    #[serde(rename = "@HotelName")]
    pub hotel_name: String,
}

// Acknowledge response
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename = "OTA_NotifReportRS", rename_all = "PascalCase")]
pub struct XmlNotifReportResponse {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@xmlns:xsi")]
    pub xmlns_xsi: &'static str,
    #[serde(rename = "@xsi:schemaLocation")]
    pub schema_location: String,
    #[serde(rename = "@TimeStamp")]
    pub time_stamp: String,
    #[serde(rename = "@Version")]
    pub version: &'static str,
    pub success: (),
}

impl XmlNotifReportResponse {
    pub fn new(time_stamp: String) -> Self {
        Self {
            xmlns: OTA_NAMESPACE,
            xmlns_xsi: XSI_NAMESPACE,
            schema_location: format!("{OTA_NAMESPACE} OTA_NotifReportRS.xsd"),
            time_stamp,
            version: OTA_VERSION,
            success: (),
        }
    }
}

// Protocol-level error envelope; the root element name follows the action
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlErrorResponse {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@TimeStamp")]
    pub time_stamp: String,
    #[serde(rename = "@Version")]
    pub version: &'static str,
    pub errors: XmlErrors,
}

impl XmlErrorResponse {
    pub fn new(message: impl Into<String>, time_stamp: String) -> Self {
        Self {
            xmlns: OTA_NAMESPACE,
            time_stamp,
            version: OTA_VERSION,
            errors: XmlErrors {
                error: XmlError {
                    error_type: "3",
                    code: "450",
                    message: message.into(),
                },
            },
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XmlErrors {
    pub error: XmlError,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct XmlError {
    #[serde(rename = "@Type")]
    pub error_type: &'static str,
    #[serde(rename = "@Code")]
    pub code: &'static str,
    #[serde(rename = "$text")]
    pub message: String,
}
