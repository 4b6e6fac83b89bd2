// AlpineBits handshake capability documents and their client-ordered intersection

use serde::{Deserialize, Serialize};

pub const SERVER_VERSION: &str = "2024-10";
pub const ACTION_READ: &str = "action_OTA_Read";
pub const ACTION_NOTIF_REPORT: &str = "action_OTA_NotifReport";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub versions: Vec<VersionCapability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionCapability {
    pub version: String,
    pub actions: Vec<ActionCapability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionCapability {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports: Option<Vec<String>>,
}

impl ActionCapability {
    pub fn bare(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            supports: None,
        }
    }
}

/// What this service implements. The handshake action itself is implicit
/// and never advertised.
pub fn server_capabilities() -> Capabilities {
    Capabilities {
        versions: vec![VersionCapability {
            version: SERVER_VERSION.to_string(),
            actions: vec![
                ActionCapability::bare(ACTION_READ),
                ActionCapability::bare(ACTION_NOTIF_REPORT),
            ],
        }],
    }
}

/// Intersects a client capability document with the server's.
///
/// A client version survives only if the server lists it verbatim, an action
/// only if the server lists it under that version. When both sides declare
/// `supports` the lists are intersected and the action is dropped if nothing
/// is left; otherwise the bare action is emitted. Versions left without
/// actions are dropped. Repeated entries in the client document are kept at
/// their first occurrence only.
pub fn intersect(client: &Capabilities, server: &Capabilities) -> Capabilities {
    let mut versions: Vec<VersionCapability> = Vec::new();

    for client_version in &client.versions {
        if versions.iter().any(|v| v.version == client_version.version) {
            continue;
        }
        let Some(server_version) = server
            .versions
            .iter()
            .find(|v| v.version == client_version.version)
        else {
            continue;
        };

        let mut actions: Vec<ActionCapability> = Vec::new();
        for client_action in &client_version.actions {
            if actions.iter().any(|a| a.action == client_action.action) {
                continue;
            }
            let Some(server_action) = server_version
                .actions
                .iter()
                .find(|a| a.action == client_action.action)
            else {
                continue;
            };

            match (&client_action.supports, &server_action.supports) {
                (Some(client_supports), Some(server_supports)) => {
                    let mut common: Vec<String> = Vec::new();
                    for feature in client_supports {
                        if server_supports.contains(feature) && !common.contains(feature) {
                            common.push(feature.clone());
                        }
                    }
                    if !common.is_empty() {
                        actions.push(ActionCapability {
                            action: client_action.action.clone(),
                            supports: Some(common),
                        });
                    }
                }
                _ => actions.push(ActionCapability::bare(client_action.action.clone())),
            }
        }

        if !actions.is_empty() {
            versions.push(VersionCapability {
                version: client_version.version.clone(),
                actions,
            });
        }
    }

    Capabilities { versions }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(name: &str, supports: Option<&[&str]>) -> ActionCapability {
        ActionCapability {
            action: name.to_string(),
            supports: supports.map(|s| s.iter().map(|f| f.to_string()).collect()),
        }
    }

    fn version(name: &str, actions: Vec<ActionCapability>) -> VersionCapability {
        VersionCapability {
            version: name.to_string(),
            actions,
        }
    }

    #[test]
    fn test_server_document_never_lists_ping() {
        let server = server_capabilities();
        let actions: Vec<_> = server.versions[0]
            .actions
            .iter()
            .map(|a| a.action.as_str())
            .collect();
        assert_eq!(actions, vec![ACTION_READ, ACTION_NOTIF_REPORT]);
        assert!(!actions.iter().any(|a| a.contains("Ping")));
    }

    #[test]
    fn test_intersection_keeps_only_server_known_entries() {
        let client = Capabilities {
            versions: vec![
                version("2022-10", vec![action(ACTION_READ, None)]),
                version(
                    SERVER_VERSION,
                    vec![
                        action("action_OTA_Ping", None),
                        action(ACTION_NOTIF_REPORT, None),
                        action("action_OTA_HotelInvCountNotif", Some(&["OTA_HotelInvCountNotif_accept_rooms"])),
                        action(ACTION_READ, None),
                    ],
                ),
            ],
        };

        let result = intersect(&client, &server_capabilities());

        assert_eq!(
            result,
            Capabilities {
                versions: vec![version(
                    SERVER_VERSION,
                    vec![action(ACTION_NOTIF_REPORT, None), action(ACTION_READ, None)],
                )],
            }
        );
    }

    #[test]
    fn test_supports_lists_are_intersected_in_client_order() {
        let server = Capabilities {
            versions: vec![version(
                "2024-10",
                vec![action("action_X", Some(&["a", "b", "c"]))],
            )],
        };
        let client = Capabilities {
            versions: vec![version(
                "2024-10",
                vec![action("action_X", Some(&["c", "z", "a", "c"]))],
            )],
        };

        let result = intersect(&client, &server);
        assert_eq!(result.versions[0].actions, vec![action("action_X", Some(&["c", "a"]))]);
    }

    #[test]
    fn test_disjoint_supports_drop_action_and_empty_version() {
        let server = Capabilities {
            versions: vec![version("2024-10", vec![action("action_X", Some(&["a"]))])],
        };
        let client = Capabilities {
            versions: vec![version("2024-10", vec![action("action_X", Some(&["b"]))])],
        };

        assert!(intersect(&client, &server).versions.is_empty());
    }

    #[test]
    fn test_one_sided_supports_emits_bare_action() {
        let server = Capabilities {
            versions: vec![version("2024-10", vec![action("action_X", Some(&["a"]))])],
        };
        let client = Capabilities {
            versions: vec![version("2024-10", vec![action("action_X", None)])],
        };

        let result = intersect(&client, &server);
        assert_eq!(result.versions[0].actions, vec![action("action_X", None)]);
    }

    #[test]
    fn test_result_is_subset_of_server() {
        let server = server_capabilities();
        let client: Capabilities = serde_json::from_str(
            r#"{"versions":[{"version":"2024-10","actions":[{"action":"action_OTA_Read"},{"action":"action_OTA_Read"},{"action":"unknown"}]},{"version":"2024-10","actions":[]}]}"#,
        )
        .unwrap();

        let result = intersect(&client, &server);
        for v in &result.versions {
            let sv = server.versions.iter().find(|s| s.version == v.version).unwrap();
            for a in &v.actions {
                assert!(sv.actions.iter().any(|s| s.action == a.action));
            }
        }
        assert_eq!(result.versions.len(), 1);
        assert_eq!(result.versions[0].actions, vec![action(ACTION_READ, None)]);
    }

    #[test]
    fn test_bare_actions_serialize_without_supports_key() {
        let json = serde_json::to_string(&server_capabilities()).unwrap();
        assert!(!json.contains("supports"));
        assert!(json.starts_with(r#"{"versions":[{"version":"2024-10""#));
    }
}
