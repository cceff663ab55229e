//! The five Strava operations exposed to an MCP host.
//!
//! Each tool call resolves to a [`ToolRequest`] (arguments validated and
//! coerced), runs against a [`StravaClient`], and yields a
//! `Result<Value, ToolError>`. Turning an error into text for the host is
//! left to the server boundary.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::{
    Error,
    client::{ActivityQuery, StravaClient},
};

pub const GET_AUTHENTICATED_ATHLETE: &str = "get_authenticated_athlete";
pub const GET_ATHLETE_STATS: &str = "get_athlete_stats";
pub const GET_LOGGED_IN_ATHLETE_ZONES: &str = "get_logged_in_athlete_zones";
pub const LIST_ATHLETE_ACTIVITIES: &str = "list_athlete_activities";
pub const GET_ACTIVITY: &str = "get_activity";

/// Raw arguments as received from the host.
pub type ToolArgs = HashMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A failed Strava call, prefixed with what the tool was doing.
    #[error("{context}: {source}")]
    Strava {
        context: &'static str,
        #[source]
        source: Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Boolean,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }
}

/// One input parameter of a tool.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    /// JSON schema fragment for this parameter.
    pub fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let (Some(default), Some(map)) = (&self.default, schema.as_object_mut()) {
            map.insert("default".to_string(), default.clone());
        }
        schema
    }
}

/// Name, description and parameters of a tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn required(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.to_string())
            .collect()
    }
}

/// Every tool this server offers, in listing order.
pub fn catalogue() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_AUTHENTICATED_ATHLETE,
            description: "Returns the currently authenticated athlete's profile information.\n\
                          Use this to get details about the user's Strava account.",
            params: vec![],
        },
        ToolSpec {
            name: GET_ATHLETE_STATS,
            description: "Returns the activity stats of an athlete.\n\
                          Requires the athlete's ID, which can be obtained from get_authenticated_athlete().\n\
                          Only includes data from activities set to Everyone visibility.",
            params: vec![ParamSpec {
                name: "athlete_id",
                kind: ParamType::Integer,
                description: "The athlete's numeric ID",
                required: true,
                default: None,
            }],
        },
        ToolSpec {
            name: GET_LOGGED_IN_ATHLETE_ZONES,
            description: "Returns the authenticated athlete's heart rate and power zones.",
            params: vec![],
        },
        ToolSpec {
            name: LIST_ATHLETE_ACTIVITIES,
            description: "Returns the activities of the authenticated athlete.\n\
                          'before' and 'after' are epoch timestamps to filter activities.\n\
                          'page' (default 1) controls pagination.",
            params: vec![
                ParamSpec {
                    name: "before",
                    kind: ParamType::Integer,
                    description: "Only activities that took place before this epoch timestamp",
                    required: false,
                    default: None,
                },
                ParamSpec {
                    name: "after",
                    kind: ParamType::Integer,
                    description: "Only activities that took place after this epoch timestamp",
                    required: false,
                    default: None,
                },
                ParamSpec {
                    name: "page",
                    kind: ParamType::Integer,
                    description: "Page number, starting at 1",
                    required: false,
                    default: Some(json!(1)),
                },
            ],
        },
        ToolSpec {
            name: GET_ACTIVITY,
            description: "Returns a detailed representation of an activity owned by the authenticated athlete.\n\
                          Requires the 'activity_id'. Set 'include_all_efforts' to false to omit segment efforts.",
            params: vec![
                ParamSpec {
                    name: "activity_id",
                    kind: ParamType::Integer,
                    description: "The activity's numeric ID",
                    required: true,
                    default: None,
                },
                ParamSpec {
                    name: "include_all_efforts",
                    kind: ParamType::Boolean,
                    description: "Include all segment efforts",
                    required: false,
                    default: Some(json!(true)),
                },
            ],
        },
    ]
}

pub fn find(name: &str) -> Option<ToolSpec> {
    catalogue().into_iter().find(|tool| tool.name == name)
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    AuthenticatedAthlete,
    AthleteStats { athlete_id: u64 },
    AthleteZones,
    ListActivities(ActivityQuery),
    Activity {
        activity_id: u64,
        include_all_efforts: bool,
    },
}

impl ToolRequest {
    pub fn parse(name: &str, args: &ToolArgs) -> Result<Self, ToolError> {
        match name {
            GET_AUTHENTICATED_ATHLETE => Ok(ToolRequest::AuthenticatedAthlete),
            GET_ATHLETE_STATS => Ok(ToolRequest::AthleteStats {
                athlete_id: required_id(args, "athlete_id")?,
            }),
            GET_LOGGED_IN_ATHLETE_ZONES => Ok(ToolRequest::AthleteZones),
            LIST_ATHLETE_ACTIVITIES => {
                let page = match integer_arg(args, "page")? {
                    Some(page) if page < 1 => {
                        return Err(ToolError::InvalidArgument {
                            name: "page",
                            reason: "must be 1 or greater".to_string(),
                        });
                    }
                    Some(page) => u32::try_from(page).map_err(|_| ToolError::InvalidArgument {
                        name: "page",
                        reason: "is too large".to_string(),
                    })?,
                    None => 1,
                };
                Ok(ToolRequest::ListActivities(ActivityQuery {
                    before: integer_arg(args, "before")?,
                    after: integer_arg(args, "after")?,
                    page,
                    ..Default::default()
                }))
            }
            GET_ACTIVITY => Ok(ToolRequest::Activity {
                activity_id: required_id(args, "activity_id")?,
                include_all_efforts: bool_arg(args, "include_all_efforts")?.unwrap_or(true),
            }),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Prefix for error text, so the host can tell which call failed.
    pub fn error_context(&self) -> &'static str {
        match self {
            ToolRequest::AuthenticatedAthlete => "Error retrieving athlete profile",
            ToolRequest::AthleteStats { .. } => "Error retrieving athlete stats",
            ToolRequest::AthleteZones => "Error retrieving athlete zones",
            ToolRequest::ListActivities(_) => "Error retrieving activities",
            ToolRequest::Activity { .. } => "Error retrieving activity",
        }
    }

    pub async fn execute(self, client: &mut StravaClient) -> Result<Value, ToolError> {
        let context = self.error_context();
        let result = match self {
            ToolRequest::AuthenticatedAthlete => client.athlete_profile().await,
            ToolRequest::AthleteStats { athlete_id } => client.athlete_stats(athlete_id).await,
            ToolRequest::AthleteZones => client.athlete_zones().await,
            ToolRequest::ListActivities(query) => client.list_activities(query).await,
            ToolRequest::Activity {
                activity_id,
                include_all_efforts,
            } => client.activity(activity_id, include_all_efforts).await,
        };
        result.map_err(|source| ToolError::Strava { context, source })
    }
}

/// Parse and run a tool call in one go.
pub async fn invoke(
    client: &mut StravaClient,
    name: &str,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    ToolRequest::parse(name, args)?.execute(client).await
}

fn present<'a>(args: &'a ToolArgs, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

fn integer_arg(args: &ToolArgs, name: &'static str) -> Result<Option<i64>, ToolError> {
    let Some(value) = present(args, name) else {
        return Ok(None);
    };
    let invalid = |reason: &str| ToolError::InvalidArgument {
        name,
        reason: reason.to_string(),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                    _ => Err(invalid("must be an integer")),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid("must be an integer")),
        _ => Err(invalid("must be an integer")),
    }
}

fn required_id(args: &ToolArgs, name: &'static str) -> Result<u64, ToolError> {
    let id = integer_arg(args, name)?.ok_or(ToolError::MissingArgument(name))?;
    u64::try_from(id).map_err(|_| ToolError::InvalidArgument {
        name,
        reason: "must not be negative".to_string(),
    })
}

fn bool_arg(args: &ToolArgs, name: &'static str) -> Result<Option<bool>, ToolError> {
    match present(args, name) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(ToolError::InvalidArgument {
                name,
                reason: "must be a boolean".to_string(),
            }),
        },
        Some(_) => Err(ToolError::InvalidArgument {
            name,
            reason: "must be a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> ToolArgs {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_catalogue_names() {
        let names: Vec<_> = catalogue().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "get_authenticated_athlete",
                "get_athlete_stats",
                "get_logged_in_athlete_zones",
                "list_athlete_activities",
                "get_activity",
            ]
        );
        assert_eq!(find("get_activity").unwrap().required(), vec!["activity_id"]);
        assert!(find("list_athlete_activities").unwrap().required().is_empty());
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_param_schema_includes_default() {
        let tool = find("get_activity").unwrap();
        let schema = tool.params[1].schema();
        assert_eq!(schema["type"], "boolean");
        assert_eq!(schema["default"], true);
        assert!(tool.params[0].schema().get("default").is_none());
    }

    #[test]
    fn test_parse_list_activities_defaults() {
        let request = ToolRequest::parse("list_athlete_activities", &ToolArgs::new()).unwrap();
        assert_eq!(request, ToolRequest::ListActivities(ActivityQuery::default()));
    }

    #[test]
    fn test_parse_coerces_integers() {
        let request = ToolRequest::parse(
            "list_athlete_activities",
            &args(json!({"after": "1000000", "before": 2000000.0, "page": 2})),
        )
        .unwrap();
        assert_eq!(
            request,
            ToolRequest::ListActivities(ActivityQuery {
                before: Some(2_000_000),
                after: Some(1_000_000),
                page: 2,
                per_page: 30,
            })
        );
    }

    #[test]
    fn test_null_means_absent() {
        let request = ToolRequest::parse(
            "list_athlete_activities",
            &args(json!({"after": null, "page": null})),
        )
        .unwrap();
        assert_eq!(request, ToolRequest::ListActivities(ActivityQuery::default()));
    }

    #[test]
    fn test_parse_activity() {
        let request = ToolRequest::parse("get_activity", &args(json!({"activity_id": 42}))).unwrap();
        assert_eq!(
            request,
            ToolRequest::Activity {
                activity_id: 42,
                include_all_efforts: true
            }
        );

        let request = ToolRequest::parse(
            "get_activity",
            &args(json!({"activity_id": "42", "include_all_efforts": "false"})),
        )
        .unwrap();
        assert_eq!(
            request,
            ToolRequest::Activity {
                activity_id: 42,
                include_all_efforts: false
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = ToolRequest::parse("get_athlete_stats", &ToolArgs::new()).unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument("athlete_id")));
        assert_eq!(err.to_string(), "Missing required argument 'athlete_id'");

        let err = ToolRequest::parse("get_athlete_stats", &args(json!({"athlete_id": "abc"})))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { name: "athlete_id", .. }));

        let err = ToolRequest::parse("get_athlete_stats", &args(json!({"athlete_id": -5})))
            .unwrap_err();
        assert!(err.to_string().contains("must not be negative"));

        let err =
            ToolRequest::parse("get_activity", &args(json!({"activity_id": 1.5}))).unwrap_err();
        assert!(err.to_string().contains("must be an integer"));

        let err = ToolRequest::parse(
            "get_activity",
            &args(json!({"activity_id": 1, "include_all_efforts": 3})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be a boolean"));

        let err = ToolRequest::parse("list_athlete_activities", &args(json!({"page": 0})))
            .unwrap_err();
        assert!(err.to_string().contains("must be 1 or greater"));

        let err = ToolRequest::parse("delete_everything", &ToolArgs::new()).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn test_strava_error_text() {
        let err = ToolError::Strava {
            context: ToolRequest::AthleteZones.error_context(),
            source: Error::HttpStatus {
                status: 403,
                body: "Forbidden".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Error retrieving athlete zones: HTTP status 403: Forbidden"
        );
    }
}
