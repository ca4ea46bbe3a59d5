pub mod json_path;
pub mod primitive;
pub mod version;

use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Where a request parameter is carried.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    #[default]
    Query,
    Header,
    Cookie,
    Path,
    /// The whole raw query string, decoded through a single media type.
    QueryString,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Header => "header",
            ParameterLocation::Query => "query",
            ParameterLocation::Cookie => "cookie",
            ParameterLocation::Path => "path",
            ParameterLocation::QueryString => "querystring",
        }
    }
}

impl Display for ParameterLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" => Ok(ParameterLocation::Header),
            "query" => Ok(ParameterLocation::Query),
            "cookie" => Ok(ParameterLocation::Cookie),
            "path" => Ok(ParameterLocation::Path),
            "querystring" => Ok(ParameterLocation::QueryString),
            other => Err(format!("unknown parameter location '{}'", other)),
        }
    }
}
