//! Loader kinds understood by the bundler.
//!
//! Configuration maps file extensions to loaders by name. Names are parsed
//! into a closed set up front, so a typo fails validation instead of quietly
//! falling back to some default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the bundler interprets a file with a given extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
    Css,
    Json,
    Text,
    Base64,
    DataUrl,
    File,
    Binary,
    Default,
}

impl Loader {
    /// All loaders, in the order they are documented.
    pub const ALL: [Loader; 12] = [
        Loader::Js,
        Loader::Jsx,
        Loader::Ts,
        Loader::Tsx,
        Loader::Css,
        Loader::Json,
        Loader::Text,
        Loader::Base64,
        Loader::DataUrl,
        Loader::File,
        Loader::Binary,
        Loader::Default,
    ];

    /// Name used in configuration and on the bundler command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Loader::Js => "js",
            Loader::Jsx => "jsx",
            Loader::Ts => "ts",
            Loader::Tsx => "tsx",
            Loader::Css => "css",
            Loader::Json => "json",
            Loader::Text => "text",
            Loader::Base64 => "base64",
            Loader::DataUrl => "dataurl",
            Loader::File => "file",
            Loader::Binary => "binary",
            Loader::Default => "default",
        }
    }
}

impl FromStr for Loader {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Loader::ALL
            .into_iter()
            .find(|loader| loader.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownLoader(s.to_string()))
    }
}

impl TryFrom<String> for Loader {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Loader> for String {
    fn from(loader: Loader) -> Self {
        loader.as_str().to_string()
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_known_loader() {
        for loader in Loader::ALL {
            assert_eq!(loader.as_str().parse::<Loader>(), Ok(loader));
        }
    }

    #[test]
    fn test_unknown_loader_is_an_error() {
        assert_eq!(
            "svgr".parse::<Loader>(),
            Err(ConfigError::UnknownLoader("svgr".to_string()))
        );
        // Names are case sensitive
        assert!("JSX".parse::<Loader>().is_err());
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&Loader::DataUrl).unwrap();
        assert_eq!(json, "\"dataurl\"");

        let loader: Loader = serde_json::from_str("\"tsx\"").unwrap();
        assert_eq!(loader, Loader::Tsx);

        let err = serde_json::from_str::<Loader>("\"nope\"").unwrap_err();
        assert!(err.to_string().contains("Unknown loader"));
    }
}
