use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub const DEFAULT_SIZE: Dimensions = Dimensions {
    width: 512,
    height: 512,
};

/// Opaque blue, the colour pending textures sample as.
pub const DEFAULT_PLACEHOLDER: [u8; 4] = [0, 0, 255, 255];

/// A `width x height` pair in pixels.
///
/// Parses from `"W, H"` (the sandbox's text-field format) or `"WxH"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        DEFAULT_SIZE
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimensions {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (w, h) = trimmed
            .split_once(',')
            .or_else(|| trimmed.split_once(['x', 'X']))
            .ok_or_else(|| format!("invalid dimensions '{trimmed}'; expected 'W, H' or 'WxH'"))?;
        let parse = |part: &str, axis: &str| -> Result<u32, String> {
            let value: u32 = part
                .trim()
                .parse()
                .map_err(|err| format!("invalid {axis} '{}': {err}", part.trim()))?;
            if value == 0 {
                return Err(format!("{axis} must be greater than zero"));
            }
            Ok(value)
        };
        Ok(Self {
            width: parse(w, "width")?,
            height: parse(h, "height")?,
        })
    }
}

impl<'de> Deserialize<'de> for Dimensions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Str(String),
            Pair([u32; 2]),
            Table { width: u32, height: u32 },
        }

        match Helper::deserialize(deserializer)? {
            Helper::Str(raw) => raw.parse().map_err(de::Error::custom),
            Helper::Pair([width, height]) | Helper::Table { width, height } => {
                Ok(Self { width, height })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub output: Dimensions,
    #[serde(default)]
    pub view: Dimensions,
    #[serde(default)]
    pub fragment_shader: Option<PathBuf>,
    #[serde(default)]
    pub vertex_shader: Option<PathBuf>,
    #[serde(
        default = "default_settle_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub settle_timeout: Duration,
    #[serde(
        default = "default_placeholder",
        deserialize_with = "deserialize_rgba"
    )]
    pub placeholder_color: [u8; 4],
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            output: DEFAULT_SIZE,
            view: DEFAULT_SIZE,
            fragment_shader: None,
            vertex_shader: None,
            settle_timeout: default_settle_timeout(),
            placeholder_color: DEFAULT_PLACEHOLDER,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_settle_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_placeholder() -> [u8; 4] {
    DEFAULT_PLACEHOLDER
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_rgba<'de, D>(deserializer: D) -> Result<[u8; 4], D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Hex(String),
        Channels(Vec<u8>),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Hex(raw) => parse_hex_color(&raw).map_err(de::Error::custom),
        Helper::Channels(channels) => match channels.as_slice() {
            [r, g, b] => Ok([*r, *g, *b, 255]),
            [r, g, b, a] => Ok([*r, *g, *b, *a]),
            _ => Err(de::Error::custom(format!(
                "colour needs 3 or 4 channels, got {}",
                channels.len()
            ))),
        },
    }
}

/// Parses `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(raw: &str) -> Result<[u8; 4], String> {
    let digits = raw.trim().trim_start_matches('#');
    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return Err(format!("invalid colour '{raw}'; expected #rrggbb or #rrggbbaa"));
    }
    let mut rgba = [255u8; 4];
    for (index, slot) in rgba.iter_mut().take(digits.len() / 2).enumerate() {
        let pair = &digits[index * 2..index * 2 + 2];
        *slot = u8::from_str_radix(pair, 16)
            .map_err(|err| format!("invalid colour '{raw}': {err}"))?;
    }
    Ok(rgba)
}

impl SandboxSettings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SandboxSettings = toml::from_str(input)?;
        let issues = raw.validate();
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues.join("; ")));
        }
        Ok(raw)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.version != 1 {
            issues.push(format!(
                "unsupported config version {}; expected 1",
                self.version
            ));
        }
        for (field, dims) in [("output", self.output), ("view", self.view)] {
            if dims.width == 0 || dims.height == 0 {
                issues.push(format!("{field} size {dims} must be positive"));
            }
        }
        if self.settle_timeout.is_zero() {
            issues.push("settle_timeout must be greater than zero".to_string());
        }
        for (field, path) in [
            ("fragment_shader", &self.fragment_shader),
            ("vertex_shader", &self.vertex_shader),
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                issues.push(format!("{field} may not be an empty path"));
            }
        }
        issues
    }
}
