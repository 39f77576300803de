use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    /// Exact match only, the same values that get stored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}' (expected light or dark)")),
        }
    }
}

/// System preference: an explicit config flag, else the terminal background
/// advertised in `COLORFGBG` ("fg;bg" or "fg;default;bg").
pub fn system_preference(prefers_dark: Option<bool>, colorfgbg: Option<&str>) -> Option<Theme> {
    if let Some(dark) = prefers_dark {
        return Some(if dark { Theme::Dark } else { Theme::Light });
    }
    let bg: u8 = colorfgbg?.rsplit(';').next()?.trim().parse().ok()?;
    Some(if bg <= 6 || bg == 8 { Theme::Dark } else { Theme::Light })
}

/// Stored choice first, then the system, then light.
pub fn resolve_theme(stored: Option<&str>, system: Option<Theme>) -> Theme {
    stored
        .and_then(|s| s.parse().ok())
        .or(system)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_value_wins_only_when_valid() {
        assert_eq!(resolve_theme(Some("dark"), Some(Theme::Light)), Theme::Dark);
        assert_eq!(resolve_theme(Some("Dark"), Some(Theme::Light)), Theme::Light);
        assert_eq!(resolve_theme(Some("sepia"), None), Theme::Light);
        assert_eq!(resolve_theme(None, Some(Theme::Dark)), Theme::Dark);
        assert_eq!(resolve_theme(None, None), Theme::Light);
    }

    #[test]
    fn terminal_background_detection() {
        assert_eq!(system_preference(None, Some("15;0")), Some(Theme::Dark));
        assert_eq!(system_preference(None, Some("0;default;15")), Some(Theme::Light));
        assert_eq!(system_preference(None, Some("7;8")), Some(Theme::Dark));
        assert_eq!(system_preference(None, Some("garbage")), None);
        assert_eq!(system_preference(None, None), None);
        assert_eq!(system_preference(Some(false), Some("15;0")), Some(Theme::Light));
    }

    #[test]
    fn toggle_flips() {
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(Theme::Dark.toggled().to_string(), "light");
    }
}
