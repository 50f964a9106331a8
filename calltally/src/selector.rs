/// Ways to locate a control in the host application's accessibility tree.
///
/// The host UI is addressed by fixed identifiers and labels that break on
/// application updates, so every addressing strategy is funnelled through this
/// one type. Swapping a broken `Id` for a `TitlePattern` is a config change,
/// not a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Native automation id (e.g. `AutomationId` on Windows).
    Id(String),
    /// Exact name/title match.
    Title(String),
    /// Regex over the name/title.
    TitlePattern(String),
    /// Control role with an optional name.
    Role { role: String, name: Option<String> },
    /// Resolve each step within the previous step's result.
    Chain(Vec<Selector>),
    /// Unparseable selector string, with the reason.
    Invalid(String),
}

impl Selector {
    pub fn role(role: impl Into<String>) -> Self {
        Selector::Role {
            role: role.into(),
            name: None,
        }
    }

    pub fn role_named(role: impl Into<String>, name: impl Into<String>) -> Self {
        Selector::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        // Chained selectors resolve left to right
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        // role|name is the preferred precise format, e.g. "button|Run Query"
        if let Some((role_part, name_part)) = s.split_once('|') {
            let role = role_part.trim();
            let role = role.strip_prefix("role:").unwrap_or(role);
            let name = name_part.trim();
            let name = name.strip_prefix("name:").unwrap_or(name);
            return Selector::Role {
                role: role.to_string(),
                name: Some(name.to_string()),
            };
        }

        match s {
            _ if s.starts_with("id:") => Selector::Id(s[3..].trim().to_string()),
            _ if s.starts_with('#') => Selector::Id(s[1..].to_string()),
            _ if s.starts_with("title:") => Selector::Title(s[6..].to_string()),
            _ if s.starts_with("pattern:") => Selector::TitlePattern(s[8..].to_string()),
            _ if s.starts_with("role:") => Selector::role(&s[5..]),
            "window" | "pane" | "button" | "checkbox" | "menuitem" | "menubar" | "table"
            | "edit" | "document" | "group" | "custom" | "text" => Selector::role(s),
            _ => Selector::Invalid(format!(
                "Unknown selector format: {s:?}. Use 'id:', 'title:', 'pattern:', 'role:' \
                 or the 'role|name' form."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}
