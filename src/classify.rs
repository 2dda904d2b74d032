use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorTag {
    Blue,
    Purple,
    Red,
    Pink,
    Green,
    Orange,
    Neutral,
}

impl ColorTag {
    pub fn css_class(self) -> &'static str {
        match self {
            ColorTag::Blue => "tag-blue",
            ColorTag::Purple => "tag-purple",
            ColorTag::Red => "tag-red",
            ColorTag::Pink => "tag-pink",
            ColorTag::Green => "tag-green",
            ColorTag::Orange => "tag-orange",
            ColorTag::Neutral => "",
        }
    }
}

// Order matters: substrings overlap ("red" also hits "shared", "ai" hits "email").
const COLOR_TABLE: &[(&[&str], ColorTag)] = &[
    (&["coding", "dev", "mcp"], ColorTag::Blue),
    (&["ai", "llm", "prompts"], ColorTag::Purple),
    (&["news", "red"], ColorTag::Red),
    (&["design", "creative"], ColorTag::Pink),
    (&["edu", "tutorial", "skills"], ColorTag::Green),
    (&["product", "tool"], ColorTag::Orange),
];

const COUNTRY_TABLE: &[(&[&str], &str)] = &[
    (&["usa", "united states", "us"], "us"),
    (&["uk", "united kingdom", "britain"], "gb"),
    (&["france"], "fr"),
    (&["germany"], "de"),
    (&["canada"], "ca"),
    (&["australia"], "au"),
    (&["china"], "cn"),
    (&["india"], "in"),
    (&["israel"], "il"),
    (&["czech"], "cz"),
    (&["switzer"], "ch"),
    (&["netherland"], "nl"),
    (&["belgium"], "be"),
    (&["singapore"], "sg"),
];

/// Shown when a country has no known flag.
pub const FLAG_PLACEHOLDER: &str = "🏳️";

fn first_match<T: Copy>(text: &str, table: &[(&[&str], T)]) -> Option<T> {
    let lower = text.to_lowercase();
    table
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, v)| *v)
}

pub fn color_class_for(label: &str) -> ColorTag {
    first_match(label, COLOR_TABLE).unwrap_or(ColorTag::Neutral)
}

/// ISO-3166 alpha-2 code for a free-form country name.
pub fn country_code_for(country: Option<&str>) -> Option<&'static str> {
    first_match(country.filter(|c| !c.is_empty())?, COUNTRY_TABLE)
}

pub fn flag_url(code: &str) -> String {
    format!("https://flagcdn.com/w40/{}.png", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_groups() {
        assert_eq!(color_class_for("Coding"), ColorTag::Blue);
        assert_eq!(color_class_for("MCP servers"), ColorTag::Blue);
        assert_eq!(color_class_for("LLM"), ColorTag::Purple);
        assert_eq!(color_class_for("Newsletter"), ColorTag::Red);
        assert_eq!(color_class_for("Creative"), ColorTag::Pink);
        assert_eq!(color_class_for("Tutorials"), ColorTag::Green);
        assert_eq!(color_class_for("Productivity"), ColorTag::Orange);
        assert_eq!(color_class_for("Weekly"), ColorTag::Neutral);
    }

    #[test]
    fn first_row_wins_on_overlap() {
        // "ai" (purple) is checked before "news" (red).
        assert_eq!(color_class_for("AI news"), ColorTag::Purple);
        // "dev" hides inside "devops tools", blue before orange.
        assert_eq!(color_class_for("DevOps tools"), ColorTag::Blue);
        assert_eq!(color_class_for("Shared"), ColorTag::Red);
    }

    #[test]
    fn css_classes() {
        assert_eq!(ColorTag::Blue.css_class(), "tag-blue");
        assert_eq!(ColorTag::Neutral.css_class(), "");
    }

    #[test]
    fn country_codes() {
        assert_eq!(country_code_for(Some("United States")), Some("us"));
        assert_eq!(country_code_for(Some("USA")), Some("us"));
        assert_eq!(country_code_for(Some("United Kingdom")), Some("gb"));
        assert_eq!(country_code_for(Some("Switzerland")), Some("ch"));
        assert_eq!(country_code_for(Some("The Netherlands")), Some("nl"));
        assert_eq!(country_code_for(Some("Unknown Place")), None);
        assert_eq!(country_code_for(Some("")), None);
        assert_eq!(country_code_for(None), None);
    }

    #[test]
    fn country_quirks_are_kept() {
        // "us" matches inside "Russia", "Australia" and "Belarus".
        assert_eq!(country_code_for(Some("Russia")), Some("us"));
        assert_eq!(country_code_for(Some("Australia")), Some("us"));
    }

    #[test]
    fn flag_url_format() {
        assert_eq!(flag_url("fr"), "https://flagcdn.com/w40/fr.png");
    }
}
