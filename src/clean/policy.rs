use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tag-specific attribute allow-list used by the structure-only cleaner.
const STRUCTURE_TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "id", "aria-label", "role", "target"]),
    ("img", &["src", "alt", "id", "width", "height"]),
    (
        "input",
        &[
            "type",
            "id",
            "name",
            "value",
            "placeholder",
            "aria-label",
            "checked",
            "disabled",
            "readonly",
        ],
    ),
    ("button", &["type", "id", "aria-label", "disabled"]),
    ("form", &["id", "action", "method"]),
    ("label", &["for", "id"]),
    (
        "textarea",
        &[
            "id",
            "name",
            "placeholder",
            "aria-label",
            "rows",
            "cols",
            "readonly",
            "disabled",
        ],
    ),
    ("select", &["id", "name", "aria-label", "disabled", "multiple"]),
    ("option", &["value", "selected", "disabled", "label"]),
    (
        "iframe",
        &[
            "src",
            "id",
            "title",
            "width",
            "height",
            "allowfullscreen",
            "frameborder",
        ],
    ),
];

const GLOBAL_ATTRIBUTES: &[&str] = &[
    "id",
    "aria-label",
    "aria-labelledby",
    "aria-describedby",
    "role",
    "lang",
    "title",
];

const PRESENTATION_ATTRIBUTES: &[&str] = &["class", "style"];

const FIDELITY_TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("link", &["rel", "href", "media", "type"]),
    ("style", &["media", "type"]),
    (
        "svg",
        &[
            "viewBox",
            "xmlns",
            "width",
            "height",
            "fill",
            "stroke",
            "stroke-width",
            "preserveAspectRatio",
        ],
    ),
    (
        "path",
        &[
            "d",
            "fill",
            "stroke",
            "stroke-width",
            "stroke-linecap",
            "stroke-linejoin",
            "fill-rule",
            "clip-rule",
            "transform",
        ],
    ),
    ("g", &["fill", "stroke", "stroke-width", "transform", "clip-path"]),
    ("circle", &["cx", "cy", "r", "fill", "stroke", "stroke-width"]),
    (
        "rect",
        &["x", "y", "width", "height", "rx", "ry", "fill", "stroke", "stroke-width"],
    ),
    ("line", &["x1", "y1", "x2", "y2", "stroke", "stroke-width"]),
    ("polyline", &["points", "fill", "stroke", "stroke-width"]),
    ("polygon", &["points", "fill", "stroke", "stroke-width"]),
    ("ellipse", &["cx", "cy", "rx", "ry", "fill", "stroke"]),
    ("use", &["href", "x", "y", "width", "height"]),
    ("symbol", &["viewBox", "preserveAspectRatio"]),
];

/// Attributes that still carry meaning when present with an empty value.
const MEANINGFUL_WHEN_EMPTY: &[&str] = &[
    "alt",
    "value",
    "placeholder",
    "src",
    "href",
    "action",
    "for",
    "id",
    "name",
    "title",
    "checked",
    "disabled",
    "readonly",
    "selected",
    "multiple",
    "allowfullscreen",
];

const STRUCTURE_REMOVED_TAGS: &[&str] = &[
    "script", "style", "noscript", "meta", "link", "svg", "canvas", "template",
];

const FIDELITY_REMOVED_TAGS: &[&str] = &["script", "noscript", "meta", "canvas", "template"];

/// Which flavour of cleaning to apply.
///
/// `Structure` keeps only the skeleton a model needs to rebuild the layout.
/// `Fidelity` additionally keeps stylesheets, inline SVG, `class` and `style`
/// so the result renders closer to the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleaningPolicy {
    #[default]
    Structure,
    Fidelity,
}

impl CleaningPolicy {
    /// Elements removed together with their whole subtree.
    pub fn removed_tags(&self) -> &'static [&'static str] {
        match self {
            CleaningPolicy::Structure => STRUCTURE_REMOVED_TAGS,
            CleaningPolicy::Fidelity => FIDELITY_REMOVED_TAGS,
        }
    }

    pub fn removes(&self, tag: &str) -> bool {
        self.removed_tags()
            .iter()
            .any(|removed| removed.eq_ignore_ascii_case(tag))
    }

    pub fn keeps_presentation(&self) -> bool {
        matches!(self, CleaningPolicy::Fidelity)
    }

    pub fn allow_list(&self) -> AllowListPolicy {
        match self {
            CleaningPolicy::Structure => AllowListPolicy::structure(),
            CleaningPolicy::Fidelity => AllowListPolicy::fidelity(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CleaningPolicy::Structure => "structure",
            CleaningPolicy::Fidelity => "fidelity",
        }
    }
}

impl fmt::Display for CleaningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleaningPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structure" => Ok(CleaningPolicy::Structure),
            "fidelity" => Ok(CleaningPolicy::Fidelity),
            other => Err(format!(
                "Unknown cleaning policy '{other}'; expected structure or fidelity"
            )),
        }
    }
}

/// Permitted attributes per tag plus a set permitted on every tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowListPolicy {
    global: BTreeSet<String>,
    per_tag: BTreeMap<String, BTreeSet<String>>,
}

impl AllowListPolicy {
    pub fn empty() -> Self {
        Self {
            global: BTreeSet::new(),
            per_tag: BTreeMap::new(),
        }
    }

    pub fn structure() -> Self {
        let mut policy = Self::empty().with_global(GLOBAL_ATTRIBUTES.iter().copied());
        for (tag, attrs) in STRUCTURE_TAG_ATTRIBUTES {
            policy = policy.with_tag(tag, attrs.iter().copied());
        }
        policy
    }

    pub fn fidelity() -> Self {
        let mut policy = Self::structure().with_global(PRESENTATION_ATTRIBUTES.iter().copied());
        for (tag, attrs) in FIDELITY_TAG_ATTRIBUTES {
            policy = policy.with_tag(tag, attrs.iter().copied());
        }
        policy
    }

    pub fn with_global<'a>(mut self, attrs: impl IntoIterator<Item = &'a str>) -> Self {
        self.global.extend(attrs.into_iter().map(String::from));
        self
    }

    pub fn with_tag<'a>(mut self, tag: &str, attrs: impl IntoIterator<Item = &'a str>) -> Self {
        self.per_tag
            .entry(tag.to_string())
            .or_default()
            .extend(attrs.into_iter().map(String::from));
        self
    }

    pub fn permits(&self, tag: &str, attr: &str) -> bool {
        self.global.contains(attr)
            || self
                .per_tag
                .get(tag)
                .is_some_and(|allowed| allowed.contains(attr))
    }

    /// Attributes allowed on `tag`, global ones included.
    pub fn allowed_for(&self, tag: &str) -> BTreeSet<&str> {
        let mut allowed: BTreeSet<&str> = self.global.iter().map(String::as_str).collect();
        if let Some(specific) = self.per_tag.get(tag) {
            allowed.extend(specific.iter().map(String::as_str));
        }
        allowed
    }
}

impl Default for AllowListPolicy {
    fn default() -> Self {
        Self::structure()
    }
}

pub(crate) fn meaningful_when_empty(attr: &str) -> bool {
    MEANINGFUL_WHEN_EMPTY.contains(&attr)
}

pub(crate) fn is_data_attribute(attr: &str) -> bool {
    attr.len() > 5
        && attr
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_table_matches_tag_and_global_sets() {
        let policy = AllowListPolicy::structure();
        assert!(policy.permits("a", "href"));
        assert!(policy.permits("a", "target"));
        assert!(policy.permits("div", "aria-label"));
        assert!(policy.permits("option", "selected"));
        assert!(!policy.permits("div", "href"));
        assert!(!policy.permits("img", "class"));
        assert!(!policy.permits("p", "style"));
    }

    #[test]
    fn fidelity_extends_structure() {
        let structure = AllowListPolicy::structure();
        let fidelity = AllowListPolicy::fidelity();
        for tag in ["a", "img", "input", "div"] {
            for attr in structure.allowed_for(tag) {
                assert!(fidelity.permits(tag, attr), "{tag} {attr}");
            }
        }
        assert!(fidelity.permits("div", "class"));
        assert!(fidelity.permits("span", "style"));
        assert!(fidelity.permits("path", "d"));
        assert!(fidelity.permits("link", "rel"));
    }

    #[test]
    fn policies_remove_expected_subtrees() {
        assert!(CleaningPolicy::Structure.removes("svg"));
        assert!(CleaningPolicy::Structure.removes("STYLE"));
        assert!(!CleaningPolicy::Fidelity.removes("svg"));
        assert!(!CleaningPolicy::Fidelity.removes("style"));
        for policy in [CleaningPolicy::Structure, CleaningPolicy::Fidelity] {
            assert!(policy.removes("script"));
            assert!(policy.removes("noscript"));
            assert!(policy.removes("template"));
        }
    }

    #[test]
    fn data_attribute_detection_requires_suffix() {
        assert!(is_data_attribute("data-track"));
        assert!(is_data_attribute("DATA-id"));
        assert!(!is_data_attribute("data-"));
        assert!(!is_data_attribute("database"));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Fidelity".parse::<CleaningPolicy>(), Ok(CleaningPolicy::Fidelity));
        assert_eq!(" structure ".parse::<CleaningPolicy>(), Ok(CleaningPolicy::Structure));
        assert!("verbatim".parse::<CleaningPolicy>().is_err());
    }
}
