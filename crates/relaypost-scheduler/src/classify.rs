//! Keyword classifier and message renderer used when no smarter classifier
//! is plugged in.

use std::collections::BTreeSet;

use relaypost_core::traits::Classifier;
use relaypost_core::types::{ItemKind, Priority, RenderRequest};

const REQUIREMENT_WORDS: &[&str] = &["looking for", "wanted", "required", "need"];
const ANNOUNCEMENT_WORDS: &[&str] = &["announcement", "notice", "event"];
const URGENT_WORDS: &[&str] = &["urgent", "asap", "hot deal"];
const PROPERTY_WORDS: &[&str] = &[
    "apartment", "flat", "villa", "plot", "office", "shop", "rent", "resale", "lease",
    "furnished",
];

const MIN_TAG_LEN: usize = 2;
const MAX_TAG_LEN: usize = 40;

/// Lowercase, strip `#`, map spaces and hyphens to `_`, keep only
/// `[a-z0-9_]{2,40}`. Output is deduplicated and sorted.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag: String = tag
            .as_ref()
            .trim()
            .trim_start_matches('#')
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        let valid_len = (MIN_TAG_LEN..=MAX_TAG_LEN).contains(&tag.len());
        let valid_chars = tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid_len && valid_chars {
            out.insert(tag);
        }
    }
    out.into_iter().collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// "3bhk", "3 bhk", "2.5-bhk" → "3bhk", "3bhk", "2_5bhk".
fn bhk_tags(lower: &str) -> Vec<String> {
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',' || c == '/')
        .filter(|w| !w.is_empty())
        .collect();
    let mut tags = Vec::new();
    for (i, word) in words.iter().enumerate() {
        if *word == "bhk" {
            if i > 0 && words[i - 1].chars().all(|c| c.is_ascii_digit()) {
                tags.push(format!("{}bhk", words[i - 1]));
            }
        } else if let Some(size) = word.strip_suffix("bhk") {
            let size = size.trim_end_matches('-');
            if !size.is_empty() && size.chars().all(|c| c.is_ascii_digit() || c == '.') {
                tags.push(format!("{}bhk", size.replace('.', "_")));
            }
        }
    }
    tags
}

impl Classifier for KeywordClassifier {
    fn classify_kind(&self, text: &str) -> ItemKind {
        let lower = text.to_lowercase();
        if contains_any(&lower, REQUIREMENT_WORDS) {
            ItemKind::Requirement
        } else if contains_any(&lower, ANNOUNCEMENT_WORDS) {
            ItemKind::Announcement
        } else {
            ItemKind::Listing
        }
    }

    fn classify_priority(&self, text: &str) -> Priority {
        if contains_any(&text.to_lowercase(), URGENT_WORDS) {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    fn classify_tags(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut tags: Vec<String> = lower
            .split_whitespace()
            .filter_map(|w| w.strip_prefix('#'))
            .map(|w| w.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'))
            .map(str::to_string)
            .collect();
        tags.extend(bhk_tags(&lower));
        tags.extend(
            PROPERTY_WORDS
                .iter()
                .filter(|w| {
                    lower
                        .split(|c: char| !c.is_alphanumeric())
                        .any(|token| token == **w)
                })
                .map(|w| w.to_string()),
        );
        tags
    }

    fn render_message(&self, request: &RenderRequest<'_>) -> String {
        let header = match request.kind {
            ItemKind::Listing => "🏠 *New Listing*",
            ItemKind::Requirement => "🔎 *Requirement*",
            ItemKind::Announcement => "📢 *Announcement*",
        };
        let mut lines = Vec::new();
        if request.priority == Priority::High {
            lines.push(format!("🔥 URGENT · {header}"));
        } else {
            lines.push(header.to_string());
        }
        lines.push(String::new());
        lines.push(request.content.trim().to_string());

        let attribution = &request.attribution;
        let credit = match (&attribution.posted_by, &attribution.contact) {
            (Some(by), Some(contact)) => Some(format!("👤 {by} · 📞 {contact}")),
            (Some(by), None) => Some(format!("👤 {by}")),
            (None, Some(contact)) => Some(format!("📞 {contact}")),
            (None, None) => None,
        };
        if let Some(credit) = credit {
            lines.push(String::new());
            lines.push(credit);
        }

        if !request.tags.is_empty() {
            let hashtags: Vec<String> = request.tags.iter().map(|t| format!("#{t}")).collect();
            lines.push(String::new());
            lines.push(hashtags.join(" "));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaypost_core::types::Attribution;

    #[test]
    fn test_kind_vocabulary() {
        let c = KeywordClassifier::new();
        assert_eq!(c.classify_kind("3BHK in Wakad"), ItemKind::Listing);
        assert_eq!(c.classify_kind("Looking for 2BHK near Baner"), ItemKind::Requirement);
        assert_eq!(c.classify_kind("Client NEEDS office space"), ItemKind::Requirement);
        assert_eq!(c.classify_kind("Notice: office closed Monday"), ItemKind::Announcement);
    }

    #[test]
    fn test_priority_vocabulary() {
        let c = KeywordClassifier::new();
        assert_eq!(c.classify_priority("URGENT sale"), Priority::High);
        assert_eq!(c.classify_priority("Hot deal in Hinjewadi"), Priority::High);
        assert_eq!(c.classify_priority("3BHK in Wakad"), Priority::Normal);
    }

    #[test]
    fn test_tags_from_text() {
        let c = KeywordClassifier::new();
        let tags = normalize_tags(c.classify_tags("3BHK in Wakad, #Pune #ready-to-move!"));
        assert_eq!(tags, vec!["3bhk", "pune", "ready_to_move"]);

        let tags = normalize_tags(c.classify_tags("Spacious 2 BHK flat for rent"));
        assert_eq!(tags, vec!["2bhk", "flat", "rent"]);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["#Pune", "pune", "Sea View", "x", "bad!tag", "2-bhk"]);
        assert_eq!(tags, vec!["2_bhk", "pune", "sea_view"]);

        let long = "a".repeat(41);
        assert!(normalize_tags([long.as_str()]).is_empty());
    }

    #[test]
    fn test_render_message() {
        let c = KeywordClassifier::new();
        let attribution = Attribution {
            posted_by: Some("Asha".into()),
            contact: Some("98200 00000".into()),
        };
        let tags = vec!["3bhk".to_string(), "wakad".to_string()];
        let body = c.render_message(&RenderRequest {
            kind: ItemKind::Listing,
            priority: Priority::High,
            content: "  3BHK in Wakad  ",
            attribution: &attribution,
            tags: &tags,
        });
        assert_eq!(
            body,
            "🔥 URGENT · 🏠 *New Listing*\n\n3BHK in Wakad\n\n👤 Asha · 📞 98200 00000\n\n#3bhk #wakad"
        );
    }

    #[test]
    fn test_render_without_extras() {
        let c = KeywordClassifier::new();
        let attribution = Attribution::default();
        let body = c.render_message(&RenderRequest {
            kind: ItemKind::Requirement,
            priority: Priority::Normal,
            content: "Need 1BHK",
            attribution: &attribution,
            tags: &[],
        });
        assert_eq!(body, "🔎 *Requirement*\n\nNeed 1BHK");
    }
}
