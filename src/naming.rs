//! Name collision policy and export file naming

use regex::Regex;

/// Renames an artifact whose name is already taken in the target realm.
///
/// `Login Script` becomes `Login Script - imported (1)`, and an already
/// renamed `Login Script - imported (1)` becomes `Login Script - imported (2)`.
#[derive(Debug, Clone)]
pub struct NameCollisionPolicy {
    imported_suffix: Regex,
}

impl Default for NameCollisionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl NameCollisionPolicy {
    pub fn new() -> Self {
        Self {
            imported_suffix: Regex::new(r"^(.* - imported) \(([0-9]+)\)$").unwrap(),
        }
    }

    /// Next candidate name after `name` collided
    pub fn next_name(&self, name: &str) -> String {
        if let Some(caps) = self.imported_suffix.captures(name) {
            let stem = &caps[1];
            if let Ok(n) = caps[2].parse::<u64>() {
                return format!("{} ({})", stem, n + 1);
            }
        }
        format!("{} - imported (1)", name)
    }
}

/// File-system friendly form of a journey or realm name
pub fn slugify(name: &str) -> String {
    let name = name
        .strip_prefix("https://")
        .or_else(|| name.strip_prefix("http://"))
        .unwrap_or(name);
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        } else if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~') {
            slug.push(ch);
        }
    }
    slug
}

/// `<slug>.journey.json`
pub fn journey_file_name(journey_id: &str) -> String {
    format!("{}.journey.json", slugify(journey_id))
}

/// `all<Realm>Journeys.journeys.json`, realm title-cased per path segment
pub fn all_journeys_file_name(realm: &str) -> String {
    let realm: String = realm
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(title_case)
        .collect();
    format!("all{}Journeys.journeys.json", realm)
}

fn title_case(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
