use crate::model::DirectoryEntry;

/// Picks the mail address for a row: the directory address when present,
/// otherwise one synthesised from the entry's names and `domain`.
///
/// Without a configured domain nothing is synthesised and the (possibly
/// empty) directory address is passed through.
pub fn derive_mail(entry: Option<&DirectoryEntry>, domain: Option<&str>) -> String {
    let Some(entry) = entry else {
        return String::new();
    };
    let email = entry.email.trim();
    if !email.is_empty() {
        return entry.email.clone();
    }
    let Some(domain) = domain else {
        return email.to_string();
    };
    synthesize(&entry.first_name, &entry.last_name, domain).unwrap_or_default()
}

/// `<first initial><last name without whitespace>@<domain>`, lower-cased.
pub fn synthesize(first_name: &str, last_name: &str, domain: &str) -> Option<String> {
    let initial = first_name.trim().chars().next()?;
    let last: String = last_name.split_whitespace().collect();
    if last.is_empty() {
        return None;
    }
    Some(format!("{initial}{last}@{domain}").to_lowercase())
}
