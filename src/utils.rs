//! Text and date helpers shared by the controllers and the venue search.

use chrono::{Datelike, NaiveDate};

const FRENCH_MONTHS: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin",
    "juillet", "août", "septembre", "octobre", "novembre", "décembre",
];

// Checked in order when the address has no comma-separated city part
const KNOWN_CITIES: [&str; 20] = [
    "Chambly", "Montréal", "Québec", "Laval", "Gatineau", "Longueuil", "Sherbrooke",
    "Saguenay", "Lévis", "Trois-Rivières", "Terrebonne", "Saint-Jean-sur-Richelieu",
    "Granby", "Drummondville", "Saint-Jérôme", "Chicoutimi", "Saint-Hyacinthe",
    "Shawinigan", "Dollard-des-Ormeaux", "Blainville",
];

/// `20 SEPTEMBRE 2025`
pub fn format_french_date(date: NaiveDate) -> String {
    let month = FRENCH_MONTHS[date.month0() as usize];
    format!("{:02} {} {}", date.day(), month, date.year()).to_uppercase()
}

/// City from a Québec-style address: `Name, Street, City, QC A1A 1A1`.
pub fn extract_city_from_address(address: &str) -> String {
    if address.trim().is_empty() {
        return String::new();
    }

    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    if parts.len() >= 3 {
        return parts[parts.len() - 2].to_string();
    }

    let lowered = address.to_lowercase();
    KNOWN_CITIES
        .iter()
        .find(|city| lowered.contains(&city.to_lowercase()))
        .map(|city| city.to_string())
        .unwrap_or_default()
}

/// Leading segment of the address, usually the bar or theatre name.
pub fn extract_venue_name_from_address(address: &str) -> String {
    address
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Lowercases, strips accents and punctuation, collapses whitespace.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
