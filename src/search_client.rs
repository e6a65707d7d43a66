//! Venue lookup for the event form: Facebook pages/events and Google Places
//! autocomplete, each with a curated list of Québec venues to fall back on.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VenueSearchConfig;
use crate::utils::normalize_text;

const MAX_FACEBOOK_RESULTS: usize = 10;
const MAX_FALLBACK_PREDICTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Page,
    Event,
    All,
}

impl SearchType {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("event") => SearchType::Event,
            Some("all") => SearchType::All,
            _ => SearchType::Page,
        }
    }

    fn admits(&self, kind: &str) -> bool {
        match self {
            SearchType::Page => kind == "page",
            SearchType::Event => kind == "event",
            SearchType::All => true,
        }
    }
}

struct KnownVenue {
    id: &'static str,
    name: &'static str,
    address: &'static str,
    category: &'static str,
    kind: &'static str,
    description: Option<&'static str>,
}

const fn page(id: &'static str, name: &'static str, address: &'static str, category: &'static str) -> KnownVenue {
    KnownVenue { id, name, address, category, kind: "page", description: None }
}

const fn event(
    id: &'static str,
    name: &'static str,
    address: &'static str,
    category: &'static str,
    description: &'static str,
) -> KnownVenue {
    KnownVenue { id, name, address, category, kind: "event", description: Some(description) }
}

const KNOWN_VENUES: &[KnownVenue] = &[
    page("bordelcomedie", "Le Bordel Comédie Club", "Montréal, QC", "Club de comédie"),
    page("lebordel", "Le Bordel", "Montréal, QC", "Bar"),
    page("lefoutoir", "Le Foutoir", "Montréal, QC", "Bar/Restaurant"),
    page("comedynesttwo", "Comedy Nest", "Montréal, QC", "Club de comédie"),
    page("comedyworksmontreal", "Comedy Works", "Montréal, QC", "Club de comédie"),
    page("barleraymond", "Bar Le Raymond", "Montréal, QC", "Bar"),
    page("saintbock", "Saint-Bock", "Montréal, QC", "Brasserie"),
    page("lereservoir", "Le Réservoir", "Montréal, QC", "Brasserie"),
    page("ledieuducielmontreal", "Le Dieu du Ciel", "Montréal, QC", "Brasserie"),
    page("unibroue", "Unibroue", "Chambly, QC", "Brasserie"),
    page("brutopia", "Brutopia", "Montréal, QC", "Brasserie"),
    page("pubquartierlatinmtl", "Pub Quartier Latin", "Montréal, QC", "Pub"),
    page("chezserge", "Chez Serge", "Montréal, QC", "Restaurant"),
    page("bistrolemythos", "Bistro Le Mythos", "Montréal, QC", "Restaurant"),
    page("pubstpatrick", "Pub St-Patrick", "Montréal, QC", "Pub"),
    page("loupgaron", "Loup Garou", "Québec, QC", "Bar"),
    page("chezmaurice", "Chez Maurice", "Québec, QC", "Restaurant"),
    page("korrigannpub", "Korrigann Pub", "Québec, QC", "Pub"),
    page("pubdufaubourg", "Pub du Faubourg", "Québec, QC", "Pub"),
    page("sacrecoeurpub", "Sacré-Coeur Pub", "Québec, QC", "Pub"),
    page("theatregranby", "Théâtre Palace Granby", "Granby, QC", "Théâtre"),
    page("centreculturelgranby", "Centre culturel France Arbour", "Granby, QC", "Centre culturel"),
    page("casinogranby", "Casino de Granby", "Granby, QC", "Casino"),
    page("pubgranby", "Pub Granby", "Granby, QC", "Pub"),
    page("sallegranby", "Salle de spectacle Granby", "Granby, QC", "Salle de spectacle"),
    event("event-stand-up-bordeL", "Soirée Stand-up au Bordel", "Montréal, QC", "Spectacle", "Soirée de stand-up avec des humoristes locaux"),
    event("event-comedy-night", "Comedy Night Montréal", "Montréal, QC", "Comédie", "Nuit de la comédie avec plusieurs artistes"),
    event("event-open-mic", "Open Mic Comedy", "Montréal, QC", "Open Mic", "Micro ouvert pour humoristes débutants"),
    event("event-soiree-rire-granby", "La soirée du rire de Granby", "Granby, QC", "Spectacle d'humour", "Soirée humoristique à Granby avec des artistes locaux"),
    event("event-20sept-rire-granby", "20 septembre - La soirée du rire de Granby", "Granby, QC", "Spectacle d'humour", "Spectacle du 20 septembre à Granby"),
    event("event-granby-comedy", "Granby Comedy Show", "Granby, QC", "Comédie", "Spectacle de comédie à Granby"),
    event("event-rire-granby-automne", "Soirée du rire Granby - Automne", "Granby, QC", "Humour", "Soirée humoristique d'automne à Granby"),
];

const KNOWN_PLACES: &[&str] = &[
    "Le Bordel Comédie Club - Montréal, QC, Canada",
    "Théâtre Corona - Montréal, QC, Canada",
    "Le 164 - Saint-Jean-sur-Richelieu, QC, Canada",
    "La Taverne Vieux-Chambly - Chambly, QC, Canada",
    "Centre Bell - Montréal, QC, Canada",
    "Théâtre St-Denis - Montréal, QC, Canada",
    "Salle André-Mathieu - Laval, QC, Canada",
    "Théâtre du Capitole - Québec, QC, Canada",
    "L'Astral - Montréal, QC, Canada",
    "Bar Le Ritz PDB - Montréal, QC, Canada",
];

const SUGGESTED_CITIES: &[&str] = &[
    "Montréal", "Québec", "Laval", "Gatineau", "Longueuil", "Sherbrooke", "Trois-Rivières",
    "Saint-Jean-sur-Richelieu", "Chambly", "Granby",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FacebookResult {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: String,
    pub category: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredFormatting {
    pub main_text: String,
    #[serde(default)]
    pub secondary_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacePrediction {
    pub description: String,
    pub place_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_formatting: Option<StructuredFormatting>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AutocompleteResponse {
    pub predictions: Vec<PlacePrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_message: Option<String>,
}

// --- Graph API payloads ---

#[derive(Debug, Deserialize)]
struct GraphSearchResponse {
    #[serde(default)]
    data: Vec<GraphItem>,
}

#[derive(Debug, Deserialize)]
struct GraphPictureData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphPicture {
    data: Option<GraphPictureData>,
}

#[derive(Debug, Deserialize)]
struct GraphLocation {
    street: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphPlace {
    location: Option<GraphLocation>,
}

#[derive(Debug, Deserialize)]
struct GraphItem {
    id: String,
    name: String,
    category: Option<String>,
    description: Option<String>,
    verification_status: Option<String>,
    picture: Option<GraphPicture>,
    location: Option<GraphLocation>,
    place: Option<GraphPlace>,
}

#[derive(Debug, Deserialize)]
struct PlacesApiResponse {
    status: String,
    #[serde(default)]
    predictions: Vec<PlacePrediction>,
}

#[derive(Clone)]
pub struct VenueSearchClient {
    http: Client,
    config: VenueSearchConfig,
}

impl VenueSearchClient {
    pub fn new(http: Client, config: VenueSearchConfig) -> Self {
        Self { http, config }
    }

    pub async fn search_facebook(
        &self,
        query: &str,
        search_type: SearchType,
    ) -> Vec<FacebookResult> {
        if query.chars().count() < 2 {
            return Vec::new();
        }

        if let Some(token) = self.config.facebook_access_token.as_deref() {
            match self.graph_search(query, search_type, token).await {
                Ok(results) => return results,
                Err(e) => warn!("Facebook Graph search failed, using known venues: {}", e),
            }
        }

        search_known_venues(query, search_type)
    }

    async fn graph_search(
        &self,
        query: &str,
        search_type: SearchType,
        token: &str,
    ) -> Result<Vec<FacebookResult>, reqwest::Error> {
        let kind = if search_type == SearchType::Event { "event" } else { "page" };
        let fields = if kind == "event" {
            "id,name,description,place,start_time,cover"
        } else {
            "id,name,category,location,picture,verification_status,website"
        };

        let res = self
            .http
            .get(format!("{}/search", self.config.facebook_graph_url.trim_end_matches('/')))
            .query(&[
                ("q", query),
                ("type", kind),
                ("fields", fields),
                ("access_token", token),
                ("limit", "10"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = res.json::<GraphSearchResponse>().await?;
        Ok(body
            .data
            .into_iter()
            .map(|item| {
                let verified = matches!(
                    item.verification_status.as_deref(),
                    Some("blue_verified") | Some("gray_verified")
                );
                let street = item
                    .location
                    .and_then(|l| l.street)
                    .or_else(|| item.place.and_then(|p| p.location).and_then(|l| l.street))
                    .unwrap_or_default();
                let picture = item
                    .picture
                    .and_then(|p| p.data)
                    .and_then(|d| d.url)
                    .unwrap_or_else(|| format!("https://graph.facebook.com/{}/picture?type=large", item.id));

                FacebookResult {
                    url: format!("https://facebook.com/{}", item.id),
                    id: item.id,
                    name: item.name,
                    kind: kind.to_string(),
                    profile_picture: Some(picture),
                    description: item.description.filter(|d| !d.is_empty()),
                    location: street,
                    category: item.category.unwrap_or_else(|| "Événement".to_string()),
                    verified,
                }
            })
            .collect())
    }

    pub async fn autocomplete(&self, input: &str) -> AutocompleteResponse {
        let Some(key) = self.config.places_api_key.as_deref() else {
            return AutocompleteResponse {
                predictions: fallback_predictions(input),
                status: Some("FALLBACK_OK".into()),
                info_message: None,
            };
        };

        let res = self
            .http
            .get(format!("{}/autocomplete/json", self.config.places_api_url.trim_end_matches('/')))
            .query(&[
                ("input", input),
                ("key", key),
                ("language", "fr"),
                ("components", "country:ca"),
                ("types", "establishment|geocode"),
                ("location", "45.5017,-73.5673"),
                ("radius", "100000"),
                ("strictbounds", "false"),
            ])
            .send()
            .await;

        let body = match res {
            Ok(r) => r.json::<PlacesApiResponse>().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(body) if body.status == "OK" => AutocompleteResponse {
                predictions: body.predictions,
                status: None,
                info_message: None,
            },
            Ok(body) if body.status == "REQUEST_DENIED" => {
                warn!("Google Places denied the request, using known venues");
                AutocompleteResponse {
                    predictions: fallback_predictions(input),
                    status: Some("FALLBACK_USED".into()),
                    info_message: Some("API key has restrictions - using Quebec venues fallback".into()),
                }
            }
            Ok(body) => {
                debug!("Google Places answered {}", body.status);
                AutocompleteResponse { predictions: Vec::new(), status: None, info_message: None }
            }
            Err(e) => {
                warn!("Google Places request failed: {}", e);
                AutocompleteResponse { predictions: Vec::new(), status: None, info_message: None }
            }
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(' ')
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Similarity of a venue name to the query; 0 means no match.
pub fn venue_score(query: &str, name: &str, facebook_id: &str) -> u32 {
    let normalized_query = normalize_text(query);
    let normalized_name = normalize_text(name);
    if normalized_query.is_empty() {
        return 0;
    }

    let query_words = words(&normalized_query);
    let name_words = words(&normalized_name);
    let mut score = 0;

    if normalized_name.contains(&normalized_query) {
        score += 100;
    }

    let mut matched = 0usize;
    for q in &query_words {
        for w in &name_words {
            if w.contains(q.as_str()) || q.contains(w.as_str()) {
                matched += 1;
                score += 20;
            }
            if w.len() > 3 && q.len() > 3 {
                let common = w.len().min(q.len());
                if q.as_bytes()[..common] == w.as_bytes()[..common] {
                    score += 10;
                }
            }
        }
    }

    // Most of the query words found
    if !query_words.is_empty() && matched as f64 >= query_words.len() as f64 * 0.7 {
        score += 30;
    }

    if facebook_id.contains(&normalized_query.replace(' ', "")) {
        score += 50;
    }

    score
}

fn search_known_venues(query: &str, search_type: SearchType) -> Vec<FacebookResult> {
    let mut scored: Vec<(u32, &KnownVenue)> = KNOWN_VENUES
        .iter()
        .filter(|v| search_type.admits(v.kind))
        .map(|v| (venue_score(query, v.name, v.id), v))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(MAX_FACEBOOK_RESULTS)
        .map(|(_, v)| {
            let is_event = v.kind == "event";
            FacebookResult {
                id: v.id.to_string(),
                name: v.name.to_string(),
                url: if is_event {
                    format!("https://www.facebook.com/events/{}", v.id)
                } else {
                    format!("https://www.facebook.com/{}", v.id)
                },
                kind: v.kind.to_string(),
                profile_picture: None,
                description: v.description.map(str::to_string),
                location: v.address.to_string(),
                category: v.category.to_string(),
                verified: true,
            }
        })
        .collect()
}

fn fallback_predictions(input: &str) -> Vec<PlacePrediction> {
    let needle = input.to_lowercase();
    KNOWN_PLACES
        .iter()
        .map(|p| p.to_string())
        .chain(SUGGESTED_CITIES.iter().map(|city| format!("{} - {}, QC, Canada", input, city)))
        .filter(|candidate| candidate.to_lowercase().contains(&needle))
        .take(MAX_FALLBACK_PREDICTIONS)
        .enumerate()
        .map(|(index, description)| {
            let (main, secondary) = description
                .split_once(" - ")
                .map(|(m, s)| (m.to_string(), s.to_string()))
                .unwrap_or_else(|| (description.clone(), "Québec, Canada".to_string()));
            PlacePrediction {
                place_id: format!("fallback_{}", index),
                structured_formatting: Some(StructuredFormatting { main_text: main, secondary_text: secondary }),
                description,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use mockito::Matcher;

    fn client(config: VenueSearchConfig) -> VenueSearchClient {
        VenueSearchClient::new(Client::new(), config)
    }

    #[test]
    fn exact_name_ranks_first() {
        let results = search_known_venues("le bordel", SearchType::Page);
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "lebordel");
        assert!(results.iter().all(|r| r.kind == "page"));
        assert!(results.len() <= MAX_FACEBOOK_RESULTS);
    }

    #[test]
    fn accents_do_not_matter() {
        let results = search_known_venues("theatre palace", SearchType::All);
        assert_eq!(results[0].id, "theatregranby");
        assert_eq!(results[0].url, "https://www.facebook.com/theatregranby");
    }

    #[test]
    fn event_search_only_returns_events() {
        let results = search_known_venues("granby", SearchType::Event);
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.kind == "event"));
        assert!(results[0].url.starts_with("https://www.facebook.com/events/"));
    }

    #[test]
    fn unrelated_query_scores_zero() {
        assert_eq!(venue_score("xyzzy", "Le Bordel", "lebordel"), 0);
        assert!(venue_score("bordel", "Le Bordel", "lebordel") >= 150);
    }

    #[tokio::test]
    async fn short_queries_return_nothing() {
        let search = client(Config::default().venues);
        assert!(search.search_facebook("b", SearchType::Page).await.is_empty());
    }

    #[tokio::test]
    async fn autocomplete_without_key_uses_known_places() {
        let search = client(Config::default().venues);
        let res = search.autocomplete("Chambly").await;
        assert_eq!(res.status.as_deref(), Some("FALLBACK_OK"));
        assert!(!res.predictions.is_empty());
        assert!(res.predictions.len() <= MAX_FALLBACK_PREDICTIONS);
        let first = &res.predictions[0];
        assert_eq!(first.place_id, "fallback_0");
        assert_eq!(
            first.structured_formatting.as_ref().unwrap().main_text,
            "La Taverne Vieux-Chambly"
        );
    }

    #[tokio::test]
    async fn graph_api_results_are_mapped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "bordel".into()),
                Matcher::UrlEncoded("type".into(), "page".into()),
                Matcher::UrlEncoded("access_token".into(), "fb-token".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[{"id":"123","name":"Le Bordel","category":"Bar",
                    "verification_status":"blue_verified",
                    "location":{"street":"312 Ontario E"}}]}"#,
            )
            .create_async()
            .await;

        let mut config = Config::default().venues;
        config.facebook_access_token = Some("fb-token".into());
        config.facebook_graph_url = server.url();

        let results = client(config).search_facebook("bordel", SearchType::Page).await;
        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].verified);
        assert_eq!(results[0].location, "312 Ontario E");
        assert_eq!(
            results[0].profile_picture.as_deref(),
            Some("https://graph.facebook.com/123/picture?type=large")
        );
    }

    #[tokio::test]
    async fn graph_api_failure_falls_back() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut config = Config::default().venues;
        config.facebook_access_token = Some("fb-token".into());
        config.facebook_graph_url = server.url();

        let results = client(config).search_facebook("le bordel", SearchType::Page).await;
        assert_eq!(results[0].id, "lebordel");
    }

    #[tokio::test]
    async fn denied_places_request_uses_fallback() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/autocomplete/json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"REQUEST_DENIED","predictions":[]}"#)
            .create_async()
            .await;

        let mut config = Config::default().venues;
        config.places_api_key = Some("key".into());
        config.places_api_url = server.url();

        let res = client(config).autocomplete("Granby").await;
        assert_eq!(res.status.as_deref(), Some("FALLBACK_USED"));
        assert_eq!(res.predictions[0].description, "Granby - Montréal, QC, Canada");
    }
}
