use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::annotations::VisitedPlace;
use crate::catalog::Place;

pub const UNCATEGORIZED_LABEL: &str = "Senza categoria";
const TOP_CATEGORY_LIMIT: usize = 3;
const HIGHLIGHT_YEARS: usize = 2;
const HIGHLIGHT_PLACES_PER_YEAR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Season {
    Primavera,
    Estate,
    Autunno,
    Inverno,
}

impl Season {
    pub const ALL: [Season; 4] = [
        Season::Primavera,
        Season::Estate,
        Season::Autunno,
        Season::Inverno,
    ];

    /// `month0` is zero-based (January = 0).
    pub fn from_month0(month0: u32) -> Self {
        match month0 {
            2..=4 => Season::Primavera,
            5..=7 => Season::Estate,
            8..=10 => Season::Autunno,
            _ => Season::Inverno,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonCount {
    pub season: Season,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub name: String,
    pub visited: usize,
    pub favorites: usize,
    pub not_interested: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearHighlight {
    pub year: i32,
    pub places: Vec<HighlightPlace>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightPlace {
    pub id: i64,
    pub title: String,
    pub url: String,
}

pub struct StatisticsInput<'a> {
    pub places: &'a [Place],
    pub visited: &'a [VisitedPlace],
    pub favorites: &'a BTreeSet<i64>,
    pub not_interested: &'a BTreeSet<i64>,
    pub hidden_categories: &'a BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub current_year: i32,
    pub total_visits: usize,
    pub total_favorites: usize,
    pub visits_by_year: BTreeMap<i32, usize>,
    pub category_stats: Vec<CategoryStats>,
    pub top_categories: Vec<CategoryStats>,
    pub seasons: Vec<SeasonCount>,
    pub top_season: Season,
    pub highlights: Vec<YearHighlight>,
}

/// Accepts `YYYY-MM-DD`, RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS` timestamps.
pub fn parse_visit_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Missing or unparsable dates count as `today`.
fn effective_date(visit: &VisitedPlace, today: NaiveDate) -> NaiveDate {
    parse_visit_date(&visit.visit_date).unwrap_or(today)
}

struct Visible<'a> {
    points: Vec<&'a Place>,
    by_id: HashMap<i64, &'a Place>,
    visits: Vec<&'a VisitedPlace>,
    visited_ids: HashSet<i64>,
    favorites: BTreeSet<i64>,
}

impl<'a> Visible<'a> {
    fn new(input: &StatisticsInput<'a>) -> Self {
        let hidden = |place: &Place| place.has_any_category(|id| input.hidden_categories.contains(&id));
        let points = input
            .places
            .iter()
            .filter(|place| !hidden(*place))
            .collect::<Vec<_>>();
        let by_id = points
            .iter()
            .map(|place| (place.id, *place))
            .collect::<HashMap<_, _>>();
        let visits = input
            .visited
            .iter()
            .filter(|visit| by_id.contains_key(&visit.id))
            .collect::<Vec<_>>();
        let visited_ids = visits.iter().map(|visit| visit.id).collect();
        let favorites = input
            .favorites
            .iter()
            .copied()
            .filter(|id| by_id.contains_key(id))
            .collect();
        Self {
            points,
            by_id,
            visits,
            visited_ids,
            favorites,
        }
    }
}

impl Statistics {
    pub fn compute(input: &StatisticsInput<'_>, today: NaiveDate) -> Self {
        let visible = Visible::new(input);

        let mut visits_by_year = BTreeMap::new();
        let mut season_counts = HashMap::new();
        for visit in &visible.visits {
            let date = effective_date(visit, today);
            *visits_by_year.entry(date.year()).or_insert(0) += 1;
            *season_counts.entry(Season::from_month0(date.month0())).or_insert(0) += 1;
        }

        let seasons = Season::ALL
            .iter()
            .map(|season| SeasonCount {
                season: *season,
                count: season_counts.get(season).copied().unwrap_or(0),
            })
            .collect::<Vec<_>>();
        let top_season = pick_top_season(&seasons);

        let category_stats = category_stats(&visible, input.not_interested);
        let mut top_categories = category_stats.clone();
        top_categories.sort_by(|a, b| b.visited.cmp(&a.visited));
        top_categories.truncate(TOP_CATEGORY_LIMIT);

        let highlights = visits_by_year
            .keys()
            .rev()
            .take(HIGHLIGHT_YEARS)
            .map(|year| YearHighlight {
                year: *year,
                places: top_places_by_year(&visible, *year, HIGHLIGHT_PLACES_PER_YEAR, today)
                    .into_iter()
                    .map(|place| HighlightPlace {
                        id: place.id,
                        title: place.display_title(),
                        url: place.url.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            current_year: today.year(),
            total_visits: visible.visits.len(),
            total_favorites: visible.favorites.len(),
            visits_by_year,
            category_stats,
            top_categories,
            seasons,
            top_season,
            highlights,
        }
    }
}

/// First visible places visited in `year`, earliest visit first. Visits on
/// the same day keep their visit-list order.
pub fn places_visited_in<'a>(
    input: &StatisticsInput<'a>,
    year: i32,
    limit: usize,
    today: NaiveDate,
) -> Vec<&'a Place> {
    top_places_by_year(&Visible::new(input), year, limit, today)
}

fn top_places_by_year<'a>(
    visible: &Visible<'a>,
    year: i32,
    limit: usize,
    today: NaiveDate,
) -> Vec<&'a Place> {
    let mut visits = visible
        .visits
        .iter()
        .map(|visit| (effective_date(visit, today), visit.id))
        .filter(|(date, _)| date.year() == year)
        .collect::<Vec<_>>();
    visits.sort_by_key(|(date, _)| *date);
    visits
        .into_iter()
        .filter_map(|(_, id)| visible.by_id.get(&id).copied())
        .take(limit)
        .collect()
}

// The running winner is kept only while strictly greater, so a tie goes to
// the later season.
fn pick_top_season(seasons: &[SeasonCount]) -> Season {
    seasons
        .iter()
        .copied()
        .reduce(|best, next| if best.count > next.count { best } else { next })
        .map(|winner| winner.season)
        .unwrap_or(Season::Inverno)
}

fn category_stats(visible: &Visible<'_>, not_interested: &BTreeSet<i64>) -> Vec<CategoryStats> {
    let mut order: Vec<CategoryStats> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for place in &visible.points {
        let names = if place.categories.is_empty() {
            vec![UNCATEGORIZED_LABEL]
        } else {
            place
                .categories
                .iter()
                .map(|category| category.name.as_str())
                .collect()
        };
        for name in names {
            let slot = *index.entry(name.to_string()).or_insert_with(|| {
                order.push(CategoryStats {
                    name: name.to_string(),
                    visited: 0,
                    favorites: 0,
                    not_interested: 0,
                });
                order.len() - 1
            });
            let stats = &mut order[slot];
            if visible.visited_ids.contains(&place.id) {
                stats.visited += 1;
            }
            if visible.favorites.contains(&place.id) {
                stats.favorites += 1;
            }
            if not_interested.contains(&place.id) {
                stats.not_interested += 1;
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 10).unwrap()
    }

    fn place(id: i64, categories: &[(i64, &str)]) -> Place {
        Place {
            id,
            title: format!("Luogo {id}"),
            lat: 0.0,
            lng: 0.0,
            url: format!("https://example.com/{id}"),
            description: None,
            categories: categories
                .iter()
                .map(|(id, name)| Category {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    fn visit(id: i64, date: &str) -> VisitedPlace {
        VisitedPlace {
            id,
            visit_date: date.into(),
        }
    }

    fn compute(
        places: &[Place],
        visited: &[VisitedPlace],
        favorites: &[i64],
        hidden: &[i64],
    ) -> Statistics {
        let favorites = favorites.iter().copied().collect();
        let hidden = hidden.iter().copied().collect();
        let not_interested = BTreeSet::new();
        Statistics::compute(
            &StatisticsInput {
                places,
                visited,
                favorites: &favorites,
                not_interested: &not_interested,
                hidden_categories: &hidden,
            },
            today(),
        )
    }

    #[test]
    fn empty_date_counts_in_current_year() {
        let places = vec![place(1, &[])];
        let stats = compute(&places, &[visit(1, "")], &[], &[]);
        assert_eq!(stats.visits_by_year, BTreeMap::from([(2025, 1)]));
        assert_eq!(stats.current_year, 2025);
    }

    #[test]
    fn unparsable_date_counts_in_current_year() {
        let places = vec![place(1, &[]), place(2, &[])];
        let stats = compute(
            &places,
            &[visit(1, "not a date"), visit(2, "2019-06-01T10:00:00Z")],
            &[],
            &[],
        );
        assert_eq!(stats.visits_by_year, BTreeMap::from([(2019, 1), (2025, 1)]));
    }

    #[test]
    fn months_map_to_seasons() {
        assert_eq!(Season::from_month0(6), Season::Estate);
        assert_eq!(Season::from_month0(11), Season::Inverno);
        assert_eq!(Season::from_month0(0), Season::Inverno);
        assert_eq!(Season::from_month0(2), Season::Primavera);
        assert_eq!(Season::from_month0(10), Season::Autunno);

        let places = vec![place(1, &[]), place(2, &[])];
        let stats = compute(
            &places,
            &[visit(1, "2024-07-15"), visit(2, "2023-12-01")],
            &[],
            &[],
        );
        let count = |season| {
            stats
                .seasons
                .iter()
                .find(|entry| entry.season == season)
                .map(|entry| entry.count)
                .unwrap()
        };
        assert_eq!(count(Season::Estate), 1);
        assert_eq!(count(Season::Inverno), 1);
        assert_eq!(stats.top_season, Season::Inverno);
    }

    #[test]
    fn strict_winner_takes_top_season() {
        let places = vec![place(1, &[]), place(2, &[]), place(3, &[])];
        let stats = compute(
            &places,
            &[
                visit(1, "2024-04-01"),
                visit(2, "2024-05-01"),
                visit(3, "2024-12-01"),
            ],
            &[],
            &[],
        );
        assert_eq!(stats.top_season, Season::Primavera);
        assert_eq!(compute(&places, &[], &[], &[]).top_season, Season::Inverno);
    }

    #[test]
    fn hidden_categories_are_excluded() {
        let places = vec![
            place(1, &[(10, "Castelli")]),
            place(2, &[(11, "Giardini"), (10, "Castelli")]),
            place(3, &[(11, "Giardini")]),
        ];
        let stats = compute(
            &places,
            &[visit(1, "2024-01-01"), visit(3, "2024-01-02"), visit(99, "")],
            &[1, 2, 3],
            &[10],
        );
        assert_eq!(stats.total_visits, 1);
        assert_eq!(stats.total_favorites, 1);
        assert_eq!(
            stats.category_stats,
            vec![CategoryStats {
                name: "Giardini".into(),
                visited: 1,
                favorites: 1,
                not_interested: 0,
            }]
        );
    }

    #[test]
    fn ranks_categories_with_first_seen_ties() {
        let places = vec![
            place(1, &[(1, "Ville")]),
            place(2, &[(2, "Abbazie")]),
            place(3, &[(3, "Castelli")]),
            place(4, &[(3, "Castelli")]),
            place(5, &[]),
        ];
        let visited = [
            visit(1, "2024-01-01"),
            visit(2, "2024-01-01"),
            visit(3, "2024-01-01"),
            visit(4, "2024-01-01"),
            visit(5, "2024-01-01"),
        ];
        let stats = compute(&places, &visited, &[], &[]);
        let ranking = stats
            .top_categories
            .iter()
            .map(|entry| (entry.name.as_str(), entry.visited))
            .collect::<Vec<_>>();
        assert_eq!(ranking, vec![("Castelli", 2), ("Ville", 1), ("Abbazie", 1)]);
        assert_eq!(stats.category_stats.len(), 4);
        assert_eq!(stats.category_stats[3].name, UNCATEGORIZED_LABEL);
    }

    #[test]
    fn highlights_cover_latest_years() {
        let places = vec![place(1, &[]), place(2, &[]), place(3, &[]), place(4, &[])];
        let visited = [
            visit(1, "2022-03-01"),
            visit(2, "2024-03-01"),
            visit(3, "2023-03-01"),
            visit(4, "2024-09-01"),
        ];
        let stats = compute(&places, &visited, &[], &[]);
        let years = stats.highlights.iter().map(|h| h.year).collect::<Vec<_>>();
        assert_eq!(years, vec![2024, 2023]);
        let ids = stats.highlights[0]
            .places
            .iter()
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 4]);

        let favorites = BTreeSet::new();
        let hidden = BTreeSet::new();
        let input = StatisticsInput {
            places: &places,
            visited: &visited,
            favorites: &favorites,
            not_interested: &favorites,
            hidden_categories: &hidden,
        };
        assert_eq!(places_visited_in(&input, 2022, 5, today())[0].id, 1);
    }

    #[test]
    fn highlights_list_places_by_visit_date() {
        let places = (1..=5).map(|id| place(id, &[])).collect::<Vec<_>>();
        let visited = [
            visit(1, "2024-11-20"),
            visit(2, "2024-02-03"),
            visit(3, "2024-07-15"),
            visit(4, "2024-01-09"),
            visit(5, "2024-02-03"),
        ];
        let stats = compute(&places, &visited, &[], &[]);
        let ids = stats.highlights[0]
            .places
            .iter()
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![4, 2]);
    }
}
