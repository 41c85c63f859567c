use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use statscrape_core::{day_before_wire, to_wire_date, ParamValue, Placeholder, ScrapeError};
use statscrape_storage::SqliteStore;
use tracing::debug;

const PLAYER_POSITIONS: [&str; 3] = ["G", "F", "C"];

/// Values a placeholder can take: one flat list, or a list per season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSet {
    Flat(Vec<ParamValue>),
    BySeason(BTreeMap<String, Vec<ParamValue>>),
}

impl ValueSet {
    /// Values applicable to `season`. A season with no entry has no values.
    pub fn values(&self, season: Option<&str>) -> &[ParamValue] {
        match self {
            ValueSet::Flat(values) => values,
            ValueSet::BySeason(by_season) => season
                .and_then(|s| by_season.get(s))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }
}

/// Resolves placeholders to candidate values, memoizing each resolution for
/// the catalog's lifetime.
#[derive(Debug)]
pub struct ParamCatalog {
    store: SqliteStore,
    seasons: Vec<String>,
    current_season: String,
    daily_today: Option<NaiveDate>,
    cache: HashMap<Placeholder, ValueSet>,
}

impl ParamCatalog {
    pub fn new(store: SqliteStore, seasons: Vec<String>, current_season: impl Into<String>) -> Self {
        Self {
            store,
            seasons,
            current_season: current_season.into(),
            daily_today: None,
            cache: HashMap::new(),
        }
    }

    /// Catalog for a daily run: only the current season, and `DATE_TO` is
    /// the day before `today`.
    pub fn daily(store: SqliteStore, current_season: impl Into<String>, today: NaiveDate) -> Self {
        let current_season = current_season.into();
        Self {
            store,
            seasons: vec![current_season.clone()],
            current_season,
            daily_today: Some(today),
            cache: HashMap::new(),
        }
    }

    pub fn seasons(&self) -> &[String] {
        &self.seasons
    }

    pub fn current_season(&self) -> &str {
        &self.current_season
    }

    pub async fn resolve(&mut self, placeholder: Placeholder) -> Result<&ValueSet, ScrapeError> {
        match self.cache.entry(placeholder) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                let values = load_values(
                    &self.store,
                    &self.seasons,
                    &self.current_season,
                    self.daily_today,
                    placeholder,
                )
                .await?;
                Ok(&*entry.insert(values))
            }
        }
    }
}

async fn load_values(
    store: &SqliteStore,
    seasons: &[String],
    current_season: &str,
    daily_today: Option<NaiveDate>,
    placeholder: Placeholder,
) -> Result<ValueSet, ScrapeError> {
    debug!(%placeholder, "resolving placeholder values");
    match placeholder {
        Placeholder::Season => Ok(ValueSet::Flat(
            seasons.iter().map(|s| ParamValue::from(s.as_str())).collect(),
        )),
        Placeholder::PlayerPosition => Ok(ValueSet::Flat(
            PLAYER_POSITIONS.iter().map(|&p| ParamValue::from(p)).collect(),
        )),
        Placeholder::PlayerId => by_season(store, "player_ids", "PLAYER_ID", placeholder).await,
        Placeholder::GameDate => by_season(store, "game_dates", "GAME_DATE", placeholder).await,
        Placeholder::GameId => by_season(store, "games", "GAME_ID", placeholder).await,
        Placeholder::DateTo => match daily_today {
            Some(today) => {
                let yesterday = today.pred_opt().ok_or_else(|| ScrapeError::InvalidDate {
                    value: today.to_string(),
                })?;
                let values = vec![ParamValue::from(to_wire_date(yesterday))];
                Ok(ValueSet::BySeason(BTreeMap::from([(current_season.to_string(), values)])))
            }
            None => {
                let ValueSet::BySeason(game_dates) =
                    by_season(store, "game_dates", "GAME_DATE", placeholder).await?
                else {
                    return Ok(ValueSet::BySeason(BTreeMap::new()));
                };
                let mut shifted = BTreeMap::new();
                for (season, dates) in game_dates {
                    let values = dates
                        .iter()
                        .map(|date| day_before_wire(&date.to_string()).map(ParamValue::from))
                        .collect::<Result<Vec<_>, _>>()?;
                    shifted.insert(season, values);
                }
                Ok(ValueSet::BySeason(shifted))
            }
        },
    }
}

// Distinct `column` values grouped by `SEASON`, in stored order.
async fn by_season(
    store: &SqliteStore,
    table: &str,
    column: &str,
    placeholder: Placeholder,
) -> Result<ValueSet, ScrapeError> {
    if !store.exists_table(table).await? {
        return Err(ScrapeError::MissingReferenceTable {
            table: table.to_string(),
            placeholder,
        });
    }
    let result = store
        .query(&format!("SELECT SEASON, {column} FROM {table} ORDER BY rowid"), &[])
        .await?;

    let mut grouped: BTreeMap<String, Vec<ParamValue>> = BTreeMap::new();
    for row in &result.rows {
        let (Some(season), Some(value)) = (
            ParamValue::from_json(&row[0]),
            ParamValue::from_json(&row[1]),
        ) else {
            continue;
        };
        let values = grouped.entry(season.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(ValueSet::BySeason(grouped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statscrape_core::DuplicatePolicy;

    async fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        let columns = vec!["SEASON".to_string(), "PLAYER_ID".to_string()];
        store
            .create_and_insert(
                "player_ids",
                &columns,
                &[
                    vec![json!("2016-17"), json!(7)],
                    vec![json!("2017-18"), json!(5)],
                    vec![json!("2017-18"), json!(6)],
                    vec![json!("2017-18"), json!(5)],
                ],
                &[],
                DuplicatePolicy::Ignore,
            )
            .await
            .unwrap();
        let columns = vec!["SEASON".to_string(), "GAME_DATE".to_string()];
        store
            .create_and_insert(
                "game_dates",
                &columns,
                &[
                    vec![json!("2017-18"), json!("2018-01-01")],
                    vec![json!("2017-18"), json!("2018-02-04")],
                ],
                &[],
                DuplicatePolicy::Ignore,
            )
            .await
            .unwrap();
        store
    }

    fn seasons() -> Vec<String> {
        vec!["2016-17".to_string(), "2017-18".to_string()]
    }

    #[tokio::test]
    async fn resolves_flat_and_season_grouped_values() {
        let mut catalog = ParamCatalog::new(seeded_store().await, seasons(), "2017-18");

        let season = catalog.resolve(Placeholder::Season).await.unwrap().clone();
        assert_eq!(season.values(None), &[ParamValue::from("2016-17"), ParamValue::from("2017-18")]);

        let players = catalog.resolve(Placeholder::PlayerId).await.unwrap().clone();
        assert_eq!(players.values(Some("2016-17")), &[ParamValue::Int(7)]);
        assert_eq!(players.values(Some("2017-18")), &[ParamValue::Int(5), ParamValue::Int(6)]);
        assert!(players.values(Some("2015-16")).is_empty());

        let positions = catalog.resolve(Placeholder::PlayerPosition).await.unwrap();
        assert_eq!(positions.values(Some("anything")).len(), 3);
    }

    #[tokio::test]
    async fn date_to_is_the_day_before_each_game_date() {
        let mut catalog = ParamCatalog::new(seeded_store().await, seasons(), "2017-18");
        let date_to = catalog.resolve(Placeholder::DateTo).await.unwrap();
        assert_eq!(
            date_to.values(Some("2017-18")),
            &[ParamValue::from("12%2F31%2F2017"), ParamValue::from("02%2F03%2F2018")]
        );
    }

    #[tokio::test]
    async fn daily_catalog_uses_current_season_and_yesterday() {
        let today = NaiveDate::from_ymd_opt(2018, 3, 1).unwrap();
        let mut catalog = ParamCatalog::daily(seeded_store().await, "2017-18", today);

        let season = catalog.resolve(Placeholder::Season).await.unwrap().clone();
        assert_eq!(season.values(None), &[ParamValue::from("2017-18")]);
        let date_to = catalog.resolve(Placeholder::DateTo).await.unwrap();
        assert_eq!(date_to.values(Some("2017-18")), &[ParamValue::from("02%2F28%2F2018")]);
        assert!(date_to.values(Some("2016-17")).is_empty());
    }

    #[tokio::test]
    async fn resolutions_are_memoized() {
        let store = seeded_store().await;
        let mut catalog = ParamCatalog::new(store.clone(), seasons(), "2017-18");
        let first = catalog.resolve(Placeholder::PlayerId).await.unwrap().clone();

        store.execute("DROP TABLE player_ids").await.unwrap();

        let second = catalog.resolve(Placeholder::PlayerId).await.unwrap();
        assert_eq!(&first, second);
    }

    #[tokio::test]
    async fn missing_reference_table_names_the_table() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut catalog = ParamCatalog::new(store, seasons(), "2017-18");
        let err = catalog.resolve(Placeholder::GameId).await.unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::MissingReferenceTable { ref table, placeholder: Placeholder::GameId } if table == "games"
        ));
    }
}
