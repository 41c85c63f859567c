use statscrape_core::{ConcreteRequest, ParamValue, Placeholder, ScrapeError, Substitution, Template};

use crate::catalog::ParamCatalog;

/// One placeholder and the values it ranges over.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Axis {
    placeholder: Placeholder,
    values: Vec<ParamValue>,
}

/// Requests sharing a fixed prefix (the season, when present), produced as
/// the Cartesian product of `axes` with the last axis varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
    fixed: Substitution,
    axes: Vec<Axis>,
}

impl Group {
    fn len(&self) -> usize {
        self.axes.iter().map(|axis| axis.values.len()).product()
    }

    fn substitutions(&self) -> impl Iterator<Item = Substitution> + '_ {
        Odometer::new(self.axes.iter().map(|axis| axis.values.len()).collect()).map(
            move |positions| {
                let mut substitution = self.fixed.clone();
                for (axis, &i) in self.axes.iter().zip(&positions) {
                    substitution.insert(axis.placeholder, axis.values[i].clone());
                }
                substitution
            },
        )
    }
}

/// Mixed-radix counter over axis lengths. Yields nothing if any axis is
/// empty and exactly one empty position when there are no axes.
#[derive(Debug)]
struct Odometer {
    lens: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Odometer {
    fn new(lens: Vec<usize>) -> Self {
        let next = lens.iter().all(|&len| len > 0).then(|| vec![0; lens.len()]);
        Self { lens, next }
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut advanced = current.clone();
        for i in (0..advanced.len()).rev() {
            advanced[i] += 1;
            if advanced[i] < self.lens[i] {
                self.next = Some(advanced);
                return Some(current);
            }
            advanced[i] = 0;
        }
        Some(current)
    }
}

/// The full set of concrete requests for one template, rendered lazily.
#[derive(Debug, Clone)]
pub struct Expansion {
    template: Template,
    groups: Vec<Group>,
}

impl Expansion {
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Number of requests `requests()` will yield.
    pub fn len(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Season-major, then dependent values, then independent values.
    pub fn requests(&self) -> impl Iterator<Item = Result<ConcreteRequest, ScrapeError>> + '_ {
        self.groups
            .iter()
            .flat_map(Group::substitutions)
            .map(move |substitution| {
                let url = self.template.render(&substitution)?;
                Ok(ConcreteRequest::new(url, substitution))
            })
    }
}

/// Resolves every placeholder in `template` and lays out its expansion.
///
/// Fails with `MissingSeason` before touching the catalog when a
/// season-dependent placeholder appears without `{SEASON}`.
pub async fn expand(catalog: &mut ParamCatalog, template: &Template) -> Result<Expansion, ScrapeError> {
    template.check_season()?;
    let placeholders = template.placeholders();
    let has_season = template.contains(Placeholder::Season);

    let mut independent = Vec::new();
    for &placeholder in placeholders.iter().filter(|p| p.is_independent()) {
        let values = catalog.resolve(placeholder).await?.values(None).to_vec();
        independent.push(Axis { placeholder, values });
    }

    if !has_season {
        return Ok(Expansion {
            template: template.clone(),
            groups: vec![Group {
                fixed: Substitution::new(),
                axes: independent,
            }],
        });
    }

    let seasons = catalog.resolve(Placeholder::Season).await?.values(None).to_vec();
    let dependents: Vec<Placeholder> = placeholders
        .iter()
        .copied()
        .filter(|p| p.is_season_dependent())
        .collect();

    let mut groups = Vec::with_capacity(seasons.len());
    for season in seasons {
        let mut axes = Vec::with_capacity(dependents.len() + independent.len());
        for &placeholder in &dependents {
            let values = catalog
                .resolve(placeholder)
                .await?
                .values(season.as_text())
                .to_vec();
            axes.push(Axis { placeholder, values });
        }
        axes.extend(independent.iter().cloned());

        let mut fixed = Substitution::new();
        fixed.insert(Placeholder::Season, season);
        groups.push(Group { fixed, axes });
    }

    Ok(Expansion {
        template: template.clone(),
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statscrape_core::DuplicatePolicy;
    use statscrape_storage::SqliteStore;

    async fn catalog_with_players(rows: &[(&str, i64)], seasons: &[&str]) -> ParamCatalog {
        let store = SqliteStore::in_memory().await.unwrap();
        let rows: Vec<_> = rows
            .iter()
            .map(|(season, id)| vec![json!(season), json!(id)])
            .collect();
        store
            .create_and_insert(
                "player_ids",
                &["SEASON".to_string(), "PLAYER_ID".to_string()],
                &rows,
                &[],
                DuplicatePolicy::Ignore,
            )
            .await
            .unwrap();
        ParamCatalog::new(
            store,
            seasons.iter().map(|s| s.to_string()).collect(),
            "2017-18",
        )
    }

    fn urls(expansion: &Expansion) -> Vec<String> {
        expansion.requests().map(|r| r.unwrap().url).collect()
    }

    #[tokio::test]
    async fn season_and_player_scenario() {
        let mut catalog =
            catalog_with_players(&[("2016-17", 1), ("2016-17", 2), ("2017-18", 3)], &["2016-17", "2017-18"])
                .await;
        let template = Template::parse("https://stats.test/x?Season={SEASON}&PlayerID={PLAYER_ID}").unwrap();

        let expansion = expand(&mut catalog, &template).await.unwrap();

        assert_eq!(expansion.len(), 3);
        assert_eq!(
            urls(&expansion),
            vec![
                "https://stats.test/x?Season=2016-17&PlayerID=1",
                "https://stats.test/x?Season=2016-17&PlayerID=2",
                "https://stats.test/x?Season=2017-18&PlayerID=3",
            ]
        );
        let mappings: Vec<String> = expansion
            .requests()
            .map(|r| r.unwrap().substitution.to_string())
            .collect();
        assert_eq!(
            mappings,
            vec![
                "{SEASON: 2016-17, PLAYER_ID: 1}",
                "{SEASON: 2016-17, PLAYER_ID: 2}",
                "{SEASON: 2017-18, PLAYER_ID: 3}",
            ]
        );
    }

    #[tokio::test]
    async fn count_is_sum_over_seasons_of_product_of_axes() {
        let mut catalog = catalog_with_players(
            &[("2015-16", 1), ("2015-16", 2), ("2017-18", 3)],
            &["2015-16", "2016-17", "2017-18"],
        )
        .await;
        let template =
            Template::parse("https://stats.test/x?Season={SEASON}&PlayerID={PLAYER_ID}&Pos={PLAYER_POSITION}")
                .unwrap();

        let expansion = expand(&mut catalog, &template).await.unwrap();

        // 2 * 3 + 0 * 3 + 1 * 3
        assert_eq!(expansion.len(), 9);
        let urls = urls(&expansion);
        assert_eq!(urls.len(), 9);
        assert_eq!(urls[0], "https://stats.test/x?Season=2015-16&PlayerID=1&Pos=G");
        assert_eq!(urls[1], "https://stats.test/x?Season=2015-16&PlayerID=1&Pos=F");
        assert_eq!(urls[3], "https://stats.test/x?Season=2015-16&PlayerID=2&Pos=G");
        assert_eq!(urls[8], "https://stats.test/x?Season=2017-18&PlayerID=3&Pos=C");
    }

    #[tokio::test]
    async fn dependent_without_season_fails_before_resolving() {
        // No player_ids table: resolving would fail differently.
        let store = SqliteStore::in_memory().await.unwrap();
        let mut catalog = ParamCatalog::new(store, vec!["2017-18".to_string()], "2017-18");
        let template = Template::parse("https://stats.test/x?PlayerID={PLAYER_ID}").unwrap();

        let err = expand(&mut catalog, &template).await.unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::MissingSeason { placeholder: Placeholder::PlayerId }
        ));
    }

    #[tokio::test]
    async fn template_without_placeholders_yields_one_request() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut catalog = ParamCatalog::new(store, vec![], "2017-18");
        let template = Template::parse("https://stats.test/commonteamyears?LeagueID=00").unwrap();

        let expansion = expand(&mut catalog, &template).await.unwrap();
        assert_eq!(urls(&expansion), vec!["https://stats.test/commonteamyears?LeagueID=00"]);
    }

    #[tokio::test]
    async fn independent_only_template_crosses_positions() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut catalog = ParamCatalog::new(store, vec![], "2017-18");
        let template = Template::parse("https://stats.test/x?Pos={PLAYER_POSITION}").unwrap();

        let expansion = expand(&mut catalog, &template).await.unwrap();
        assert_eq!(
            urls(&expansion),
            vec![
                "https://stats.test/x?Pos=G",
                "https://stats.test/x?Pos=F",
                "https://stats.test/x?Pos=C",
            ]
        );
    }

    #[test]
    fn odometer_edge_cases() {
        assert_eq!(Odometer::new(vec![]).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
        assert_eq!(Odometer::new(vec![2, 0]).count(), 0);
        assert_eq!(
            Odometer::new(vec![2, 2]).collect::<Vec<_>>(),
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
    }
}
