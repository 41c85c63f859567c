use std::fmt;

use crate::{Placeholder, ScrapeError, Substitution};

/// One piece of a parsed endpoint template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Slot(Placeholder),
}

/// An endpoint template parsed once into literal segments and placeholder
/// slots. `{NAME}` with an upper-case identifier is a slot and must belong to
/// the vocabulary; any other brace stays literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ScrapeError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let slot_name = after
                .find('}')
                .map(|close| &after[..close])
                .filter(|inner| is_slot_name(inner));

            match slot_name {
                Some(name) => {
                    let placeholder = Placeholder::from_name(name).ok_or_else(|| {
                        ScrapeError::UnsupportedPlaceholder {
                            name: name.to_string(),
                        }
                    })?;
                    literal.push_str(&rest[..open]);
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Slot(placeholder));
                    rest = &after[name.len() + 1..];
                }
                None => {
                    literal.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Slot(p) if *p == placeholder))
    }

    /// Distinct placeholders present, in vocabulary order.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        Placeholder::ALL
            .into_iter()
            .filter(|p| self.contains(*p))
            .collect()
    }

    /// Fails with `MissingSeason` when a season-dependent placeholder
    /// appears without `{SEASON}`.
    pub fn check_season(&self) -> Result<(), ScrapeError> {
        if self.contains(Placeholder::Season) {
            return Ok(());
        }
        match self.placeholders().into_iter().find(|p| p.is_season_dependent()) {
            Some(placeholder) => Err(ScrapeError::MissingSeason { placeholder }),
            None => Ok(()),
        }
    }

    pub fn render(&self, substitution: &Substitution) -> Result<String, ScrapeError> {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Slot(placeholder) => {
                    let value = substitution.get(*placeholder).ok_or_else(|| {
                        ScrapeError::UnresolvedPlaceholder {
                            placeholder: *placeholder,
                            template: self.source.clone(),
                        }
                    })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_slot_name(inner: &str) -> bool {
    inner.starts_with(|c: char| c.is_ascii_uppercase())
        && inner
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamValue;

    const PLAYER_LOG: &str =
        "https://stats.test/playergamelog?LeagueID=00&PlayerID={PLAYER_ID}&Season={SEASON}&DateFrom=";

    #[test]
    fn parses_slots_and_literals() {
        let template = Template::parse(PLAYER_LOG).unwrap();
        assert_eq!(
            template.tokens(),
            &[
                Token::Literal("https://stats.test/playergamelog?LeagueID=00&PlayerID=".into()),
                Token::Slot(Placeholder::PlayerId),
                Token::Literal("&Season=".into()),
                Token::Slot(Placeholder::Season),
                Token::Literal("&DateFrom=".into()),
            ]
        );
        assert_eq!(
            template.placeholders(),
            vec![Placeholder::Season, Placeholder::PlayerId]
        );
    }

    #[test]
    fn renders_like_plain_substitution() {
        let template = Template::parse(PLAYER_LOG).unwrap();
        let sub: Substitution = [
            (Placeholder::Season, ParamValue::from("2017-18")),
            (Placeholder::PlayerId, ParamValue::from(201939)),
        ]
        .into_iter()
        .collect();

        let expected = PLAYER_LOG
            .replace("{PLAYER_ID}", "201939")
            .replace("{SEASON}", "2017-18");
        assert_eq!(template.render(&sub).unwrap(), expected);
    }

    #[test]
    fn non_identifier_braces_stay_literal() {
        let template = Template::parse("https://x.test/q?f={lower}&j={}&s={SEASON}").unwrap();
        assert_eq!(template.placeholders(), vec![Placeholder::Season]);
        let sub: Substitution = [(Placeholder::Season, ParamValue::from("2015-16"))]
            .into_iter()
            .collect();
        assert_eq!(
            template.render(&sub).unwrap(),
            "https://x.test/q?f={lower}&j={}&s=2015-16"
        );
    }

    #[test]
    fn unknown_upper_case_slot_is_rejected_at_parse() {
        let err = Template::parse("https://x.test/q?TeamID={TEAM_ID}").unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedPlaceholder { .. }));
    }

    #[test]
    fn missing_substitution_fails_loudly() {
        let template = Template::parse(PLAYER_LOG).unwrap();
        let sub: Substitution = [(Placeholder::Season, ParamValue::from("2017-18"))]
            .into_iter()
            .collect();
        let err = template.render(&sub).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::UnresolvedPlaceholder {
                placeholder: Placeholder::PlayerId,
                ..
            }
        ));
    }

    #[test]
    fn template_without_slots_is_single_literal() {
        let template = Template::parse("https://x.test/static").unwrap();
        assert!(template.placeholders().is_empty());
        assert_eq!(template.render(&Substitution::new()).unwrap(), "https://x.test/static");
    }

    #[test]
    fn season_dependent_slot_requires_season() {
        assert!(Template::parse(PLAYER_LOG).unwrap().check_season().is_ok());
        let err = Template::parse("https://x.test/q?PlayerID={PLAYER_ID}&Pos={PLAYER_POSITION}")
            .unwrap()
            .check_season()
            .unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::MissingSeason { placeholder: Placeholder::PlayerId }
        ));
    }
}
