//! Free-text city resolution.
//!
//! Exact alias match wins; otherwise the shortest matching alias prefix
//! decides. Input shorter than two characters is never matched so a lone
//! letter cannot select a city.

use crate::models::City;
use crate::storage::{Repository, StorageError};

/// Minimum input length for a prefix match.
const MIN_PREFIX_LEN: usize = 2;

/// Outcome of resolving a user-typed city name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One city matched.
    Found(City),
    /// Nothing matched, or the input was too short.
    NotFound,
}

/// Resolves `input` to a city, exact match before prefix.
///
/// # Errors
///
/// Propagates storage errors; "no match" is not an error.
pub async fn resolve_city(
    repo: &dyn Repository,
    input: &str,
) -> Result<Resolution, StorageError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Resolution::NotFound);
    }

    if let Some(city) = repo.find_city_by_alias(trimmed).await? {
        return Ok(Resolution::Found(city));
    }

    if trimmed.chars().count() < MIN_PREFIX_LEN {
        return Ok(Resolution::NotFound);
    }

    let candidates = repo.find_cities_by_prefix(trimmed, 1).await?;
    Ok(candidates
        .into_iter()
        .next()
        .map_or(Resolution::NotFound, Resolution::Found))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::storage::MockRepository;
    use mockall::predicate::eq;

    fn kyiv() -> City {
        City {
            code: "kyiv".to_string(),
            name_uk: "Київ".to_string(),
            channel_url: Some("https://t.me/orenda_kyiv".to_string()),
        }
    }

    #[tokio::test]
    async fn test_exact_match_skips_prefix_lookup() {
        let mut repo = MockRepository::new();
        repo.expect_find_city_by_alias()
            .with(eq("Київ"))
            .times(1)
            .returning(|_| Ok(Some(kyiv())));
        repo.expect_find_cities_by_prefix().times(0);

        let resolution = resolve_city(&repo, "  Київ  ").await.unwrap();
        assert_eq!(resolution, Resolution::Found(kyiv()));
    }

    #[tokio::test]
    async fn test_falls_back_to_prefix() {
        let mut repo = MockRepository::new();
        repo.expect_find_city_by_alias().returning(|_| Ok(None));
        repo.expect_find_cities_by_prefix()
            .with(eq("киї"), eq(1))
            .times(1)
            .returning(|_, _| Ok(vec![kyiv()]));

        let resolution = resolve_city(&repo, "киї").await.unwrap();
        assert_eq!(resolution, Resolution::Found(kyiv()));
    }

    #[tokio::test]
    async fn test_short_input_never_prefix_matches() {
        let mut repo = MockRepository::new();
        repo.expect_find_city_by_alias().returning(|_| Ok(None));
        repo.expect_find_cities_by_prefix().times(0);

        assert_eq!(resolve_city(&repo, "к").await.unwrap(), Resolution::NotFound);
        assert_eq!(resolve_city(&repo, "   ").await.unwrap(), Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_city() {
        let mut repo = MockRepository::new();
        repo.expect_find_city_by_alias().returning(|_| Ok(None));
        repo.expect_find_cities_by_prefix().returning(|_, _| Ok(vec![]));

        assert_eq!(
            resolve_city(&repo, "житомир").await.unwrap(),
            Resolution::NotFound
        );
    }
}
