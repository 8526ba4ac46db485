//! Name uniqueness resolver.
//!
//! Names are unique per scope. A taken name is never an error on create:
//! the resolver probes `name`, `name1`, `name2`, ... and hands back the first
//! free candidate. It must run on the same transaction as the write it
//! serves, otherwise two writers can pick the same candidate.

use sqlx::{Row, SqliteConnection};

use crate::StorageError;
use crate::ordering::{Scope, scoped};

/// Longest accepted key or project name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Trim `raw` and check it is a usable name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] if the trimmed name is empty or
/// longer than [`MAX_NAME_LEN`] characters.
pub fn validate_name(raw: &str) -> Result<String, StorageError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StorageError::InvalidName {
            reason: "name must not be empty".to_owned(),
        });
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(StorageError::InvalidName {
            reason: format!("name must be at most {MAX_NAME_LEN} characters"),
        });
    }
    Ok(name.to_owned())
}

async fn is_taken(
    conn: &mut SqliteConnection,
    scope: Scope,
    name: &str,
    exclude: Option<i64>,
) -> Result<bool, StorageError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} AND name = ? AND id IS NOT ?)",
        scope.table(),
        scope.predicate(),
    );
    let row = scoped(&sql, scope)
        .bind(name)
        .bind(exclude)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.try_get::<bool, _>(0)?)
}

/// `base` followed by `suffix`, with `base` cut short so the result stays
/// within [`MAX_NAME_LEN`] characters.
#[must_use]
pub fn suffixed(base: &str, suffix: u64) -> String {
    let digits = suffix.to_string();
    let keep = MAX_NAME_LEN.saturating_sub(digits.len());
    let mut name: String = base.chars().take(keep).collect();
    name.push_str(&digits);
    name
}

/// First free name in `scope` derived from `base`.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn resolve(
    conn: &mut SqliteConnection,
    base: &str,
    scope: Scope,
) -> Result<String, StorageError> {
    resolve_for(conn, base, scope, None).await
}

/// Like [`resolve`], but the entity `id` does not count as holding its own
/// current name, so renaming back to a free base keeps it unsuffixed.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn resolve_for(
    conn: &mut SqliteConnection,
    base: &str,
    scope: Scope,
    id: Option<i64>,
) -> Result<String, StorageError> {
    if !is_taken(conn, scope, base, id).await? {
        return Ok(base.to_owned());
    }

    let mut suffix = 1_u64;
    loop {
        let candidate = suffixed(base, suffix);
        if !is_taken(conn, scope, &candidate, id).await? {
            tracing::debug!(%scope, base, resolved = %candidate, "name taken, suffix applied");
            return Ok(candidate);
        }
        suffix += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{new_key, store};
    use crate::{keys, projects};

    #[test]
    fn validate_trims_and_bounds() {
        assert_eq!(validate_name("  API_TOKEN \n").unwrap(), "API_TOKEN");
        assert!(matches!(
            validate_name("   "),
            Err(StorageError::InvalidName { .. })
        ));
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        // Counted in characters, not bytes.
        assert!(validate_name(&"é".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[tokio::test]
    async fn free_name_is_returned_unchanged() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        assert_eq!(
            resolve(&mut conn, "TOKEN", Scope::Keys(None)).await.unwrap(),
            "TOKEN"
        );
    }

    #[tokio::test]
    async fn taken_names_get_the_next_free_suffix() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        keys::create(&mut conn, &new_key("TOKEN", None)).await.unwrap();
        keys::create(&mut conn, &new_key("TOKEN1", None)).await.unwrap();

        assert_eq!(
            resolve(&mut conn, "TOKEN", Scope::Keys(None)).await.unwrap(),
            "TOKEN2"
        );
    }

    #[tokio::test]
    async fn suffix_never_exceeds_the_length_bound() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let long = "L".repeat(MAX_NAME_LEN);
        keys::create(&mut conn, &new_key(&long, None)).await.unwrap();

        let resolved = resolve(&mut conn, &long, Scope::Keys(None)).await.unwrap();
        assert_eq!(resolved.chars().count(), MAX_NAME_LEN);
        assert!(resolved.ends_with('1'));
        assert!(validate_name(&resolved).is_ok());

        let created = keys::create(&mut conn, &new_key(&long, None)).await.unwrap();
        assert_eq!(created.name, resolved);
    }

    #[test]
    fn suffixed_cuts_on_characters() {
        assert_eq!(suffixed("TOKEN", 12), "TOKEN12");
        let name = suffixed(&"é".repeat(MAX_NAME_LEN), 7);
        assert_eq!(name.chars().count(), MAX_NAME_LEN);
        assert!(name.ends_with("é7"));
    }

    #[tokio::test]
    async fn own_name_does_not_count_as_taken() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let key = keys::create(&mut conn, &new_key("TOKEN", None)).await.unwrap();

        assert_eq!(
            resolve_for(&mut conn, "TOKEN", Scope::Keys(None), Some(key.id))
                .await
                .unwrap(),
            "TOKEN"
        );
        assert_eq!(
            resolve(&mut conn, "TOKEN", Scope::Keys(None)).await.unwrap(),
            "TOKEN1"
        );
    }

    #[tokio::test]
    async fn scopes_do_not_collide() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let p = projects::create(&mut conn, "alpha").await.unwrap();
        keys::create(&mut conn, &new_key("TOKEN", None)).await.unwrap();

        assert_eq!(
            resolve(&mut conn, "TOKEN", Scope::Keys(Some(p.id))).await.unwrap(),
            "TOKEN"
        );
        assert_eq!(
            resolve(&mut conn, "alpha", Scope::Projects).await.unwrap(),
            "alpha1"
        );
    }
}
