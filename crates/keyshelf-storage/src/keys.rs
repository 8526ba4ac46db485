//! API key repository.
//!
//! Keys are ordered per project scope; `project_id = NULL` is the unassigned
//! scope. Anything that changes a key's scope goes through [`reorder`] so
//! both scopes stay dense and the name stays unique in the target.

use chrono::Utc;
use sqlx::{Connection, SqliteConnection};

use crate::models::{ApiKey, KeyPatch, KeyStatus, NewKey};
use crate::naming::{resolve, resolve_for, validate_name};
use crate::ordering::{self, Placement, Scope};
use crate::{StorageError, projects};

/// List keys ordered by project, then position. `None` lists every key.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn list(
    conn: &mut SqliteConnection,
    project_id: Option<i64>,
) -> Result<Vec<ApiKey>, StorageError> {
    let keys = sqlx::query_as::<_, ApiKey>(
        r"SELECT * FROM api_key
          WHERE ? IS NULL OR project_id = ?
          ORDER BY project_id, position, id",
    )
    .bind(project_id)
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(keys)
}

/// List exactly one scope in position order. `None` is the unassigned
/// scope, not every key.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn list_scope(
    conn: &mut SqliteConnection,
    project_id: Option<i64>,
) -> Result<Vec<ApiKey>, StorageError> {
    let keys = sqlx::query_as::<_, ApiKey>(
        "SELECT * FROM api_key WHERE project_id IS ? ORDER BY position, id",
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(keys)
}

/// Get a key by id.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key does not exist.
pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<ApiKey, StorageError> {
    sqlx::query_as::<_, ApiKey>("SELECT * FROM api_key WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StorageError::not_found("key", id))
}

/// Insert a key at the end of its scope, resolving a taken name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] for an unusable name and
/// [`StorageError::NotFound`] if `project_id` names a missing project.
pub async fn create(conn: &mut SqliteConnection, new: &NewKey) -> Result<ApiKey, StorageError> {
    let base = validate_name(&new.name)?;
    let mut tx = conn.begin().await?;
    if let Some(project_id) = new.project_id {
        projects::ensure_exists(&mut tx, project_id).await?;
    }

    let scope = Scope::Keys(new.project_id);
    let name = resolve(&mut tx, &base, scope).await?;
    let position = ordering::next_position(&mut tx, scope, None).await?;
    let now = Utc::now();

    let key = sqlx::query_as::<_, ApiKey>(
        r#"INSERT INTO api_key
             (name, "key", encrypted, encryption_salt, description, used_with,
              project_id, position, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           RETURNING *"#,
    )
    .bind(&name)
    .bind(&new.key)
    .bind(new.encrypted)
    .bind(new.encryption_salt.as_deref())
    .bind(new.description.as_deref())
    .bind(new.used_with.as_deref())
    .bind(new.project_id)
    .bind(position)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::debug!(key_id = key.id, %scope, position, "key created");
    Ok(key)
}

/// Apply a partial update to a key's own fields.
///
/// A new name is re-resolved in the key's scope only if it differs from the
/// current one. Replacing the secret stores it as plaintext and clears the
/// encryption state.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key does not exist.
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    patch: &KeyPatch,
) -> Result<ApiKey, StorageError> {
    let mut tx = conn.begin().await?;
    let current = get(&mut tx, id).await?;

    let name = match &patch.name {
        Some(raw) => {
            let wanted = validate_name(raw)?;
            if wanted == current.name {
                current.name.clone()
            } else {
                resolve_for(&mut tx, &wanted, Scope::Keys(current.project_id), Some(id)).await?
            }
        }
        None => current.name.clone(),
    };

    let (secret, encrypted, salt) = match &patch.key {
        Some(plain) => (plain.clone(), false, None),
        None => (
            current.key.clone(),
            current.encrypted,
            current.encryption_salt.clone(),
        ),
    };
    let description = patch.description.clone().unwrap_or(current.description);
    let used_with = patch.used_with.clone().unwrap_or(current.used_with);

    let key = sqlx::query_as::<_, ApiKey>(
        r#"UPDATE api_key
           SET name = ?, "key" = ?, encrypted = ?, encryption_salt = ?,
               description = ?, used_with = ?, updated_at = ?
           WHERE id = ?
           RETURNING *"#,
    )
    .bind(&name)
    .bind(&secret)
    .bind(encrypted)
    .bind(salt)
    .bind(description)
    .bind(used_with)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::debug!(key_id = id, "key updated");
    Ok(key)
}

/// Replace a key's stored secret. `salt` present means `secret` is ciphertext.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key does not exist.
pub async fn set_secret(
    conn: &mut SqliteConnection,
    id: i64,
    secret: &str,
    salt: Option<&[u8]>,
) -> Result<ApiKey, StorageError> {
    sqlx::query_as::<_, ApiKey>(
        r#"UPDATE api_key
           SET "key" = ?, encrypted = ?, encryption_salt = ?, updated_at = ?
           WHERE id = ?
           RETURNING *"#,
    )
    .bind(secret)
    .bind(salt.is_some())
    .bind(salt)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StorageError::not_found("key", id))
}

/// Delete one key and close the gap it leaves.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key does not exist.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<ApiKey, StorageError> {
    let mut tx = conn.begin().await?;
    let key = get(&mut tx, id).await?;
    let scope = Scope::Keys(key.project_id);

    sqlx::query("DELETE FROM api_key WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    ordering::close_gap(&mut tx, scope, key.position, id).await?;
    ordering::normalize(&mut tx, scope).await?;

    tx.commit().await?;
    tracing::info!(key_id = id, %scope, "key deleted");
    Ok(key)
}

/// Delete every key in the store.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64, StorageError> {
    let deleted = sqlx::query("DELETE FROM api_key")
        .execute(&mut *conn)
        .await?
        .rows_affected();
    tracing::info!(deleted, "all keys deleted");
    Ok(deleted)
}

/// Delete every key of one project.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the project does not exist.
pub async fn delete_in_project(
    conn: &mut SqliteConnection,
    project_id: i64,
) -> Result<u64, StorageError> {
    projects::ensure_exists(conn, project_id).await?;
    let deleted = sqlx::query("DELETE FROM api_key WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    tracing::info!(project_id, deleted, "project keys deleted");
    Ok(deleted)
}

/// Count keys by encryption state, optionally for one project.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn status(
    conn: &mut SqliteConnection,
    project_id: Option<i64>,
) -> Result<KeyStatus, StorageError> {
    let (total, encrypted): (i64, i64) = sqlx::query_as(
        r"SELECT COUNT(*), COALESCE(SUM(encrypted), 0) FROM api_key
          WHERE ? IS NULL OR project_id = ?",
    )
    .bind(project_id)
    .bind(project_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(KeyStatus {
        total,
        encrypted,
        unencrypted: total - encrypted,
    })
}

/// Move a key to `new_position`, optionally in another scope.
///
/// `target` of `None` keeps the current scope; `Some(None)` targets the
/// unassigned keys. A cross-scope move always appends, and renames the key
/// if its name is taken in the target.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key or the target project does
/// not exist.
pub async fn reorder(
    conn: &mut SqliteConnection,
    id: i64,
    new_position: i64,
    target: Option<Option<i64>>,
) -> Result<ApiKey, StorageError> {
    let mut tx = conn.begin().await?;
    let key = get(&mut tx, id).await?;
    let target_project = target.unwrap_or(key.project_id);

    let rename = if target_project == key.project_id {
        None
    } else {
        if let Some(project_id) = target_project {
            projects::ensure_exists(&mut tx, project_id).await?;
        }
        let resolved = resolve(&mut tx, &key.name, Scope::Keys(target_project)).await?;
        (resolved != key.name).then_some(resolved)
    };

    let current = Placement {
        id,
        scope: Scope::Keys(key.project_id),
        position: key.position,
    };
    ordering::reorder(
        &mut tx,
        current,
        Scope::Keys(target_project),
        new_position,
        rename.as_deref(),
    )
    .await?;

    let moved = get(&mut tx, id).await?;
    tx.commit().await?;
    Ok(moved)
}

/// Move a key to the end of another project (or the unassigned scope).
/// Moving to the key's current scope returns it unchanged.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key or the target project does
/// not exist.
pub async fn relocate(
    conn: &mut SqliteConnection,
    id: i64,
    target_project: Option<i64>,
) -> Result<ApiKey, StorageError> {
    let key = get(conn, id).await?;
    if key.project_id == target_project {
        return Ok(key);
    }
    let moved = reorder(conn, id, -1, Some(target_project)).await?;
    tracing::info!(key_id = id, from = ?key.project_id, to = ?target_project, "key moved");
    Ok(moved)
}

/// Copy a key, with all fields including encryption state, to the end of
/// `target_project`. The source is untouched.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the key or the target project does
/// not exist.
pub async fn duplicate(
    conn: &mut SqliteConnection,
    id: i64,
    target_project: Option<i64>,
) -> Result<ApiKey, StorageError> {
    let source = get(conn, id).await?;
    let copy = create(
        conn,
        &NewKey {
            name: source.name,
            key: source.key,
            description: source.description,
            used_with: source.used_with,
            project_id: target_project,
            encrypted: source.encrypted,
            encryption_salt: source.encryption_salt,
        },
    )
    .await?;
    tracing::info!(key_id = id, copy_id = copy.id, to = ?target_project, "key copied");
    Ok(copy)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{new_key, store};

    async fn scope_order(conn: &mut SqliteConnection, project_id: Option<i64>) -> Vec<(String, i64)> {
        list(conn, project_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|k| k.project_id == project_id)
            .map(|k| (k.name, k.position))
            .collect()
    }

    fn pairs(items: &[(&str, i64)]) -> Vec<(String, i64)> {
        items.iter().map(|(n, p)| ((*n).to_owned(), *p)).collect()
    }

    #[tokio::test]
    async fn same_name_in_different_scopes() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let a = projects::create(&mut conn, "A").await.unwrap();
        let b = projects::create(&mut conn, "B").await.unwrap();
        assert_eq!((a.position, b.position), (0, 1));

        let xa = create(&mut conn, &new_key("X", Some(a.id))).await.unwrap();
        let xb = create(&mut conn, &new_key("X", Some(b.id))).await.unwrap();
        let xa2 = create(&mut conn, &new_key("X", Some(a.id))).await.unwrap();

        assert_eq!((xa.name.as_str(), xa.position), ("X", 0));
        assert_eq!((xb.name.as_str(), xb.position), ("X", 0));
        assert_eq!((xa2.name.as_str(), xa2.position), ("X1", 1));
    }

    #[tokio::test]
    async fn unassigned_scope_is_unique_too() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        create(&mut conn, &new_key("X", None)).await.unwrap();
        let second = create(&mut conn, &new_key("X", None)).await.unwrap();
        assert_eq!(second.name, "X1");

        // The index itself rejects a duplicate that bypasses the resolver.
        let raw = sqlx::query(
            r#"INSERT INTO api_key (name, "key", created_at, updated_at)
               VALUES ('X', 'v', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')"#,
        )
        .execute(&mut *conn)
        .await;
        assert!(matches!(
            raw.map_err(StorageError::from),
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn create_in_missing_project_is_not_found() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let err = create(&mut conn, &new_key("X", Some(9))).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "project", .. }));
    }

    #[tokio::test]
    async fn forward_move_shifts_others_back() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let k0 = create(&mut conn, &new_key("k0", None)).await.unwrap();
        create(&mut conn, &new_key("k1", None)).await.unwrap();
        create(&mut conn, &new_key("k2", None)).await.unwrap();

        let moved = reorder(&mut conn, k0.id, 2, None).await.unwrap();
        assert_eq!(moved.position, 2);
        assert_eq!(
            scope_order(&mut conn, None).await,
            pairs(&[("k1", 0), ("k2", 1), ("k0", 2)])
        );
    }

    #[tokio::test]
    async fn backward_move_shifts_others_forward() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        create(&mut conn, &new_key("k0", None)).await.unwrap();
        create(&mut conn, &new_key("k1", None)).await.unwrap();
        let k2 = create(&mut conn, &new_key("k2", None)).await.unwrap();

        reorder(&mut conn, k2.id, 0, None).await.unwrap();
        assert_eq!(
            scope_order(&mut conn, None).await,
            pairs(&[("k2", 0), ("k0", 1), ("k1", 2)])
        );
    }

    #[tokio::test]
    async fn reorder_to_same_position_is_idempotent() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        create(&mut conn, &new_key("k0", None)).await.unwrap();
        let k1 = create(&mut conn, &new_key("k1", None)).await.unwrap();
        create(&mut conn, &new_key("k2", None)).await.unwrap();

        let before = scope_order(&mut conn, None).await;
        reorder(&mut conn, k1.id, 1, None).await.unwrap();
        reorder(&mut conn, k1.id, 1, None).await.unwrap();
        assert_eq!(scope_order(&mut conn, None).await, before);
    }

    #[tokio::test]
    async fn move_between_projects_renumbers_both_scopes() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let a = projects::create(&mut conn, "A").await.unwrap();
        let b = projects::create(&mut conn, "B").await.unwrap();
        let a0 = create(&mut conn, &new_key("a0", Some(a.id))).await.unwrap();
        create(&mut conn, &new_key("a1", Some(a.id))).await.unwrap();
        create(&mut conn, &new_key("a2", Some(a.id))).await.unwrap();
        create(&mut conn, &new_key("b0", Some(b.id))).await.unwrap();
        create(&mut conn, &new_key("b1", Some(b.id))).await.unwrap();

        let moved = reorder(&mut conn, a0.id, 0, Some(Some(b.id))).await.unwrap();
        assert_eq!((moved.project_id, moved.position), (Some(b.id), 2));
        assert_eq!(
            scope_order(&mut conn, Some(a.id)).await,
            pairs(&[("a1", 0), ("a2", 1)])
        );
        assert_eq!(
            scope_order(&mut conn, Some(b.id)).await,
            pairs(&[("b0", 0), ("b1", 1), ("a0", 2)])
        );
    }

    #[tokio::test]
    async fn reorder_into_missing_project_rolls_back() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let k = create(&mut conn, &new_key("k", None)).await.unwrap();

        let err = reorder(&mut conn, k.id, 0, Some(Some(77))).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(get(&mut conn, k.id).await.unwrap(), k);
    }

    #[tokio::test]
    async fn relocate_resolves_name_in_target() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let a = projects::create(&mut conn, "A").await.unwrap();
        let loose = create(&mut conn, &new_key("TOKEN", None)).await.unwrap();
        create(&mut conn, &new_key("TOKEN", Some(a.id))).await.unwrap();

        let moved = relocate(&mut conn, loose.id, Some(a.id)).await.unwrap();
        assert_eq!(moved.name, "TOKEN1");
        assert_eq!(moved.position, 1);

        let again = relocate(&mut conn, loose.id, Some(a.id)).await.unwrap();
        assert_eq!(again, moved);
    }

    #[tokio::test]
    async fn duplicate_keeps_source_and_encryption_state() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let a = projects::create(&mut conn, "A").await.unwrap();
        let source = create(
            &mut conn,
            &NewKey {
                encrypted: true,
                encryption_salt: Some(vec![7; 16]),
                description: Some("prod".to_owned()),
                ..new_key("TOKEN", None)
            },
        )
        .await
        .unwrap();

        let copy = duplicate(&mut conn, source.id, Some(a.id)).await.unwrap();
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.project_id, Some(a.id));
        assert!(copy.encrypted);
        assert_eq!(copy.encryption_salt, source.encryption_salt);
        assert_eq!(copy.key, source.key);
        assert_eq!(copy.description.as_deref(), Some("prod"));

        let second = duplicate(&mut conn, source.id, None).await.unwrap();
        assert_eq!(second.name, "TOKEN1");
        assert_eq!(get(&mut conn, source.id).await.unwrap(), source);
    }

    #[tokio::test]
    async fn update_patches_only_present_fields() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let key = create(
            &mut conn,
            &NewKey {
                description: Some("old".to_owned()),
                used_with: Some("ci".to_owned()),
                ..new_key("TOKEN", None)
            },
        )
        .await
        .unwrap();
        create(&mut conn, &new_key("OTHER", None)).await.unwrap();

        let patched = update(
            &mut conn,
            key.id,
            &KeyPatch {
                description: Some(None),
                ..KeyPatch::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(patched.name, "TOKEN");
        assert_eq!(patched.description, None);
        assert_eq!(patched.used_with.as_deref(), Some("ci"));

        let renamed = update(
            &mut conn,
            key.id,
            &KeyPatch {
                name: Some("OTHER".to_owned()),
                ..KeyPatch::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "OTHER1");
        assert_eq!(renamed.position, key.position);
    }

    #[tokio::test]
    async fn rename_back_to_free_base_keeps_it() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        create(&mut conn, &new_key("X", None)).await.unwrap();
        let second = create(&mut conn, &new_key("X", None)).await.unwrap();
        assert_eq!(second.name, "X1");

        let patch = KeyPatch {
            name: Some("X1".to_owned()),
            ..KeyPatch::default()
        };
        assert_eq!(update(&mut conn, second.id, &patch).await.unwrap().name, "X1");

        let patch = KeyPatch {
            name: Some("X".to_owned()),
            ..KeyPatch::default()
        };
        assert_eq!(update(&mut conn, second.id, &patch).await.unwrap().name, "X1");
    }

    #[tokio::test]
    async fn list_scope_separates_unassigned_keys() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let p = projects::create(&mut conn, "web").await.unwrap();
        create(&mut conn, &new_key("IN_PROJECT", Some(p.id))).await.unwrap();
        create(&mut conn, &new_key("LOOSE", None)).await.unwrap();

        let loose: Vec<_> = list_scope(&mut conn, None)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(loose, vec!["LOOSE"]);
        assert_eq!(list(&mut conn, None).await.unwrap().len(), 2);
        assert_eq!(list_scope(&mut conn, Some(p.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_secret_clears_encryption() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let key = create(&mut conn, &new_key("TOKEN", None)).await.unwrap();
        let sealed = set_secret(&mut conn, key.id, "Y2lwaGVy", Some([1_u8; 16].as_slice())).await.unwrap();
        assert!(sealed.encrypted);

        let replaced = update(
            &mut conn,
            key.id,
            &KeyPatch {
                key: Some("plain".to_owned()),
                ..KeyPatch::default()
            },
        )
        .await
        .unwrap();
        assert!(!replaced.encrypted);
        assert_eq!(replaced.encryption_salt, None);
        assert_eq!(replaced.key, "plain");
    }

    #[tokio::test]
    async fn delete_closes_gap_and_counts() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let a = projects::create(&mut conn, "A").await.unwrap();
        create(&mut conn, &new_key("k0", None)).await.unwrap();
        let k1 = create(&mut conn, &new_key("k1", None)).await.unwrap();
        create(&mut conn, &new_key("k2", None)).await.unwrap();
        create(&mut conn, &new_key("p0", Some(a.id))).await.unwrap();
        create(&mut conn, &new_key("p1", Some(a.id))).await.unwrap();

        delete(&mut conn, k1.id).await.unwrap();
        assert_eq!(
            scope_order(&mut conn, None).await,
            pairs(&[("k0", 0), ("k2", 1)])
        );
        assert!(matches!(
            get(&mut conn, k1.id).await,
            Err(StorageError::NotFound { .. })
        ));

        assert_eq!(delete_in_project(&mut conn, a.id).await.unwrap(), 2);
        assert_eq!(delete_all(&mut conn).await.unwrap(), 2);
        assert_eq!(status(&mut conn, None).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn status_counts_by_encryption_state() {
        let store = store().await;
        let mut conn = store.acquire().await.unwrap();
        let a = projects::create(&mut conn, "A").await.unwrap();
        let k = create(&mut conn, &new_key("k", Some(a.id))).await.unwrap();
        create(&mut conn, &new_key("j", Some(a.id))).await.unwrap();
        create(&mut conn, &new_key("loose", None)).await.unwrap();
        set_secret(&mut conn, k.id, "c2VhbGVk", Some([3_u8; 16].as_slice())).await.unwrap();

        let all = status(&mut conn, None).await.unwrap();
        assert_eq!((all.total, all.encrypted, all.unencrypted), (3, 1, 2));
        let scoped = status(&mut conn, Some(a.id)).await.unwrap();
        assert_eq!((scoped.total, scoped.encrypted, scoped.unencrypted), (2, 1, 1));
    }
}
