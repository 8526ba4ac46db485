//! Table definitions.
//!
//! Positions carry no unique constraint: the ordering engine may hold
//! duplicates inside a transaction and repairs them before commit. The key
//! name index folds NULL project ids into one scope, which a plain
//! `UNIQUE(name, project_id)` would not do in SQLite.

pub(crate) const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS project (
    id          INTEGER PRIMARY KEY,
    name        TEXT    NOT NULL UNIQUE,
    position    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS api_key (
    id               INTEGER PRIMARY KEY,
    name             TEXT    NOT NULL,
    "key"            TEXT    NOT NULL,
    encrypted        INTEGER NOT NULL DEFAULT 0,
    encryption_salt  BLOB,
    description      TEXT,
    used_with        TEXT,
    project_id       INTEGER REFERENCES project (id) ON DELETE SET NULL,
    position         INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT    NOT NULL,
    updated_at       TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_api_key_scope_name
    ON api_key (name, IFNULL(project_id, -1));

CREATE INDEX IF NOT EXISTS idx_api_key_scope_position
    ON api_key (project_id, position);

CREATE INDEX IF NOT EXISTS idx_project_position
    ON project (position);
"#;

/// Tables an uploaded database must contain to be importable.
pub(crate) const REQUIRED_TABLES: [&str; 2] = ["project", "api_key"];
