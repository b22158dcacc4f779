//! Database schema and migrations for filebox.
//!
//! Migrations are applied in order when the database is opened; the
//! `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users with storage ledger columns
    r#"
CREATE TABLE users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email           TEXT NOT NULL,
    name            TEXT NOT NULL,
    storage_used    INTEGER NOT NULL DEFAULT 0,
    storage_limit   INTEGER NOT NULL DEFAULT 1073741824,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX idx_users_email_nocase ON users(email COLLATE NOCASE);
"#,
    // v2: folder hierarchy
    r#"
CREATE TABLE folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER NOT NULL REFERENCES users(id),
    parent_id   INTEGER REFERENCES folders(id),
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_folders_owner_parent ON folders(owner_id, parent_id);
"#,
    // v3: file records
    r#"
CREATE TABLE files (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER NOT NULL REFERENCES users(id),
    folder_id   INTEGER REFERENCES folders(id),
    filename    TEXT NOT NULL,
    path        TEXT NOT NULL UNIQUE,       -- blob store key
    size        INTEGER NOT NULL CHECK (size >= 0),
    mimetype    TEXT NOT NULL,
    is_public   INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_files_owner_folder ON files(owner_id, folder_id);
"#,
    // v4: sharing grants
    r#"
CREATE TABLE file_shares (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    user_id     INTEGER NOT NULL REFERENCES users(id),
    permission  TEXT NOT NULL DEFAULT 'read',  -- 'read' or 'edit'
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(file_id, user_id)
);

CREATE INDEX idx_file_shares_user_id ON file_shares(user_id);
"#,
];
