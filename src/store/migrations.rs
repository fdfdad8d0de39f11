//! Database migrations for the durable signature store (spec.md §4.7 schema).

/// A single versioned schema migration, applied in order exactly once.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial signature + effectiveness schema",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Secondary indices on perceptual_hash, confidence, last_seen, content_type",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "first_seen, mime_type, and signals_json columns",
        up: MIGRATION_V3_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS signatures (
    content_hash TEXT PRIMARY KEY,
    perceptual_hash INTEGER NOT NULL,
    content_type TEXT,
    confidence REAL NOT NULL DEFAULT 0.5,
    caption TEXT,
    is_complete INTEGER NOT NULL DEFAULT 0,
    observation_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS discriminator_effectiveness (
    signal_name TEXT NOT NULL,
    image_type TEXT NOT NULL,
    goal TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    prior_evaluations INTEGER NOT NULL DEFAULT 0,
    last_evaluated_at TEXT NOT NULL,
    PRIMARY KEY (signal_name, image_type, goal)
);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_signatures_perceptual_hash ON signatures(perceptual_hash);
CREATE INDEX IF NOT EXISTS idx_signatures_confidence ON signatures(confidence);
CREATE INDEX IF NOT EXISTS idx_signatures_last_seen ON signatures(last_seen);
CREATE INDEX IF NOT EXISTS idx_signatures_content_type ON signatures(content_type);
"#;

const MIGRATION_V3_UP: &str = r#"
ALTER TABLE signatures ADD COLUMN first_seen TEXT;
ALTER TABLE signatures ADD COLUMN mime_type TEXT;
ALTER TABLE signatures ADD COLUMN signals_json TEXT;
UPDATE signatures SET first_seen = created_at WHERE first_seen IS NULL;
"#;

/// Apply every migration after `current_version`, in order, updating
/// `user_version` as we go.
pub fn apply(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let current_version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        conn.execute_batch(migration.up)?;
        conn.pragma_update(None, "user_version", migration.version)?;
        tracing::info!(version = migration.version, description = migration.description, "applied migration");
    }
    Ok(())
}
