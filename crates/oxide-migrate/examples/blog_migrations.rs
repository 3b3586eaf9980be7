//! Example: Blog Application Migrations
//!
//! Evolves the schema of a small blog through three revisions against an
//! in-memory SQLite database, then previews the same change for PostgreSQL.
//!
//! Run with: cargo run --example blog_migrations -p oxide-migrate

use oxide_migrate::prelude::*;
use oxide_schema::{
    ColumnDefinition, DefaultValue, EnumDefinition, ForeignKeyAction, IndexDefinition,
    PostgresDialect, SchemaDefinition, SqliteDialect, TableDefinition,
};
use sqlx::any::AnyPoolOptions;

// =============================================================================
// Schema Revisions
// =============================================================================

fn users() -> TableDefinition {
    TableDefinition::new("users")
        .column(ColumnDefinition::new("id", "bigint").primary_key())
        .column(ColumnDefinition::new("username", "varchar").params(&[100]).not_null().unique())
        .column(ColumnDefinition::new("email", "varchar").params(&[255]).not_null())
        .column(
            ColumnDefinition::new("is_active", "boolean")
                .not_null()
                .default(DefaultValue::Bool(true)),
        )
}

fn posts(title_column: &str) -> TableDefinition {
    TableDefinition::new("posts")
        .column(ColumnDefinition::new("id", "bigint").primary_key())
        .column(
            ColumnDefinition::new("author_id", "bigint")
                .not_null()
                .references("users", "id", ForeignKeyAction::Cascade),
        )
        .column(ColumnDefinition::new(title_column, "varchar").params(&[200]).not_null())
        .column(ColumnDefinition::new("content", "text").not_null())
        .column(
            ColumnDefinition::new("created_at", "timestamp")
                .not_null()
                .default(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())),
        )
        .index(IndexDefinition::on(["author_id"]))
}

fn comments() -> TableDefinition {
    TableDefinition::new("comments")
        .column(ColumnDefinition::new("id", "bigint").primary_key())
        .column(
            ColumnDefinition::new("post_id", "bigint")
                .not_null()
                .references("posts", "id", ForeignKeyAction::Cascade),
        )
        .column(ColumnDefinition::new("body", "text").not_null())
}

/// Revision 1: users and posts.
fn revision_one() -> SchemaDefinition {
    SchemaDefinition::new().table(users()).table(posts("title"))
}

/// Revision 2: comments, plus a post status enum.
fn revision_two() -> SchemaDefinition {
    SchemaDefinition::new()
        .enumeration(EnumDefinition::new("post_status", ["draft", "published"]))
        .table(users())
        .table(posts("title").column(ColumnDefinition::new("status", "enum:post_status")))
        .table(comments())
}

/// Revision 3: `posts.title` becomes `posts.headline`.
fn revision_three() -> SchemaDefinition {
    SchemaDefinition::new()
        .enumeration(EnumDefinition::new("post_status", ["draft", "published"]))
        .table(users())
        .table(posts("headline").column(ColumnDefinition::new("status", "enum:post_status")))
        .table(comments())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    let workflow = Workflow::new(
        MigrationRunner::new(SqliteDialect::new(), Policy::production()),
        MigrationHistory::new(pool),
        SnapshotStore::new(dir.path().join("schema.snapshot.json")),
        dir.path().join("migrations"),
    );
    workflow.init().await?;

    println!("=== Blog Migrations Example ===\n");

    for (name, schema) in [
        ("create users and posts", revision_one()),
        ("add comments", revision_two()),
        ("rename post title", revision_three()),
    ] {
        let preview = workflow.preview(&schema)?;
        println!("-- {name} ({})", preview.classification);
        for statement in &preview.statements {
            println!("{statement}");
        }

        if let Some(generated) = workflow.generate_and_apply(&schema, name).await? {
            println!("-> wrote {}\n", generated.path.display());
        }
    }

    // Running again is a no-op
    assert!(workflow
        .generate_and_apply(&revision_three(), "noop")
        .await?
        .is_none());

    println!("Status:");
    for entry in workflow.status().await? {
        println!("  {:?} {}_{}", entry.state, entry.version, entry.name);
    }

    // Same change for PostgreSQL, without a database
    let postgres = MigrationRunner::new(PostgresDialect::new(), Policy::Development);
    let diff = oxide_schema::compute(
        &oxide_schema::SchemaSnapshot::build(&revision_one())?,
        &oxide_schema::SchemaSnapshot::build(&revision_two())?,
    );
    let preview = postgres.dry_run(&diff)?;
    println!("\nPostgreSQL for revision 2:");
    for statement in &preview.statements {
        println!("{statement}");
    }

    Ok(())
}
