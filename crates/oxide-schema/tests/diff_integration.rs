//! Integration tests for the diff engine and SQL generation.
//!
//! Snapshots are built from schema definitions, diffed, and the resulting
//! operations are turned into SQL for both dialects.

use oxide_schema::{
    compute, generate, ColumnDefinition, DiffOperation, EnumDefinition, ForeignKeyAction,
    IndexDefinition, MigrationDialect, PostgresDialect, SchemaDefinition, SchemaSnapshot,
    SqliteDialect, Statement, TableDefinition,
};

// =============================================================================
// Fixtures
// =============================================================================

fn accounts() -> TableDefinition {
    TableDefinition::new("accounts")
        .column(ColumnDefinition::new("id", "uuid").primary_key())
        .column(ColumnDefinition::new("label", "text").unique())
}

fn orders() -> TableDefinition {
    TableDefinition::new("orders")
        .column(ColumnDefinition::new("id", "bigint").primary_key())
        .column(ColumnDefinition::new("account_id", "uuid").not_null().references(
            "accounts",
            "id",
            ForeignKeyAction::Cascade,
        ))
        .column(ColumnDefinition::new("total", "decimal").params(&[12, 2]).not_null())
        .column(ColumnDefinition::new("status", "enum:order_status"))
        .index(IndexDefinition::on(["account_id", "status"]))
}

fn shop() -> SchemaDefinition {
    SchemaDefinition::new()
        .enumeration(EnumDefinition::new("order_status", ["open", "paid", "shipped"]))
        .table(accounts())
        .table(orders())
}

fn build(def: &SchemaDefinition) -> SchemaSnapshot {
    SchemaSnapshot::build(def).unwrap()
}

fn sql_of(statements: &[Statement]) -> Vec<&str> {
    statements.iter().filter_map(Statement::sql).collect()
}

fn position(ops: &[DiffOperation], pred: impl Fn(&DiffOperation) -> bool) -> usize {
    ops.iter().position(pred).expect("operation present")
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn diff_against_itself_is_empty() {
    let snap = build(&shop());
    let diff = compute(&snap, &snap);
    assert!(!diff.has_changes);
    assert!(diff.operations.is_empty());
}

#[test]
fn snapshot_json_round_trip() {
    let snap = build(&shop());
    let json = snap.to_json().unwrap();
    assert_eq!(SchemaSnapshot::from_json(&json).unwrap(), snap);
}

#[test]
fn diff_is_deterministic_across_declaration_order() {
    let reordered = SchemaDefinition::new()
        .table(
            TableDefinition::new("orders")
                .index(IndexDefinition::on(["account_id", "status"]))
                .column(ColumnDefinition::new("status", "enum:order_status"))
                .column(ColumnDefinition::new("total", "decimal").params(&[12, 2]).not_null())
                .column(ColumnDefinition::new("account_id", "uuid").not_null().references(
                    "accounts",
                    "id",
                    ForeignKeyAction::Cascade,
                ))
                .column(ColumnDefinition::new("id", "bigint").primary_key()),
        )
        .table(
            TableDefinition::new("accounts")
                .column(ColumnDefinition::new("label", "text").unique())
                .column(ColumnDefinition::new("id", "uuid").primary_key()),
        )
        .enumeration(EnumDefinition::new("order_status", ["open", "paid", "shipped"]));

    let empty = SchemaSnapshot::empty();
    let a = compute(&empty, &build(&shop()));
    let b = compute(&empty, &build(&reordered));
    assert_eq!(a, b);
    assert_eq!(compute(&empty, &build(&shop())), a);
    assert_eq!(build(&shop()).to_json().unwrap(), build(&reordered).to_json().unwrap());
}

#[test]
fn created_tables_precede_their_foreign_keys() {
    let diff = compute(&SchemaSnapshot::empty(), &build(&shop()));
    let ops = &diff.operations;

    let enum_added = position(ops, |op| matches!(op, DiffOperation::EnumAdded { .. }));
    let accounts_created = position(
        ops,
        |op| matches!(op, DiffOperation::TableAdded { name, .. } if name == "accounts"),
    );
    let orders_created = position(
        ops,
        |op| matches!(op, DiffOperation::TableAdded { name, .. } if name == "orders"),
    );
    let fk_added = position(ops, |op| matches!(op, DiffOperation::ForeignKeyAdded { .. }));

    assert!(enum_added < orders_created);
    assert!(accounts_created < fk_added);
    assert!(orders_created < fk_added);

    let sql = generate(&diff, &PostgresDialect::new()).unwrap();
    let texts: Vec<String> = sql.forward.iter().map(ToString::to_string).collect();
    let create_accounts = texts
        .iter()
        .position(|s| s.starts_with("CREATE TABLE \"accounts\""))
        .unwrap();
    let add_fk = texts
        .iter()
        .position(|s| s.contains("FOREIGN KEY (\"account_id\")"))
        .unwrap();
    assert!(create_accounts < add_fk);
    assert!(texts[0].starts_with("CREATE TYPE \"order_status\""));
}

#[test]
fn foreign_keys_dropped_before_tables() {
    let diff = compute(&build(&shop()), &SchemaSnapshot::empty());
    let ops = &diff.operations;

    let fk_removed = position(ops, |op| matches!(op, DiffOperation::ForeignKeyRemoved { .. }));
    let accounts_dropped = position(
        ops,
        |op| matches!(op, DiffOperation::TableRemoved { name, .. } if name == "accounts"),
    );
    let orders_dropped = position(
        ops,
        |op| matches!(op, DiffOperation::TableRemoved { name, .. } if name == "orders"),
    );
    let enum_dropped = position(ops, |op| matches!(op, DiffOperation::EnumRemoved { .. }));

    assert!(fk_removed < accounts_dropped);
    // referrers go first
    assert!(orders_dropped < accounts_dropped);
    assert!(accounts_dropped < enum_dropped);

    let sql = generate(&diff, &PostgresDialect::new()).unwrap();
    let texts: Vec<String> = sql.forward.iter().map(ToString::to_string).collect();
    assert_eq!(
        texts,
        vec![
            "ALTER TABLE \"orders\" DROP CONSTRAINT \"fk_orders_account_id\";",
            "DROP TABLE \"orders\";",
            "DROP TABLE \"accounts\";",
            "DROP TYPE \"order_status\";",
        ]
    );
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn scenario_a_single_create_table() {
    let current = build(&SchemaDefinition::new().table(accounts()));
    let diff = compute(&SchemaSnapshot::empty(), &current);

    assert_eq!(diff.operations.len(), 1);
    assert!(matches!(
        &diff.operations[0],
        DiffOperation::TableAdded { name, .. } if name == "accounts"
    ));

    for dialect in [
        &SqliteDialect::new() as &dyn MigrationDialect,
        &PostgresDialect::new(),
    ] {
        let sql = generate(&diff, dialect).unwrap();
        assert_eq!(sql.forward.len(), 1, "{}", dialect.name());
        let create = sql.forward[0].sql().unwrap();
        assert!(create.starts_with("CREATE TABLE \"accounts\""));
        assert!(create.contains("\"id\""));
        assert!(create.contains("PRIMARY KEY"));
        assert!(create.contains("\"label\" TEXT UNIQUE"));
    }

    let pg = generate(&diff, &PostgresDialect::new()).unwrap();
    assert_eq!(
        pg.forward,
        vec![Statement::Sql(
            "CREATE TABLE \"accounts\" (\n    \"id\" UUID PRIMARY KEY,\n    \"label\" TEXT UNIQUE\n)"
                .into()
        )]
    );
    assert_eq!(pg.reverse, vec![Statement::Sql("DROP TABLE \"accounts\"".into())]);
}

#[test]
fn scenario_b_column_rename() {
    let previous = build(&SchemaDefinition::new().table(accounts()));
    let current = build(
        &SchemaDefinition::new().table(
            TableDefinition::new("accounts")
                .column(ColumnDefinition::new("id", "uuid").primary_key())
                .column(ColumnDefinition::new("title", "text").unique()),
        ),
    );
    let diff = compute(&previous, &current);

    assert_eq!(diff.operations.len(), 1);
    match &diff.operations[0] {
        DiffOperation::ColumnRenamed {
            table,
            from,
            to,
            confidence,
            unique,
        } => {
            assert_eq!(table, "accounts");
            assert_eq!(from, "label");
            assert_eq!(to, "title");
            assert!(*confidence >= 0.7, "confidence {confidence}");
            assert!(*unique);
        }
        other => panic!("expected ColumnRenamed, got {other:?}"),
    }

    let sql = generate(&diff, &SqliteDialect::new()).unwrap();
    assert_eq!(
        sql.forward,
        vec![Statement::Sql(
            "ALTER TABLE \"accounts\" RENAME COLUMN \"label\" TO \"title\"".into()
        )]
    );
    assert_eq!(
        sql.reverse,
        vec![Statement::Sql(
            "ALTER TABLE \"accounts\" RENAME COLUMN \"title\" TO \"label\"".into()
        )]
    );

    // PostgreSQL keeps the old constraint name unless told otherwise
    let pg = generate(&diff, &PostgresDialect::new()).unwrap();
    assert_eq!(
        sql_of(&pg.forward),
        vec![
            "ALTER TABLE \"accounts\" RENAME COLUMN \"label\" TO \"title\"",
            "ALTER TABLE \"accounts\" RENAME CONSTRAINT \"accounts_label_key\" TO \"accounts_title_key\"",
        ]
    );
    assert_eq!(
        sql_of(&pg.reverse),
        vec![
            "ALTER TABLE \"accounts\" RENAME COLUMN \"title\" TO \"label\"",
            "ALTER TABLE \"accounts\" RENAME CONSTRAINT \"accounts_title_key\" TO \"accounts_label_key\"",
        ]
    );
}

#[test]
fn composite_primary_key_keeps_declared_order() {
    let current = build(
        &SchemaDefinition::new().table(
            TableDefinition::new("memberships")
                .column(ColumnDefinition::new("team_id", "bigint").primary_key())
                .column(ColumnDefinition::new("account_id", "bigint").primary_key())
                .column(ColumnDefinition::new("role", "text")),
        ),
    );
    let diff = compute(&SchemaSnapshot::default(), &current);
    let sql = generate(&diff, &SqliteDialect::new()).unwrap();
    assert_eq!(
        sql_of(&sql.forward),
        vec![
            "CREATE TABLE \"memberships\" (\n    \"team_id\" INTEGER NOT NULL,\n    \"account_id\" INTEGER NOT NULL,\n    \"role\" TEXT,\n    PRIMARY KEY (\"team_id\", \"account_id\")\n)"
        ]
    );
}

#[test]
fn unique_constraint_follows_table_rename() {
    let post = |name: &str, unique: bool| {
        let label = ColumnDefinition::new("label", "text");
        SchemaDefinition::new().table(
            TableDefinition::new(name)
                .column(ColumnDefinition::new("id", "bigint").primary_key())
                .column(if unique { label.unique() } else { label })
                .column(ColumnDefinition::new("body", "text")),
        )
    };
    let dialect = PostgresDialect::new();

    let renamed = compute(&build(&post("post", true)), &build(&post("posts", true)));
    assert!(matches!(
        &renamed.operations[..],
        [DiffOperation::TableRenamed { unique_columns, .. }] if unique_columns == &["label"]
    ));
    assert_eq!(
        sql_of(&generate(&renamed, &dialect).unwrap().forward),
        vec![
            "ALTER TABLE \"post\" RENAME TO \"posts\"",
            "ALTER TABLE \"posts\" RENAME CONSTRAINT \"post_label_key\" TO \"posts_label_key\"",
        ]
    );

    // the later toggle addresses the renamed constraint
    let dropped = compute(&build(&post("posts", true)), &build(&post("posts", false)));
    assert_eq!(
        sql_of(&generate(&dropped, &dialect).unwrap().forward),
        vec!["ALTER TABLE \"posts\" DROP CONSTRAINT \"posts_label_key\""]
    );
}

#[test]
fn two_equally_good_candidates_are_not_renamed() {
    let previous = build(
        &SchemaDefinition::new().table(
            TableDefinition::new("people")
                .column(ColumnDefinition::new("id", "bigint").primary_key())
                .column(ColumnDefinition::new("name", "text")),
        ),
    );
    let current = build(
        &SchemaDefinition::new().table(
            TableDefinition::new("people")
                .column(ColumnDefinition::new("id", "bigint").primary_key())
                .column(ColumnDefinition::new("name_a", "text"))
                .column(ColumnDefinition::new("name_b", "text")),
        ),
    );
    let diff = compute(&previous, &current);
    assert!(diff
        .operations
        .iter()
        .all(|op| !matches!(op, DiffOperation::ColumnRenamed { .. })));
    assert_eq!(diff.operations.len(), 3);
}

#[test]
fn enum_append_generates_add_value() {
    let previous = build(&shop());
    let current = build(
        &SchemaDefinition::new()
            .enumeration(EnumDefinition::new(
                "order_status",
                ["open", "paid", "shipped", "refunded"],
            ))
            .table(accounts())
            .table(orders()),
    );
    let diff = compute(&previous, &current);
    let pg = generate(&diff, &PostgresDialect::new()).unwrap();
    assert_eq!(
        pg.forward,
        vec![Statement::Sql(
            "ALTER TYPE \"order_status\" ADD VALUE 'refunded'".into()
        )]
    );
    assert!(pg.reverse[0].is_manual());

    // enums are plain TEXT on sqlite
    let lite = generate(&diff, &SqliteDialect::new()).unwrap();
    assert!(lite.forward.is_empty());
}

#[test]
fn decimal_precision_carried_exactly() {
    let diff = compute(&SchemaSnapshot::empty(), &build(&shop()));
    for dialect in [
        &SqliteDialect::new() as &dyn MigrationDialect,
        &PostgresDialect::new(),
    ] {
        let sql = generate(&diff, dialect).unwrap();
        assert!(sql
            .executable()
            .any(|s| s.contains("\"total\" DECIMAL(12, 2) NOT NULL")));
    }
}
