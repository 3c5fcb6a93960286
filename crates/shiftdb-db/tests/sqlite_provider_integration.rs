//! SQLite transformation provider integration tests
//!
//! Every test opens its own `sqlite::memory:` connection through the provider
//! factory, so the tests exercise the same path a migration run uses.
//!
//! **Test Coverage:**
//! - Column round trip through the catalog
//! - Copy-and-swap rebuild for column removal, keys and constraints
//! - Refusal to start a rebuild over an orphaned shadow table
//! - Idempotent removal and name collision errors
//! - DML helpers and the tracking table

#![cfg(feature = "sqlite")]

use rstest::*;
use shiftdb_db::backends::factory::create_provider;
use shiftdb_db::backends::provider::TransformationProvider;
use shiftdb_db::backends::provider::sqlite::shadow_table_name;
use shiftdb_db::backends::schema::{
	Column, ColumnProperty, DataType, FilterItem, FilterOperator, ForeignKeyAction,
	ForeignKeyConstraint, Index, Value,
};
use shiftdb_db::backends::types::ProviderOptions;
use shiftdb_db::error::{MigrationError, RebuildStep};

async fn sqlite() -> Box<dyn TransformationProvider> {
	create_provider("sqlite", "sqlite::memory:", ProviderOptions::default())
		.await
		.expect("Failed to open in-memory SQLite")
}

async fn items_table(provider: &mut dyn TransformationProvider) {
	provider
		.add_table(
			"items",
			vec![
				Column::new("id", DataType::Int64)
					.with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY),
				Column::new("a", DataType::String).with_size(50),
				Column::new("b", DataType::Int32),
				Column::new("c", DataType::Int32)
					.with_default(0)
					.with_properties(ColumnProperty::NOT_NULL),
			],
		)
		.await
		.unwrap();
	provider
		.add_index("items", Index::new("ix_items_a_c", ["a", "c"]))
		.await
		.unwrap();
	provider
		.add_index("items", Index::new("ix_items_b", ["b"]))
		.await
		.unwrap();
	for (a, b, c) in [("x", 10, 1), ("y", 20, 2), ("z", 30, 3)] {
		provider
			.insert(
				"items",
				&["a", "b", "c"],
				vec![Value::from(a), Value::from(b), Value::from(c)],
			)
			.await
			.unwrap();
	}
}

async fn row_summary(provider: &mut dyn TransformationProvider) -> Option<Value> {
	provider
		.execute_scalar(
			"SELECT group_concat(a || ':' || c, ',') FROM (SELECT a, c FROM items ORDER BY id)",
		)
		.await
		.unwrap()
}

// ============================================================================
// Introspection
// ============================================================================

#[rstest]
#[case::boolean(Column::new("flag", DataType::Boolean))]
#[case::int16(Column::new("small", DataType::Int16))]
#[case::int64(Column::new("big", DataType::Int64).with_properties(ColumnProperty::NOT_NULL))]
#[case::varchar(Column::new("title", DataType::String).with_size(80))]
#[case::fixed(Column::new("code", DataType::StringFixedLength).with_size(3))]
#[case::decimal(Column::new("price", DataType::Decimal).with_precision(10, 2))]
#[case::binary(Column::new("payload", DataType::Binary))]
#[case::timestamp(Column::new("seen_at", DataType::DateTime))]
#[tokio::test]
async fn test_column_round_trip(#[case] column: Column) {
	let mut provider = sqlite().await;
	provider
		.add_table(
			"samples",
			vec![
				Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY),
				column.clone(),
			],
		)
		.await
		.unwrap();

	let found = provider
		.get_column_by_name("samples", &column.name)
		.await
		.unwrap()
		.expect("column should be introspected");
	assert_eq!(found.data_type, column.data_type);
	assert_eq!(found.size, column.size);
	assert_eq!(found.precision, column.precision);
	assert_eq!(found.scale, column.scale);
	assert_eq!(found.properties, column.properties.normalize());
}

// ============================================================================
// Rebuild
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_remove_column_keeps_rows_and_unrelated_indexes() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;

	provider.remove_column("items", "b").await.unwrap();

	let names: Vec<String> = provider
		.get_columns("items")
		.await
		.unwrap()
		.into_iter()
		.map(|c| c.name)
		.collect();
	assert_eq!(names, ["id", "a", "c"]);

	let count = provider
		.execute_scalar("SELECT COUNT(*) FROM items")
		.await
		.unwrap();
	assert_eq!(count, Some(Value::Int(3)));
	assert_eq!(
		row_summary(provider.as_mut()).await,
		Some(Value::String("x:1,y:2,z:3".to_string()))
	);

	assert!(provider.index_exists("items", "ix_items_a_c").await.unwrap());
	assert!(!provider.index_exists("items", "ix_items_b").await.unwrap());
	let tables = provider.get_tables().await.unwrap();
	assert!(!tables.contains(&shadow_table_name("items")));
}

#[rstest]
#[tokio::test]
async fn test_rebuild_refuses_orphaned_shadow_table() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;
	provider
		.execute_non_query(&format!(
			"CREATE TABLE \"{}\" (id INTEGER)",
			shadow_table_name("items")
		))
		.await
		.unwrap();

	let result = provider.remove_column("items", "b").await;
	assert!(matches!(result, Err(MigrationError::InvalidOperation(_))));
	assert!(provider.column_exists("items", "b").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_failed_copy_leaves_shadow_table_and_blocks_next_rebuild() {
	let mut provider = sqlite().await;
	provider
		.add_table(
			"t",
			vec![
				Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY),
				Column::new("v", DataType::Int32),
			],
		)
		.await
		.unwrap();
	for id in 1_i64..=2 {
		provider
			.insert("t", &["id", "v"], vec![Value::from(id), Value::from(9)])
			.await
			.unwrap();
	}

	let result = provider
		.add_unique_constraint("uq_t_v", "t", vec!["v".to_string()])
		.await;

	match result {
		Err(MigrationError::RebuildIncomplete {
			table,
			shadow_table,
			step,
			..
		}) => {
			assert_eq!(table, "t");
			assert_eq!(shadow_table, "_rebuild_tmp_t");
			assert_eq!(step, RebuildStep::CopyRows);
		}
		other => panic!("expected an incomplete rebuild, got {:?}", other),
	}
	assert!(provider.table_exists(&shadow_table_name("t")).await.unwrap());
	assert_eq!(provider.get_columns("t").await.unwrap().len(), 2);

	let retry = provider.remove_column("t", "v").await;
	assert!(matches!(retry, Err(MigrationError::InvalidOperation(_))));
	assert!(provider.column_exists("t", "v").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_change_default_value_through_rebuild() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;

	provider
		.change_default_value("items", "c", Some(Value::from(7)))
		.await
		.unwrap();
	provider
		.insert("items", &["a"], vec![Value::from("w")])
		.await
		.unwrap();

	let c = provider
		.execute_scalar("SELECT c FROM items WHERE a = 'w'")
		.await
		.unwrap();
	assert_eq!(c, Some(Value::Int(7)));
	assert!(provider.index_exists("items", "ix_items_b").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_foreign_key_added_and_removed() {
	let mut provider = sqlite().await;
	provider
		.add_table(
			"customers",
			vec![Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY)],
		)
		.await
		.unwrap();
	provider
		.add_table(
			"orders",
			vec![
				Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY),
				Column::new("customer_id", DataType::Int64),
			],
		)
		.await
		.unwrap();

	let fk = ForeignKeyConstraint::new(
		"fk_orders_customer",
		"orders",
		["customer_id"],
		"customers",
		["id"],
	)
	.on_delete(ForeignKeyAction::Cascade);
	provider.add_foreign_key(fk).await.unwrap();

	let fks = provider.get_foreign_key_constraints("orders").await.unwrap();
	assert_eq!(fks.len(), 1);
	assert_eq!(fks[0].name, "fk_orders_customer");
	assert_eq!(fks[0].on_delete, ForeignKeyAction::Cascade);

	provider
		.remove_foreign_key("orders", "fk_orders_customer")
		.await
		.unwrap();
	assert!(
		provider
			.get_foreign_key_constraints("orders")
			.await
			.unwrap()
			.is_empty()
	);
}

#[rstest]
#[tokio::test]
async fn test_add_foreign_key_with_dangling_rows_fails() {
	let mut provider = sqlite().await;
	provider
		.execute_non_query("CREATE TABLE parent (id INTEGER PRIMARY KEY)")
		.await
		.unwrap();
	provider
		.execute_non_query("CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INT)")
		.await
		.unwrap();
	provider
		.execute_non_query("INSERT INTO child (id, parent_id) VALUES (1, 99)")
		.await
		.unwrap();

	let fk = ForeignKeyConstraint::new("fk_child_parent", "child", ["parent_id"], "parent", ["id"]);
	let result = provider.add_foreign_key(fk).await;
	assert!(matches!(result, Err(MigrationError::ForeignKeyViolation(_))));
}

#[rstest]
#[tokio::test]
async fn test_unique_and_check_constraints() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;

	provider
		.add_unique_constraint("uq_items_a", "items", vec!["a".to_string()])
		.await
		.unwrap();
	provider
		.add_check_constraint("ck_items_c", "items", "c >= 0")
		.await
		.unwrap();
	assert!(provider.constraint_exists("items", "uq_items_a").await.unwrap());
	assert!(provider.constraint_exists("items", "ck_items_c").await.unwrap());

	let duplicate = provider
		.insert("items", &["a", "c"], vec![Value::from("x"), Value::from(5)])
		.await;
	assert!(matches!(duplicate, Err(MigrationError::Database(_))));

	provider.remove_constraint("items", "ck_items_c").await.unwrap();
	assert!(!provider.constraint_exists("items", "ck_items_c").await.unwrap());
	assert!(provider.constraint_exists("items", "uq_items_a").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_add_not_null_column_without_default() {
	let mut provider = sqlite().await;
	provider
		.add_table(
			"empty",
			vec![Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY)],
		)
		.await
		.unwrap();
	provider
		.add_column(
			"empty",
			Column::new("required", DataType::Int32).with_properties(ColumnProperty::NOT_NULL),
		)
		.await
		.unwrap();
	assert!(provider.column_exists("empty", "required").await.unwrap());

	items_table(provider.as_mut()).await;
	let result = provider
		.add_column(
			"items",
			Column::new("required", DataType::Int32).with_properties(ColumnProperty::NOT_NULL),
		)
		.await;
	assert!(matches!(result, Err(MigrationError::InvalidOperation(_))));
}

// ============================================================================
// Validation and idempotence
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_filtered_unique_index_rejected() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;

	let index = Index::new("ix_items_open", ["a"])
		.unique()
		.with_filter(FilterItem::new("c", FilterOperator::Greater, 0));
	let result = provider.add_index("items", index).await;
	assert!(matches!(result, Err(MigrationError::InvalidOperation(_))));
	assert!(!provider.index_exists("items", "ix_items_open").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_remove_missing_table_is_noop() {
	let mut provider = sqlite().await;
	provider.remove_table("does_not_exist").await.unwrap();
	provider.remove_index("does_not_exist", "ix_nothing").await.unwrap();
}

#[rstest]
#[tokio::test]
async fn test_rename_onto_existing_names_rejected() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;
	provider
		.add_table("others", vec![Column::new("id", DataType::Int64)])
		.await
		.unwrap();

	assert!(matches!(
		provider.rename_table("items", "others").await,
		Err(MigrationError::InvalidOperation(_))
	));
	assert!(matches!(
		provider.rename_column("items", "a", "c").await,
		Err(MigrationError::InvalidOperation(_))
	));

	provider.rename_column("items", "a", "label").await.unwrap();
	assert!(provider.column_exists("items", "label").await.unwrap());
}

// ============================================================================
// DML and tracking
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_update_and_delete_helpers() {
	let mut provider = sqlite().await;
	items_table(provider.as_mut()).await;

	let updated = provider
		.update(
			"items",
			vec![("c".to_string(), Value::from(9))],
			vec![FilterItem::new("a", FilterOperator::Equal, "y")],
		)
		.await
		.unwrap();
	assert_eq!(updated, 1);

	let deleted = provider
		.delete(
			"items",
			vec![FilterItem::new("b", FilterOperator::Greater, 15)],
		)
		.await
		.unwrap();
	assert_eq!(deleted, 2);
	assert_eq!(
		row_summary(provider.as_mut()).await,
		Some(Value::String("x:1".to_string()))
	);
}

#[rstest]
#[tokio::test]
async fn test_tracking_is_per_scope() {
	let mut provider = sqlite().await;
	provider.migration_applied(2, "").await.unwrap();
	provider.migration_applied(1, "").await.unwrap();
	provider.migration_applied(1, "billing").await.unwrap();

	assert_eq!(provider.applied_migrations("").await.unwrap(), vec![1, 2]);
	assert_eq!(provider.applied_migrations("billing").await.unwrap(), vec![1]);

	provider.migration_unapplied(1, "").await.unwrap();
	assert_eq!(provider.applied_migrations("").await.unwrap(), vec![2]);
	assert_eq!(provider.applied_migrations("billing").await.unwrap(), vec![1]);
}

#[rstest]
#[tokio::test]
async fn test_legacy_tracking_table_gains_scope() {
	let mut provider = sqlite().await;
	provider
		.execute_non_query("CREATE TABLE \"SchemaInfo\" (\"Version\" bigint NOT NULL)")
		.await
		.unwrap();
	provider
		.execute_non_query("INSERT INTO \"SchemaInfo\" (\"Version\") VALUES (4)")
		.await
		.unwrap();

	assert_eq!(provider.applied_migrations("").await.unwrap(), vec![4]);
	assert!(provider.column_exists("SchemaInfo", "Scope").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_legacy_version_key_widened_to_scope() {
	let mut provider = sqlite().await;
	provider
		.execute_non_query("CREATE TABLE \"SchemaInfo\" (\"Version\" INTEGER PRIMARY KEY)")
		.await
		.unwrap();
	provider
		.execute_non_query("INSERT INTO \"SchemaInfo\" (\"Version\") VALUES (1)")
		.await
		.unwrap();

	provider.migration_applied(1, "billing").await.unwrap();

	assert_eq!(provider.applied_migrations("").await.unwrap(), vec![1]);
	assert_eq!(provider.applied_migrations("billing").await.unwrap(), vec![1]);
	let key: Vec<String> = provider
		.get_columns("SchemaInfo")
		.await
		.unwrap()
		.into_iter()
		.filter(|c| c.is_primary_key())
		.map(|c| c.name)
		.collect();
	assert_eq!(key, ["Version", "Scope"]);
	assert!(
		!provider
			.table_exists(&shadow_table_name("SchemaInfo"))
			.await
			.unwrap()
	);

	provider.migration_unapplied(1, "billing").await.unwrap();
	assert_eq!(provider.applied_migrations("").await.unwrap(), vec![1]);
	assert!(provider.applied_migrations("billing").await.unwrap().is_empty());
}
