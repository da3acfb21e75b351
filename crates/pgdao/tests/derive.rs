#![allow(dead_code)]

use chrono::{DateTime, Utc};
use pgdao::{ColumnDefault, ColumnType, Entity, Filters, OrmError, Record, Select, Value, col, compose};

#[derive(Debug, Default, Clone, PartialEq, Entity)]
#[dao(table = "public.documents", unique(owner, title))]
struct Document {
    #[dao(id, column = "doc_id")]
    id: Option<uuid::Uuid>,
    owner: Option<String>,
    title: Option<String>,
    #[dao(unique)]
    slug: Option<String>,
    #[dao(default = 0)]
    revision: Option<i32>,
    #[dao(default_now, on_update_now)]
    touched_at: Option<DateTime<Utc>>,
    #[dao(soft_delete, default = false)]
    deleted: Option<bool>,
    body: serde_json::Value,
    #[dao(skip)]
    rendered: Option<String>,
}

#[derive(Debug, Default, Entity)]
#[dao(table = "counters")]
struct Counter {
    id: i64,
    hits: i64,
}

#[derive(Debug, Default, Entity)]
#[dao(table = "bad table")]
struct BadTable {
    id: Option<i64>,
}

#[test]
fn descriptor_from_attributes() {
    let d = Document::descriptor().unwrap();
    assert_eq!(d.table_name(), "documents");
    assert_eq!(d.table_sql(), r#""public"."documents""#);
    assert_eq!(d.primary_key().name(), "doc_id");
    assert_eq!(d.primary_key().column_type(), ColumnType::Uuid);

    let names: Vec<&str> = d.all_columns().iter().map(|c| c.name()).collect();
    assert_eq!(
        names,
        ["doc_id", "owner", "title", "slug", "revision", "touched_at", "deleted", "body"]
    );
    assert_eq!(
        d.unique_constraints(),
        [vec!["owner".to_string(), "title".to_string()], vec!["slug".to_string()]]
    );
    assert_eq!(d.excluded_fields(), ["rendered"]);
    assert_eq!(d.soft_delete_column().map(|c| c.name()), Some("deleted"));

    let revision = d.column("revision").unwrap();
    assert!(revision.is_nullable());
    assert_eq!(revision.default(), Some(&ColumnDefault::Value(Value::Int(0))));
    let touched = d.column("touched_at").unwrap();
    assert_eq!(touched.default(), Some(&ColumnDefault::Now));
    assert!(touched.is_on_update_now());
    assert!(!d.column("body").unwrap().is_nullable());
}

#[test]
fn descriptor_is_memoized() {
    let a = Document::descriptor().unwrap() as *const _;
    let b = Document::descriptor().unwrap() as *const _;
    assert_eq!(a, b);
}

#[test]
fn field_named_id_is_the_default_key() {
    let d = Counter::descriptor().unwrap();
    assert_eq!(d.primary_key().name(), "id");
    assert!(!d.primary_key().is_nullable());
    assert_eq!(Counter { id: 7, hits: 1 }.primary_key_value(), Value::Int(7));
}

#[test]
fn invalid_table_is_schema_error_every_time() {
    assert!(matches!(BadTable::descriptor(), Err(OrmError::Schema(_))));
    assert!(matches!(BadTable::descriptor(), Err(OrmError::Schema(_))));
}

#[test]
fn record_roundtrip_skips_unpersisted_fields() {
    let doc = Document {
        owner: Some("ann".into()),
        title: Some("notes".into()),
        body: serde_json::json!({"blocks": []}),
        rendered: Some("<p/>".into()),
        ..Document::default()
    };
    let record = doc.to_record();
    assert_eq!(record.len(), 8);
    assert!(!record.is_set("rendered"));
    assert_eq!(record.get("doc_id"), Some(&Value::Null));
    assert_eq!(record.get("owner"), Some(&Value::Text("ann".into())));

    let back = Document::from_record(record).unwrap();
    assert_eq!(back.rendered, None);
    assert_eq!(back.owner, doc.owner);
    assert_eq!(back.body, doc.body);
}

#[test]
fn from_record_keeps_defaults_for_missing_columns() {
    let record = Record::new().with("owner", "bob");
    let doc = Document::from_record(record).unwrap();
    assert_eq!(doc.owner.as_deref(), Some("bob"));
    assert_eq!(doc.title, None);
    assert_eq!(doc.body, serde_json::Value::Null);
}

#[test]
fn from_record_reports_decode_errors() {
    let record = Record::new().with("revision", "seven");
    let err = Document::from_record(record).unwrap_err();
    assert!(matches!(err, OrmError::Decode { ref column, .. } if column == "revision"));
}

#[test]
fn derived_descriptor_composes() {
    let d = Document::descriptor().unwrap();
    let select = Select::new()
        .filter(Filters::new().and(col("revision").gte(2)).kw("owner", "ann"))
        .only(["doc_id", "title"]);
    let query = compose(d, &select).unwrap();
    assert_eq!(
        query.sql().to_sql(),
        r#"SELECT "doc_id", "title" FROM "public"."documents" WHERE "revision" >= $1 AND "owner" = $2"#
    );
}
