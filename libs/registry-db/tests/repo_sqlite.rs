//! Repository behavior against in-memory SQLite.

use chrono::{DateTime, TimeZone, Utc};
use registry_db::sea_orm::{ConnectionTrait, Set};
use registry_db::{
    CompositeKey, Db, DbError, FieldFilter, Filter, ListQuery, PageCursor, Resource,
};

mod ent {
    use registry_db::sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "repo_items")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub external_id: String,
        pub region: String,
        #[sea_orm(nullable)]
        pub labels: Option<Json>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

impl Resource for ent::Entity {
    fn column_for(field: &str) -> Option<ent::Column> {
        match field {
            "id" => Some(ent::Column::Id),
            "external_id" => Some(ent::Column::ExternalId),
            "region" => Some(ent::Column::Region),
            "labels" => Some(ent::Column::Labels),
            "created_at" => Some(ent::Column::CreatedAt),
            _ => None,
        }
    }

    fn sort_fields() -> &'static [&'static str] {
        &["id"]
    }

    fn created_at(model: &ent::Model) -> DateTime<Utc> {
        model.created_at
    }

    fn sort_key(model: &ent::Model, field: &str) -> Option<String> {
        match field {
            "id" => Some(model.id.clone()),
            _ => None,
        }
    }
}

async fn setup() -> Db {
    let db = Db::connect("sqlite::memory:").await.unwrap();
    db.sea()
        .execute_unprepared(
            "CREATE TABLE repo_items (
                id TEXT PRIMARY KEY NOT NULL,
                external_id TEXT NOT NULL,
                region TEXT NOT NULL,
                labels TEXT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .await
        .unwrap();
    db
}

fn at(sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, sec).unwrap()
}

fn item(id: &str, region: &str, created: DateTime<Utc>) -> ent::ActiveModel {
    ent::ActiveModel {
        id: Set(id.to_owned()),
        external_id: Set(format!("ext-{id}")),
        region: Set(region.to_owned()),
        labels: Set(None),
        created_at: Set(created),
    }
}

#[tokio::test]
async fn create_then_find_round_trips() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();

    let found = registry_db::find::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "a"))
        .await
        .unwrap();
    assert_eq!(found.unwrap().region, "eu-1");

    let missing =
        registry_db::find::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "nope"))
            .await
            .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn duplicate_key_is_typed() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();
    let err = registry_db::create(&conn, item("a", "eu-2", at(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UniqueConstraint(_)));
}

#[tokio::test]
async fn unknown_filter_field_is_rejected() {
    let db = setup().await;
    let conn = db.conn();
    let err = registry_db::find::<ent::Entity, _>(
        &conn,
        &CompositeKey::new().eq("password", "x"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::UnknownField(f) if f == "password"));
}

#[tokio::test]
async fn composite_keys_or_together() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();
    registry_db::create(&conn, item("b", "us-1", at(2))).await.unwrap();
    registry_db::create(&conn, item("c", "ap-1", at(3))).await.unwrap();

    let query = ListQuery::new().with_filter(Filter::any_of(vec![
        CompositeKey::new().eq("region", "eu-1"),
        CompositeKey::new().eq("id", "c"),
    ]));
    let page = registry_db::list::<ent::Entity, _>(&conn, &query).await.unwrap();
    let mut ids: Vec<_> = page.items.iter().map(|m| m.id.clone()).collect();
    ids.sort();
    assert_eq!(ids, ["a", "c"]);
}

#[tokio::test]
async fn in_and_not_empty_filters() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();
    registry_db::create(&conn, item("b", "us-1", at(2))).await.unwrap();
    registry_db::create(
        &conn,
        ent::ActiveModel {
            region: Set(String::new()),
            ..item("c", "", at(3))
        },
    )
    .await
    .unwrap();

    let key = CompositeKey::new().field(
        "id",
        FieldFilter::In(vec!["a".into(), "b".into(), "c".into()]),
    );
    let page = registry_db::list::<ent::Entity, _>(
        &conn,
        &ListQuery::new().with_filter(key.field("region", FieldFilter::NotEmpty)),
    )
    .await
    .unwrap();
    assert_eq!(page.items.len(), 2);

    let empty = registry_db::list::<ent::Entity, _>(
        &conn,
        &ListQuery::new()
            .with_filter(CompositeKey::new().field("region", FieldFilter::Empty)),
    )
    .await
    .unwrap();
    assert_eq!(empty.items.len(), 1);
    assert_eq!(empty.items[0].id, "c");
}

#[tokio::test]
async fn json_submap_filters_on_labels() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(
        &conn,
        ent::ActiveModel {
            labels: Set(Some(serde_json::json!({"env": "prod", "team": "kms"}))),
            ..item("a", "eu-1", at(1))
        },
    )
    .await
    .unwrap();
    registry_db::create(
        &conn,
        ent::ActiveModel {
            labels: Set(Some(serde_json::json!({"env": "dev"}))),
            ..item("b", "eu-1", at(2))
        },
    )
    .await
    .unwrap();

    let key = CompositeKey::new().field(
        "labels",
        FieldFilter::Json([("env".to_owned(), "prod".to_owned())].into()),
    );
    let page = registry_db::list::<ent::Entity, _>(&conn, &ListQuery::new().with_filter(key))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "a");
}

#[tokio::test]
async fn pagination_is_stable_under_equal_timestamps() {
    let db = setup().await;
    let conn = db.conn();
    // Three rows sharing one created_at; the id tie-breaker must keep the
    // pages disjoint.
    for id in ["t1", "t2", "t3"] {
        registry_db::create(&conn, item(id, "eu-1", at(7))).await.unwrap();
    }

    let first = registry_db::list::<ent::Entity, _>(&conn, &ListQuery::new().with_limit(2))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    let token = first.next_cursor.expect("second page expected");

    let cursor = PageCursor::decode(&token).unwrap();
    let second = registry_db::list::<ent::Entity, _>(
        &conn,
        &ListQuery::new().with_limit(2).with_cursor(cursor),
    )
    .await
    .unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());

    let mut all: Vec<_> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|m| m.id.clone())
        .collect();
    all.sort();
    all.dedup();
    assert_eq!(all, ["t1", "t2", "t3"]);
}

#[tokio::test]
async fn patch_updates_only_set_fields() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();

    let modified = registry_db::patch(
        &conn,
        ent::ActiveModel {
            id: Set("a".to_owned()),
            region: Set("us-1".to_owned()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(modified);

    let found = registry_db::find::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.region, "us-1");
    assert_eq!(found.external_id, "ext-a");

    let missing = registry_db::patch(
        &conn,
        ent::ActiveModel {
            id: Set("ghost".to_owned()),
            region: Set("us-1".to_owned()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn patch_all_reports_affected_rows() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();
    registry_db::create(&conn, item("b", "eu-1", at(2))).await.unwrap();
    registry_db::create(&conn, item("c", "us-1", at(3))).await.unwrap();

    let affected = registry_db::patch_all(
        &conn,
        ent::ActiveModel {
            region: Set("eu-2".to_owned()),
            ..Default::default()
        },
        &CompositeKey::new().eq("region", "eu-1").into(),
    )
    .await
    .unwrap();
    assert_eq!(affected, 2);
}

#[tokio::test]
async fn delete_reports_whether_something_was_deleted() {
    let db = setup().await;
    let conn = db.conn();
    registry_db::create(&conn, item("a", "eu-1", at(1))).await.unwrap();

    assert!(registry_db::delete::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "a"))
        .await
        .unwrap());
    assert!(!registry_db::delete::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "a"))
        .await
        .unwrap());
}

#[tokio::test]
async fn transaction_rolls_back_on_domain_error() {
    let db = setup().await;

    let result: Result<(), _> = db
        .transaction(|tx| {
            Box::pin(async move {
                registry_db::create(tx, item("a", "eu-1", at(1)))
                    .await
                    .map_err(|e| e.to_string())?;
                Err("boom".to_owned())
            })
        })
        .await;
    assert!(result.is_err());

    let conn = db.conn();
    let found = registry_db::find::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "a"))
        .await
        .unwrap();
    assert!(found.is_none(), "rollback must discard the insert");
}

#[tokio::test]
async fn transaction_commits_on_ok() {
    let db = setup().await;

    db.transaction::<_, String, _>(|tx| {
        Box::pin(async move {
            registry_db::create(tx, item("a", "eu-1", at(1)))
                .await
                .map_err(|e| e.to_string())
        })
    })
    .await
    .unwrap();

    let conn = db.conn();
    assert!(registry_db::find::<ent::Entity, _>(&conn, &CompositeKey::new().eq("id", "a"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn skip_locked_pickup_respects_order_and_limit() {
    let db = setup().await;
    let conn = db.conn();
    for (id, sec) in [("a", 3), ("b", 1), ("c", 2)] {
        registry_db::create(&conn, item(id, "eu-1", at(sec))).await.unwrap();
    }

    let rows = registry_db::list_for_update_skip_locked::<ent::Entity, _>(
        &conn,
        &Filter::new(),
        "created_at",
        2,
    )
    .await
    .unwrap();
    let ids: Vec<_> = rows.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, ["b", "c"]);
}
