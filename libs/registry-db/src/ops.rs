//! Generic repository operations.
//!
//! All operations are polymorphic over a [`Resource`] and run through a
//! [`Runner`]; the SQL shape is identical for every entity. Row locking is a
//! property of the runner: point reads inside a transaction carry
//! `FOR UPDATE`, worker pickup uses `FOR UPDATE SKIP LOCKED`. SQLite has no
//! row locks; there the clauses are omitted and the writer lock covers it.

use std::collections::BTreeMap;

use sea_orm::sea_query::{LockBehavior, LockType};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbBackend,
    DbErr, EntityTrait, IntoActiveModel, Order, QueryFilter, QueryOrder, QuerySelect, Value,
};

use crate::cursor::PageCursor;
use crate::error::DbError;
use crate::filter::{CompositeKey, Filter};
use crate::page::{ListQuery, Page};
use crate::resource::Resource;
use crate::runner::Runner;

/// Insert a row. Duplicate keys surface as [`DbError::UniqueConstraint`].
pub async fn create<A, R>(runner: &R, model: A) -> Result<(), DbError>
where
    A: ActiveModelTrait + Send,
    R: Runner,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    <A::Entity as EntityTrait>::insert(model)
        .exec_without_returning(runner.conn())
        .await?;
    Ok(())
}

/// Point lookup by composite key. Inside a transaction the select carries
/// `FOR UPDATE` so the row stays pinned until commit.
pub async fn find<E, R>(runner: &R, key: &CompositeKey) -> Result<Option<E::Model>, DbError>
where
    E: Resource,
    R: Runner,
{
    let mut select = E::find().filter(key.to_condition::<E>()?);
    if runner.locking() && runner.conn().get_database_backend() == DbBackend::Postgres {
        select = select.lock(LockType::Update);
    }
    Ok(select.one(runner.conn()).await?)
}

/// Keyset-paginated list ordered `created_at DESC` then each registered sort
/// field `DESC`. Fetches `limit + 1` rows to decide whether a next page
/// exists without a second query.
pub async fn list<E, R>(runner: &R, query: &ListQuery) -> Result<Page<E::Model>, DbError>
where
    E: Resource,
    R: Runner,
{
    let limit = query.effective_limit();
    let mut select = E::find().filter(query.filter.to_condition::<E>()?);
    if let Some(cursor) = &query.cursor {
        select = select.filter(cursor_condition::<E>(cursor)?);
    }

    let created = created_at_column::<E>()?;
    select = select.order_by(created, Order::Desc);
    for field in E::sort_fields() {
        let col = E::column_for(field)
            .ok_or_else(|| DbError::UnknownField((*field).to_owned()))?;
        select = select.order_by(col, Order::Desc);
    }

    let mut rows = select.limit(limit + 1).all(runner.conn()).await?;
    let has_more = rows.len() as u64 > limit;
    if has_more {
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    let next_cursor = if has_more {
        rows.last().map(|last| cursor_for::<E>(last).encode())
    } else {
        None
    };
    Ok(Page {
        items: rows,
        next_cursor,
    })
}

/// Partial update driven by the `Set` fields of `model` (primary key
/// included). Returns whether a row was modified.
pub async fn patch<A, R>(runner: &R, model: A) -> Result<bool, DbError>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    R: Runner,
{
    match model.update(runner.conn()).await {
        Ok(_) => Ok(true),
        Err(DbErr::RecordNotUpdated) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Bulk update of every row matching `filter`; returns the affected count.
pub async fn patch_all<A, R>(runner: &R, patch: A, filter: &Filter) -> Result<u64, DbError>
where
    A: ActiveModelTrait + Send,
    A::Entity: Resource,
    R: Runner,
{
    let result = <A::Entity as EntityTrait>::update_many()
        .set(patch)
        .filter(filter.to_condition::<A::Entity>()?)
        .exec(runner.conn())
        .await?;
    Ok(result.rows_affected)
}

/// Delete by composite key; returns whether anything was deleted.
pub async fn delete<E, R>(runner: &R, key: &CompositeKey) -> Result<bool, DbError>
where
    E: Resource,
    R: Runner,
{
    let result = E::delete_many()
        .filter(key.to_condition::<E>()?)
        .exec(runner.conn())
        .await?;
    Ok(result.rows_affected > 0)
}

/// Worker pickup: matching rows ordered ascending by `order_field`, locked
/// with `FOR UPDATE SKIP LOCKED` so concurrent registry instances never pick
/// the same row twice.
pub async fn list_for_update_skip_locked<E, R>(
    runner: &R,
    filter: &Filter,
    order_field: &str,
    limit: u64,
) -> Result<Vec<E::Model>, DbError>
where
    E: Resource,
    R: Runner,
{
    let order_col = E::column_for(order_field)
        .ok_or_else(|| DbError::UnknownField(order_field.to_owned()))?;
    let mut select = E::find()
        .filter(filter.to_condition::<E>()?)
        .order_by(order_col, Order::Asc)
        .limit(limit);
    if runner.conn().get_database_backend() == DbBackend::Postgres {
        select = select.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
    }
    Ok(select.all(runner.conn()).await?)
}

fn created_at_column<E: Resource>() -> Result<E::Column, DbError> {
    E::column_for("created_at").ok_or_else(|| DbError::UnknownField("created_at".to_owned()))
}

fn cursor_for<E: Resource>(model: &E::Model) -> PageCursor {
    let mut keys = BTreeMap::new();
    for field in E::sort_fields() {
        if let Some(value) = E::sort_key(model, field) {
            keys.insert((*field).to_owned(), value);
        }
    }
    PageCursor {
        created_at: E::created_at(model),
        keys,
    }
}

/// Strict tuple comparison `(created_at, f1, …, fn) < cursor` expanded to
/// nested `OR`/`AND`, which keeps pages disjoint even when `created_at`
/// collides across rows.
fn cursor_condition<E: Resource>(cursor: &PageCursor) -> Result<Condition, DbError> {
    let mut tuple: Vec<(E::Column, Value)> = vec![(
        created_at_column::<E>()?,
        cursor.created_at.into(),
    )];
    for field in E::sort_fields() {
        let col = E::column_for(field)
            .ok_or_else(|| DbError::UnknownField((*field).to_owned()))?;
        let value = cursor
            .keys
            .get(*field)
            .ok_or_else(|| DbError::CursorMissingField((*field).to_owned()))?;
        tuple.push((col, value.clone().into()));
    }

    let mut cond: Option<Condition> = None;
    for (col, value) in tuple.into_iter().rev() {
        cond = Some(match cond {
            None => Condition::all().add(col.lt(value)),
            Some(inner) => Condition::any().add(col.lt(value.clone())).add(
                Condition::all().add(col.eq(value)).add(inner),
            ),
        });
    }
    Ok(cond.unwrap_or_else(Condition::all))
}
