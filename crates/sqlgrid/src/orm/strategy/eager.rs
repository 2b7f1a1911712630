//! Eager strategy: every readable relation is fetched with one batched
//! `IN (...)` query per relation and level.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::{Error, ErrorKind, Result};
use crate::orm::record::{Record, RelationData};
use crate::orm::relation::{JoinTable, Relation, RelationKind};
use crate::orm::scope::Scope;
use crate::orm::strategy::Strategy;
use crate::ql::Condition;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

fn key_of(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(Value::group_key)
}

/// Non-null values, first occurrence wins.
fn distinct<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .filter_map(|v| v.group_key().map(|k| (k, v)))
        .filter(|(k, _)| seen.insert(k.clone()))
        .map(|(_, v)| v.clone())
        .collect()
}

fn in_condition(scope: &Scope, column: &str, keys: Vec<Value>) -> Condition {
    let mut condition = Condition::new();
    condition.and_where(
        &format!("{} IN (?)", scope.builder().quote(column)),
        vec![Value::List(keys)],
    );
    condition
}

/// Target-side filter of a relation: `afk IN (keys)` plus the discriminator.
fn target_condition(scope: &Scope, relation: &Relation, keys: Vec<Value>) -> Condition {
    let mut condition = in_condition(scope, relation.association_foreign_key.column_name(), keys);
    if let Some(poly) = &relation.polymorphic {
        condition.and_where(
            &format!("{} = ?", scope.builder().quote(poly.type_field.column_name())),
            vec![Value::from(poly.value.as_str())],
        );
    }
    condition
}

/// Composite primary value, `None` while any part is unset.
fn primary_key(scope: &Scope, record: &Record) -> Option<String> {
    let parts: Option<Vec<String>> = scope
        .primaries()
        .iter()
        .map(|p| record.get(&p.name).filter(|v| !v.is_zero()).and_then(Value::group_key))
        .collect();
    parts.map(|p| p.join("\u{1f}"))
}

fn has_primary(scope: &Scope, record: &Record) -> bool {
    primary_key(scope, record).is_some()
}

/// `pk IN (...)`, or one parenthesized conjunction per record for composite keys.
fn primary_condition(scope: &Scope, records: &[&Record]) -> Result<Condition> {
    let primaries = scope.primaries();
    let missing = || {
        Error::new(
            ErrorKind::MissingPrimary,
            format!("`{}` record without primary key", scope.metadata.name),
        )
    };
    let mut condition = Condition::new();
    if let [primary] = primaries.as_slice() {
        let keys = records
            .iter()
            .map(|r| r.get(&primary.name).filter(|v| !v.is_null()).cloned().ok_or_else(missing))
            .collect::<Result<Vec<_>>>()?;
        condition.and_where(
            &format!("{} IN (?)", scope.builder().quote(primary.column_name())),
            vec![Value::List(keys)],
        );
        return Ok(condition);
    }

    let conjunction = format!(
        "({})",
        primaries
            .iter()
            .map(|p| format!("{} = ?", scope.builder().quote(p.column_name())))
            .collect::<Vec<_>>()
            .join(" AND ")
    );
    let mut args = Vec::with_capacity(records.len() * primaries.len());
    for record in records {
        for primary in &primaries {
            args.push(record.get(&primary.name).filter(|v| !v.is_null()).cloned().ok_or_else(missing)?);
        }
    }
    let fragment = vec![conjunction.as_str(); records.len()].join(" OR ");
    condition.and_where(&format!("({fragment})"), args);
    Ok(condition)
}

async fn fetch(scope: &Scope, condition: Condition) -> Result<Vec<Record>> {
    let select = scope.select(condition);
    let rows = if scope.in_tx() {
        select.all_tx().await?
    } else {
        select.all().await?
    };
    Ok(rows.into_iter().map(|row| scope.record_from_row(row)).collect())
}

impl Eager {
    fn load<'a>(&'a self, scope: &'a Scope, records: &'a mut [Record]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            for relation in scope.readable_relations() {
                let child = scope.relation_scope(relation).await?;
                self.load_relation(scope, &child, relation, records).await?;
            }
            Ok(())
        })
    }

    async fn load_relation(
        &self,
        scope: &Scope,
        child: &Scope,
        relation: &Relation,
        records: &mut [Record],
    ) -> Result<()> {
        let keys = distinct(records.iter().filter_map(|r| r.get(&relation.foreign_key.name)));
        let afk = relation.association_foreign_key.name.as_str();
        let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();

        if !keys.is_empty() {
            match &relation.join_table {
                None => {
                    let mut children = fetch(child, target_condition(child, relation, keys)).await?;
                    self.load(child, &mut children).await?;
                    for record in children {
                        if let Some(key) = key_of(&record, afk) {
                            grouped.entry(key).or_default().push(record);
                        }
                    }
                }
                Some(join) => {
                    let links = self.links(scope, join, keys).await?;
                    let target_keys = distinct(links.iter().map(|(_, target)| target));
                    if !target_keys.is_empty() {
                        let mut targets = fetch(child, in_condition(child, relation.association_foreign_key.column_name(), target_keys)).await?;
                        self.load(child, &mut targets).await?;
                        let by_key: HashMap<String, Record> = targets
                            .into_iter()
                            .filter_map(|t| key_of(&t, afk).map(|k| (k, t)))
                            .collect();
                        for (parent, target) in links {
                            if let Some(found) = target.group_key().and_then(|k| by_key.get(&k)) {
                                grouped.entry(parent).or_default().push(found.clone());
                            }
                        }
                    }
                }
            }
        }

        tracing::trace!(
            target: "sqlgrid::orm",
            model = %scope.metadata.name,
            relation = %relation.field,
            matched = grouped.len(),
            "relation loaded"
        );
        for record in records.iter_mut() {
            let matched = key_of(record, &relation.foreign_key.name)
                .and_then(|k| grouped.get(&k).cloned())
                .unwrap_or_default();
            let data = if relation.kind.is_many() {
                RelationData::Many(matched)
            } else {
                RelationData::One(matched.into_iter().next().map(Box::new))
            };
            record.relations.insert(relation.field.clone(), data);
        }
        Ok(())
    }

    /// Join rows as `(caller key, target value)` pairs.
    async fn links(&self, scope: &Scope, join: &JoinTable, keys: Vec<Value>) -> Result<Vec<(String, Value)>> {
        let select = scope
            .builder()
            .select(&scope.sibling_table(&join.name))
            .columns([join.foreign_key.as_str(), join.association_foreign_key.as_str()])
            .condition(in_condition(scope, &join.foreign_key, keys));
        let rows = if scope.in_tx() {
            select.all_tx().await?
        } else {
            select.all().await?
        };
        Ok(rows
            .iter()
            .filter_map(|row| {
                let caller = row.get(&join.foreign_key).and_then(Value::group_key)?;
                let target = row.get(&join.association_foreign_key).cloned()?;
                Some((caller, target))
            })
            .collect())
    }

    async fn link(&self, scope: &Scope, join: &JoinTable, caller: Value, target: Value) -> Result<()> {
        let row = BTreeMap::from([
            (join.foreign_key.clone(), caller),
            (join.association_foreign_key.clone(), target),
        ]);
        scope
            .builder()
            .insert(&scope.sibling_table(&join.name))
            .value(row)
            .exec_tx()
            .await?;
        Ok(())
    }

    /// Insert the row itself; generated ids are written back.
    async fn insert_row(&self, scope: &Scope, record: &mut Record) -> Result<()> {
        let mut row = BTreeMap::new();
        let mut generated = None;
        for field in scope.writable_fields() {
            let Some(value) = record.get(&field.name) else {
                continue;
            };
            if field.column.autoincrement && value.is_zero() {
                generated = Some(field);
                continue;
            }
            row.insert(field.column_name().to_owned(), value.clone());
        }
        let generated = generated.or_else(|| {
            scope
                .primaries()
                .into_iter()
                .find(|p| p.column.autoincrement && record.get(&p.name).is_none_or(Value::is_zero))
        });

        let mut insert = scope.builder().insert(&scope.table()).value(row);
        if let Some(field) = generated {
            insert = insert.last_inserted_id(field.column_name());
        }
        let result = insert.exec_tx().await?;
        if let (Some(field), Some(id)) = (generated, result.last_insert_id) {
            record.fields.insert(field.name.clone(), Value::Int(id));
        }
        Ok(())
    }

    fn insert_graph<'a>(&'a self, scope: &'a Scope, record: &'a mut Record) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for relation in scope.writable_relations() {
                if relation.kind != RelationKind::BelongsTo {
                    continue;
                }
                let Some(RelationData::One(Some(target))) = record.relations.get_mut(&relation.field) else {
                    continue;
                };
                let child = scope.relation_scope(relation).await?;
                if !has_primary(&child, target) {
                    self.insert_graph(&child, target).await?;
                }
                let key = target
                    .get(&relation.association_foreign_key.name)
                    .cloned()
                    .unwrap_or_default();
                record.fields.insert(relation.foreign_key.name.clone(), key);
            }

            self.insert_row(scope, record).await?;

            for relation in scope.writable_relations() {
                if relation.kind == RelationKind::BelongsTo {
                    continue;
                }
                let key = record.get(&relation.foreign_key.name).cloned().unwrap_or_default();
                let Some(data) = record.relations.get_mut(&relation.field) else {
                    continue;
                };
                let child = scope.relation_scope(relation).await?;
                for target in data.records_mut() {
                    match &relation.join_table {
                        None => {
                            self.attach(relation, &key, target);
                            self.insert_graph(&child, target).await?;
                        }
                        Some(join) => {
                            if !has_primary(&child, target) {
                                self.insert_graph(&child, target).await?;
                            }
                            let target_key = target
                                .get(&relation.association_foreign_key.name)
                                .cloned()
                                .unwrap_or_default();
                            self.link(scope, join, key.clone(), target_key).await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Point a child at its caller, discriminator included.
    fn attach(&self, relation: &Relation, key: &Value, target: &mut Record) {
        target
            .fields
            .insert(relation.association_foreign_key.name.clone(), key.clone());
        if let Some(poly) = &relation.polymorphic {
            target
                .fields
                .insert(poly.type_field.name.clone(), Value::from(poly.value.as_str()));
        }
    }

    /// Save `target` against its stored state: diff when it exists, insert otherwise.
    async fn upsert(&self, child: &Scope, previous: Option<&Record>, target: &mut Record) -> Result<()> {
        if let Some(previous) = previous {
            self.save(child, previous, target).await?;
            return Ok(());
        }
        if !has_primary(child, target) {
            return self.insert_graph(child, target).await;
        }
        match self.first(child, &primary_condition(child, &[&*target])?).await {
            Ok(stored) => self.save(child, &stored, target).await.map(drop),
            Err(err) if err.is_no_rows() => self.insert_graph(child, target).await,
            Err(err) => Err(err),
        }
    }

    fn save<'a>(&'a self, scope: &'a Scope, before: &'a Record, after: &'a mut Record) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            for primary in scope.primaries() {
                if after.get(&primary.name).is_none_or(Value::is_zero) {
                    if let Some(value) = before.get(&primary.name) {
                        after.fields.insert(primary.name.clone(), value.clone());
                    }
                }
            }

            for relation in scope.writable_relations() {
                if relation.kind != RelationKind::BelongsTo {
                    continue;
                }
                let Some(RelationData::One(Some(target))) = after.relations.get_mut(&relation.field) else {
                    continue;
                };
                let child = scope.relation_scope(relation).await?;
                let wanted = primary_key(&child, target);
                let previous = before
                    .relation(&relation.field)
                    .and_then(|data| data.records().into_iter().next())
                    .filter(|p| wanted.is_some() && primary_key(&child, p) == wanted);
                self.upsert(&child, previous, target).await?;
                let key = target
                    .get(&relation.association_foreign_key.name)
                    .cloned()
                    .unwrap_or_default();
                after.fields.insert(relation.foreign_key.name.clone(), key);
            }

            let changed: BTreeMap<String, Value> = scope
                .writable_fields()
                .filter(|f| !f.is_primary())
                .filter_map(|f| {
                    let value = after.get(&f.name)?;
                    (before.get(&f.name) != Some(value)).then(|| (f.column_name().to_owned(), value.clone()))
                })
                .collect();
            let mut affected = 0;
            if !changed.is_empty() {
                affected = scope
                    .builder()
                    .update(&scope.table())
                    .set(changed)
                    .condition(primary_condition(scope, &[before])?)
                    .exec_tx()
                    .await?;
            }

            for relation in scope.writable_relations() {
                if relation.kind == RelationKind::BelongsTo {
                    continue;
                }
                let key = after.get(&relation.foreign_key.name).cloned().unwrap_or_default();
                let Some(data) = after.relations.get_mut(&relation.field) else {
                    continue;
                };
                let child = scope.relation_scope(relation).await?;
                let previous: Vec<&Record> = before
                    .relation(&relation.field)
                    .map(RelationData::records)
                    .unwrap_or_default();
                let find_previous = |target: &Record| {
                    let wanted = primary_key(&child, target)?;
                    previous
                        .iter()
                        .copied()
                        .find(|p| primary_key(&child, p).as_deref() == Some(wanted.as_str()))
                };

                match &relation.join_table {
                    None => {
                        let mut kept = HashSet::new();
                        for target in data.records_mut() {
                            self.attach(relation, &key, target);
                            let stored = find_previous(&*target);
                            self.upsert(&child, stored, target).await?;
                            if let Some(k) = primary_key(&child, target) {
                                kept.insert(k);
                            }
                        }
                        let removed: Vec<&Record> = previous
                            .iter()
                            .copied()
                            .filter(|p| primary_key(&child, p).is_none_or(|k| !kept.contains(&k)))
                            .collect();
                        if !removed.is_empty() {
                            self.delete_records(&child, &removed).await?;
                        }
                    }
                    Some(join) => {
                        let mut targets = Vec::new();
                        for target in data.records_mut() {
                            let stored = find_previous(&*target);
                            self.upsert(&child, stored, target).await?;
                            targets.push(
                                target
                                    .get(&relation.association_foreign_key.name)
                                    .cloned()
                                    .unwrap_or_default(),
                            );
                        }
                        let mut unlink = Condition::new();
                        unlink.and_where(
                            &format!("{} = ?", scope.builder().quote(&join.foreign_key)),
                            vec![key.clone()],
                        );
                        scope
                            .builder()
                            .delete(&scope.sibling_table(&join.name))
                            .condition(unlink)
                            .exec_tx()
                            .await?;
                        for target in targets {
                            self.link(scope, join, key.clone(), target).await?;
                        }
                    }
                }
            }
            Ok(affected)
        })
    }

    /// Relations whose rows die with their caller.
    fn owned_relations<'s>(&self, scope: &'s Scope) -> Vec<&'s Relation> {
        scope
            .readable_relations()
            .into_iter()
            .filter(|r| r.kind != RelationKind::BelongsTo)
            .collect()
    }

    /// Remove join rows, then child rows (depth first), of `records`.
    fn delete_dependents<'a>(&'a self, scope: &'a Scope, records: &'a [&'a Record]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let relations = self.owned_relations(scope);
            for relation in &relations {
                let Some(join) = &relation.join_table else {
                    continue;
                };
                let keys = distinct(records.iter().filter_map(|r| r.get(&relation.foreign_key.name)));
                if keys.is_empty() {
                    continue;
                }
                scope
                    .builder()
                    .delete(&scope.sibling_table(&join.name))
                    .condition(in_condition(scope, &join.foreign_key, keys))
                    .exec_tx()
                    .await?;
            }

            for relation in relations.into_iter().filter(|r| r.join_table.is_none()) {
                let keys = distinct(records.iter().filter_map(|r| r.get(&relation.foreign_key.name)));
                if keys.is_empty() {
                    continue;
                }
                let child = scope.relation_scope(relation).await?;
                let children: Vec<&Record> = records
                    .iter()
                    .filter_map(|r| r.relation(&relation.field))
                    .flat_map(RelationData::records)
                    .collect();
                self.delete_dependents(&child, &children).await?;
                scope
                    .builder()
                    .delete(&child.table())
                    .condition(target_condition(&child, relation, keys))
                    .exec_tx()
                    .await?;
            }
            Ok(())
        })
    }

    async fn delete_records(&self, scope: &Scope, records: &[&Record]) -> Result<u64> {
        self.delete_dependents(scope, records).await?;
        scope
            .builder()
            .delete(&scope.table())
            .condition(primary_condition(scope, records)?)
            .exec_tx()
            .await
    }
}

#[async_trait]
impl Strategy for Eager {
    fn name(&self) -> &'static str {
        "eager"
    }

    async fn first(&self, scope: &Scope, condition: &Condition) -> Result<Record> {
        let mut condition = condition.clone();
        condition.limit(1);
        let mut records = fetch(scope, condition).await?;
        records.truncate(1);
        self.load(scope, &mut records).await?;
        records
            .pop()
            .ok_or_else(|| Error::no_rows(format!("no `{}` matches", scope.metadata.name)))
    }

    async fn all(&self, scope: &Scope, condition: &Condition) -> Result<Vec<Record>> {
        let mut records = fetch(scope, condition.clone()).await?;
        self.load(scope, &mut records).await?;
        Ok(records)
    }

    async fn create(&self, scope: &Scope, record: &mut Record) -> Result<()> {
        let builder = scope.builder();
        let owned = builder.begin_owned().await?;
        let result = self.insert_graph(scope, record).await;
        builder.finish(owned, result).await
    }

    async fn update(&self, scope: &Scope, condition: &Condition, record: &mut Record) -> Result<u64> {
        let builder = scope.builder();
        let owned = builder.begin_owned().await?;
        let result = match self.first(scope, condition).await {
            Ok(before) => self.save(scope, &before, record).await,
            Err(err) => Err(err),
        };
        builder.finish(owned, result).await
    }

    async fn delete(&self, scope: &Scope, condition: &Condition) -> Result<u64> {
        let builder = scope.builder();
        let owned = builder.begin_owned().await?;
        let result = match self.all(scope, condition).await {
            Ok(records) if records.is_empty() => Ok(0),
            Ok(records) => {
                let records: Vec<&Record> = records.iter().collect();
                self.delete_records(scope, &records).await
            }
            Err(err) => Err(err),
        };
        builder.finish(owned, result).await
    }
}
