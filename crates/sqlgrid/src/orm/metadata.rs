//! Model metadata: the static descriptor checked against the live schema.
//!
//! [`init`] is idempotent. The first call for a model describes its table,
//! resolves primaries and relation keys, initializes every related model,
//! and stores the result in the context's cache. Later calls return a clone
//! of the cached snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use heck::ToSnakeCase;

use crate::cache::get_as;
use crate::error::{Error, ErrorKind, Result};
use crate::orm::Context;
use crate::orm::field::Field;
use crate::orm::model::{FieldDecl, ModelDescriptor, ModelType, RelationDecl};
use crate::orm::relation::{JoinTable, Polymorphic, Relation, RelationKind};
use crate::ql::Builder;
use crate::ql::column::Column;

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Fully qualified type name.
    pub name: String,
    pub table_name: String,
    pub database_name: String,
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
    pub strategy: String,
    pub model: ModelType,
}

impl Metadata {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| !f.custom && f.column_name() == column)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.field == name)
    }

    pub fn primaries(&self) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.is_primary()).collect()
    }

    /// `database.table` when the model lives outside the builder's database.
    pub fn qualified_table(&self, builder: &Builder) -> String {
        if self.database_name == builder.config().database {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.database_name, self.table_name)
        }
    }
}

pub(crate) fn cache_key(model: &ModelType) -> String {
    format!("orm:{}", model.name())
}

/// Naive English plural: `y -> ies`, sibilants take `es`, everything else `s`.
pub(crate) fn pluralize(word: &str) -> String {
    if word.ends_with('y')
        && word.len() > 1
        && !matches!(
            word.chars().nth(word.len() - 2),
            Some('a' | 'e' | 'i' | 'o' | 'u')
        )
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Declared table, or the pluralized snake_case struct name.
pub(crate) fn table_name(descriptor: &ModelDescriptor) -> String {
    match descriptor.table {
        Some(table) => table.to_owned(),
        None => pluralize(&descriptor.name.to_snake_case()),
    }
}

/// Build (or fetch from cache) the metadata of `model`.
pub async fn init(model: ModelType, ctx: &Context) -> Result<Metadata> {
    let mut initialized = HashSet::new();
    init_chain(model, ctx, &mut initialized).await
}

fn init_chain<'a>(
    model: ModelType,
    ctx: &'a Context,
    initialized: &'a mut HashSet<String>,
) -> BoxFuture<'a, Result<Metadata>> {
    Box::pin(async move {
        let cache = ctx.cache()?;
        let key = cache_key(&model);
        if let Some(hit) = get_as::<Metadata>(cache.as_ref(), &key) {
            tracing::trace!(target: "sqlgrid::orm", model = model.name(), "metadata cache hit");
            return Ok((*hit).clone());
        }
        tracing::trace!(target: "sqlgrid::orm", model = model.name(), "metadata cache miss");

        let descriptor = model.descriptor();
        let table = table_name(&descriptor);
        let database = match descriptor.database {
            Some(db) => db.to_owned(),
            None => ctx.builder.config().database.clone(),
        };
        if database.is_empty() {
            return Err(Error::new(
                ErrorKind::Unconfigured,
                format!("no database configured for `{}`", descriptor.name),
            ));
        }

        let fields = resolve_fields(ctx, &descriptor, &database, &table).await?;
        initialized.insert(model.name().to_owned());

        let mut relations = Vec::new();
        for decl in descriptor.relations.iter().filter(|r| !r.custom) {
            let relation = resolve_relation(ctx, model, &descriptor, &fields, &database, decl).await?;
            if !initialized.contains(decl.model.name()) {
                init_chain(decl.model, ctx, initialized).await?;
            }
            relations.push(relation);
        }

        let metadata = Metadata {
            name: model.name().to_owned(),
            table_name: table,
            database_name: database,
            fields,
            relations,
            strategy: descriptor.strategy.unwrap_or(crate::orm::strategy::DEFAULT).to_owned(),
            model,
        };
        cache.set(&key, Arc::new(metadata.clone()), Some(ctx.ttl));
        Ok(metadata)
    })
}

fn static_field(decl: &FieldDecl, table: &str) -> Field {
    let mut column = Column::named(table, decl.column_name());
    column.primary = decl.primary;
    Field {
        name: decl.name.to_owned(),
        column,
        custom: decl.custom,
        permission: decl.permission,
        declared: decl.permission,
        sql_select: decl.select.map(str::to_owned),
        validator: decl.validator.map(str::to_owned),
    }
}

async fn resolve_fields(
    ctx: &Context,
    descriptor: &ModelDescriptor,
    database: &str,
    table: &str,
) -> Result<Vec<Field>> {
    let expected: Vec<String> = descriptor
        .fields
        .iter()
        .filter(|f| !f.custom && f.select.is_none())
        .map(|f| f.column_name().to_owned())
        .collect();
    let described = if expected.is_empty() {
        Vec::new()
    } else {
        ctx.builder
            .information(&format!("{database}.{table}"))
            .describe(&expected)
            .await?
    };

    let tagged = descriptor.fields.iter().any(|f| f.primary);
    let mut missing = Vec::new();
    let mut fields = Vec::with_capacity(descriptor.fields.len());
    for decl in &descriptor.fields {
        let mut field = static_field(decl, table);
        if !decl.custom && decl.select.is_none() {
            match described.iter().find(|c| c.name == decl.column_name()) {
                Some(column) => {
                    field.column = column.clone();
                    field.column.primary = if tagged { decl.primary } else { column.primary };
                }
                None => missing.push(decl.column_name()),
            }
        }
        fields.push(field);
    }
    if !missing.is_empty() {
        return Err(Error::new(
            ErrorKind::SchemaMismatch,
            format!("`{database}.{table}` has no column(s) {}", missing.join(", ")),
        ));
    }

    if !fields.iter().any(Field::is_primary) {
        match fields.iter_mut().find(|f| f.name == "id" && !f.custom) {
            Some(id) => id.column.primary = true,
            None => {
                return Err(Error::new(
                    ErrorKind::NoPrimary,
                    format!("`{}` has no primary key", descriptor.name),
                ));
            }
        }
    }
    Ok(fields)
}

fn missing_field(owner: &str, field: &str) -> Error {
    Error::new(
        ErrorKind::MissingStructField,
        format!("`{owner}` has no field `{field}`"),
    )
}

async fn resolve_relation(
    ctx: &Context,
    caller: ModelType,
    descriptor: &ModelDescriptor,
    fields: &[Field],
    database: &str,
    decl: &RelationDecl,
) -> Result<Relation> {
    let kind = match decl.kind {
        Some(raw) => RelationKind::parse(raw)?,
        None if decl.many => RelationKind::HasMany,
        None => RelationKind::HasOne,
    };
    if kind.is_many() != decl.many {
        return Err(Error::new(
            ErrorKind::RelationKind,
            format!(
                "`{}.{}` is {kind} but its type holds {}",
                descriptor.name,
                decl.field,
                if decl.many { "a list" } else { "a single record" }
            ),
        ));
    }

    let self_reference = decl.model == caller;
    if self_reference && kind != RelationKind::ManyToMany {
        return Err(Error::new(
            ErrorKind::SelfReference,
            format!("`{}.{}` refers to its own model as {kind}", descriptor.name, decl.field),
        ));
    }
    if decl.polymorphic.is_some() && !matches!(kind, RelationKind::HasOne | RelationKind::HasMany) {
        return Err(Error::new(
            ErrorKind::PolymorphicNotAllowed,
            format!("`{}.{}` is {kind}", descriptor.name, decl.field),
        ));
    }

    let target = decl.model.descriptor();
    let target_table = table_name(&target);
    let caller_snake = descriptor.name.to_snake_case();
    let target_snake = target.name.to_snake_case();

    let caller_field = |name: &str| {
        fields
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| missing_field(descriptor.name, name))
    };
    let caller_primary = || {
        fields
            .iter()
            .find(|f| f.is_primary())
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NoPrimary, format!("`{}` has no primary key", descriptor.name)))
    };
    let target_field = |name: &str| {
        target
            .field(name)
            .map(|d| static_field(d, &target_table))
            .ok_or_else(|| missing_field(target.name, name))
    };
    let target_primary = || {
        target
            .primaries()
            .first()
            .map(|d| {
                let mut field = static_field(d, &target_table);
                field.column.primary = true;
                field
            })
            .ok_or_else(|| Error::new(ErrorKind::NoPrimary, format!("`{}` has no primary key", target.name)))
    };

    let mut join_table = None;
    let (foreign_key, association_foreign_key) = match kind {
        RelationKind::BelongsTo => {
            let fk = match decl.fk {
                Some(fk) => caller_field(fk)?,
                None => caller_field(&format!("{}_id", decl.field))?,
            };
            let afk = match decl.afk {
                Some(afk) => target_field(afk)?,
                None => target_primary()?,
            };
            (fk, afk)
        }
        RelationKind::HasOne | RelationKind::HasMany => {
            let fk = match decl.fk {
                Some(fk) => caller_field(fk)?,
                None => caller_primary()?,
            };
            let afk = match (decl.polymorphic, decl.afk) {
                (Some(poly), _) => target_field(&format!("{poly}_id"))?,
                (None, Some(afk)) => target_field(afk)?,
                (None, None) => target_field(&format!("{caller_snake}_id"))?,
            };
            (fk, afk)
        }
        RelationKind::ManyToMany => {
            let fk = match decl.fk {
                Some(fk) => caller_field(fk)?,
                None => caller_primary()?,
            };
            let afk = match decl.afk {
                Some(afk) => target_field(afk)?,
                None => target_primary()?,
            };
            let join = JoinTable {
                name: decl
                    .join_table
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{caller_snake}_{}", pluralize(&target_snake))),
                foreign_key: decl
                    .join_fk
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{caller_snake}_id")),
                association_foreign_key: match decl.join_afk {
                    Some(afk) => afk.to_owned(),
                    None if self_reference => "child_id".to_owned(),
                    None => format!("{target_snake}_id"),
                },
            };
            verify_join_table(ctx, database, &join).await?;
            join_table = Some(join);
            (fk, afk)
        }
    };

    let polymorphic = match decl.polymorphic {
        Some(poly) => Some(Polymorphic {
            field: association_foreign_key.clone(),
            type_field: target_field(&format!("{poly}_type"))?,
            value: decl
                .polymorphic_value
                .map(str::to_owned)
                .unwrap_or_else(|| caller_snake.clone()),
        }),
        None => None,
    };

    Ok(Relation {
        field: decl.field.to_owned(),
        kind,
        model: decl.model,
        foreign_key,
        association_foreign_key,
        join_table,
        polymorphic,
        self_reference,
        permission: decl.permission,
        declared: decl.permission,
        custom: decl.custom,
    })
}

async fn verify_join_table(ctx: &Context, database: &str, join: &JoinTable) -> Result<()> {
    let wanted = [join.foreign_key.clone(), join.association_foreign_key.clone()];
    let columns = ctx
        .builder
        .information(&format!("{database}.{}", join.name))
        .describe(&wanted)
        .await?;
    let missing: Vec<&str> = wanted
        .iter()
        .filter(|w| !columns.iter().any(|c| &c.name == *w))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(Error::new(
            ErrorKind::SchemaMismatch,
            format!("join table `{}` has no column(s) {}", join.name, missing.join(", ")),
        ));
    }
    Ok(())
}

#[cfg(all(test, feature = "derive"))]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::orm::fixtures::{self, Car, Person, Radio};
    use crate::orm::model::Model;
    use crate::ql::mock::mock_builder;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn plural_forms() {
        assert_eq!(pluralize("car"), "cars");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("user_grid_position"), "user_grid_positions");
    }

    #[tokio::test]
    async fn init_resolves_relations_and_caches() {
        let (builder, conn) = mock_builder();
        fixtures::declare_schema(&conn);
        let cache = Arc::new(MemoryCache::new());
        let ctx = Context::new(builder).with_cache(cache.clone(), Duration::from_secs(60));

        let car = init(ModelType::of::<Car>(), &ctx).await.unwrap();
        assert_eq!(car.table_name, "cars");
        assert_eq!(car.strategy, "eager");
        assert_eq!(car.primaries().len(), 1);

        let radio = car.relation("radio").unwrap();
        assert_eq!(radio.kind, RelationKind::HasOne);
        assert_eq!(radio.foreign_key.name, "id");
        assert_eq!(radio.association_foreign_key.name, "owner_id");
        let poly = radio.polymorphic.as_ref().unwrap();
        assert_eq!(poly.type_field.name, "owner_type");
        assert_eq!(poly.value, "car");

        let owner = car.relation("owner").unwrap();
        assert_eq!(owner.kind, RelationKind::BelongsTo);
        assert_eq!(owner.foreign_key.name, "owner_id");
        assert_eq!(owner.association_foreign_key.name, "id");

        let tags = car.relation("tags").unwrap();
        assert_eq!(
            tags.join_table,
            Some(JoinTable {
                name: "car_tags".into(),
                foreign_key: "car_id".into(),
                association_foreign_key: "tag_id".into(),
            })
        );

        // Person -> cars -> Car closes the cycle; both ends are cached.
        assert!(cache.exist(&cache_key(&ModelType::of::<Person>())));
        assert!(cache.exist(&cache_key(&ModelType::of::<Radio>())));

        let describes = conn.statements_matching("AS column_type").len();
        let again = init(ModelType::of::<Car>(), &ctx).await.unwrap();
        assert_eq!(again, car);
        assert_eq!(conn.statements_matching("AS column_type").len(), describes);
    }

    #[tokio::test]
    async fn cache_is_required() {
        let (builder, conn) = mock_builder();
        fixtures::declare_schema(&conn);
        let err = init(ModelType::of::<Car>(), &Context::new(builder.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCache);

        let ctx = Context::new(builder).with_cache(Arc::new(MemoryCache::new()), Duration::ZERO);
        assert_eq!(init(ModelType::of::<Car>(), &ctx).await.unwrap_err().kind(), ErrorKind::NoCache);
    }

    #[tokio::test]
    async fn missing_columns_are_a_schema_mismatch_and_not_cached() {
        let (builder, conn) = mock_builder();
        fixtures::declare_schema(&conn);
        conn.table("radios", vec![fixtures::int_column("id", true), fixtures::text_column("brand")]);
        let cache = Arc::new(MemoryCache::new());
        let ctx = Context::new(builder).with_cache(cache.clone(), Duration::from_secs(60));

        let err = init(ModelType::of::<Radio>(), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(!cache.exist(&cache_key(&ModelType::of::<Radio>())));
    }

    #[tokio::test]
    async fn id_field_is_the_primary_fallback() {
        let (builder, conn) = mock_builder();
        fixtures::declare_schema(&conn);
        conn.table("tags", vec![fixtures::int_column("id", false), fixtures::text_column("label")]);
        let ctx = Context::new(builder).with_cache(Arc::new(MemoryCache::new()), Duration::from_secs(60));

        let tag = init(ModelType::of::<fixtures::Tag>(), &ctx).await.unwrap();
        assert_eq!(tag.primaries()[0].name, "id");
    }

    #[tokio::test]
    async fn relation_shape_is_checked() {
        let (builder, conn) = mock_builder();
        fixtures::declare_schema(&conn);
        let ctx = Context::new(builder).with_cache(Arc::new(MemoryCache::new()), Duration::from_secs(60));

        let err = init(ModelType::of::<fixtures::BadKind>(), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RelationKind);
        let err = init(ModelType::of::<fixtures::BadSelf>(), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelfReference);
        let err = init(ModelType::of::<fixtures::BadPolymorphic>(), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolymorphicNotAllowed);
        let err = init(ModelType::of::<fixtures::BadKey>(), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingStructField);
    }

    #[test]
    fn descriptor_lists_relations() {
        let descriptor = Car::descriptor();
        assert_eq!(descriptor.name, "Car");
        let names: Vec<_> = descriptor.relations.iter().map(|r| r.field).collect();
        assert_eq!(names, ["radio", "owner", "tags"]);
        assert!(descriptor.relation("tags").unwrap().many);
    }
}
