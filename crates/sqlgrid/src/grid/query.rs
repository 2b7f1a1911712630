//! Request parameters to query conditions.

use crate::error::{Error, ErrorKind, Result};
use crate::grid::field::{self, Field};
use crate::grid::request::Request;
use crate::ql::Condition;
use crate::ql::ident::quote_identifier;
use crate::value::Value;

pub const FILTER_PREFIX: &str = "filter_";

/// `sort` and `filter_*` parameters of a table or export request.
pub fn table_condition(fields: &[Field], request: &Request, quote: char, filters_enabled: bool) -> Result<Condition> {
    let mut condition = Condition::new();

    if let Some(sort) = request.param("sort") {
        let mut order = Vec::new();
        for entry in sort.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, desc) = match entry.strip_prefix('-') {
                Some(id) => (id.trim(), true),
                None => (entry, false),
            };
            let field = field::find(fields, id)
                .filter(|f| f.sortable)
                .ok_or_else(|| Error::forbidden(format!("field `{id}` is not sortable")))?;
            order.push(if desc {
                format!("-{}", field.reference_id)
            } else {
                field.reference_id.clone()
            });
        }
        condition.order(order);
    }

    for (key, raw) in &request.params {
        let Some(id) = key.strip_prefix(FILTER_PREFIX) else {
            continue;
        };
        if raw.trim().is_empty() {
            continue;
        }
        if !filters_enabled {
            return Err(Error::forbidden("filtering is disabled"));
        }
        let field = field::find(fields, id)
            .filter(|f| f.filterable)
            .ok_or_else(|| Error::forbidden(format!("field `{id}` is not filterable")))?;
        let column = quote_identifier(&field.reference_id, quote);
        if raw.contains(',') {
            let values = raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| typed(field, v))
                .collect::<Result<Vec<_>>>()?;
            condition.and_where(&format!("{column} IN (?)"), vec![Value::List(values)]);
        } else {
            condition.and_where(&format!("{column} = ?"), vec![typed(field, raw.trim())?]);
        }
    }

    condition.error().map_or(Ok(condition), Err)
}

/// `pk = ?` for every primary field; each must be a request parameter.
pub fn primary_condition(fields: &[Field], request: &Request, quote: char) -> Result<Condition> {
    let primaries: Vec<&Field> = fields.iter().filter(|f| f.primary).collect();
    if primaries.is_empty() {
        return Err(Error::new(ErrorKind::NoPrimary, "grid has no primary field"));
    }
    let mut condition = Condition::new();
    for field in primaries {
        let raw = request
            .param(&field.id)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::new(ErrorKind::MissingPrimary, format!("parameter `{}` is required", field.id)))?;
        condition.and_where(
            &format!("{} = ?", quote_identifier(&field.reference_id, quote)),
            vec![typed(field, raw)?],
        );
    }
    Ok(condition)
}

/// Parameter text as a bind value of the field's type.
fn typed(field: &Field, raw: &str) -> Result<Value> {
    let invalid = || Error::new(ErrorKind::InvalidParam, format!("`{raw}` does not fit field `{}`", field.id));
    match field.field_type.as_str() {
        "Integer" => raw.parse().map(Value::Int).map_err(|_| invalid()),
        "Float" => raw.parse().map(Value::Float).map_err(|_| invalid()),
        _ => Ok(Value::from(raw)),
    }
}
